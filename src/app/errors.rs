use crate::{providers::ProviderError, store::StoreError};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("external provider error: {0}")]
    ExternalProvider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => AppError::NotFound(format!("{kind} {id}")),
            StoreError::AlreadyExists { kind, id } => {
                AppError::Conflict(format!("{kind} {id} already exists"))
            }
            StoreError::PreconditionFailed(reason) => AppError::Conflict(reason),
            err => AppError::Store(err),
        }
    }
}
