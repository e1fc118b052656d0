//! Bearer token authentication.
//!
//! Provides constant-time token comparison, bearer header extraction and the
//! token table that maps an API token to a user id.

use std::collections::BTreeMap;

use crate::app::AppError;

/// Turns a request credential into a stable user id.
pub trait IdentityVerifier: Send + Sync {
    /// `authorization` is the raw `Authorization` header value, if any.
    fn verify(&self, authorization: Option<&str>) -> Result<String, AppError>;
}

/// Verifier backed by the `tokens` table of the config file.
pub struct TokenVerifier {
    tokens: Vec<(String, String)>,
}

impl TokenVerifier {
    pub fn new(tokens: &BTreeMap<String, String>) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|(token, uid)| (token.clone(), uid.clone()))
                .collect(),
        }
    }
}

impl IdentityVerifier for TokenVerifier {
    fn verify(&self, authorization: Option<&str>) -> Result<String, AppError> {
        let provided = authorization
            .and_then(extract_bearer_token)
            .ok_or(AppError::Unauthenticated)?;

        // every entry is compared so the match position doesn't leak
        let mut uid = None;
        for (token, owner) in &self.tokens {
            if validate_token(provided, token) && uid.is_none() {
                uid = Some(owner.clone());
            }
        }

        uid.ok_or(AppError::Unauthenticated)
    }
}

/// Constant-time token comparison. Empty tokens never match.
pub fn validate_token(provided: &str, expected: &str) -> bool {
    let (provided, expected) = (provided.as_bytes(), expected.as_bytes());
    if provided.is_empty() || expected.is_empty() {
        return false;
    }

    // fold over the shorter one, the length check comes last
    let diff = provided
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));

    provided.len() == expected.len() && diff == 0
}

/// Token part of a `Bearer <token>` header value, scheme matched case-insensitively.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let scheme = header.get(..7)?;
    if !scheme.eq_ignore_ascii_case("bearer ") {
        return None;
    }

    Some(header[7..].trim()).filter(|token| !token.is_empty())
}
