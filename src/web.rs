use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::signal;

use crate::{
    app::{App, AppError},
    auth::IdentityVerifier,
    categories::CategorySummary,
    links::{Link, ListOptions, SortOrder},
};

#[derive(Clone)]
struct SharedState {
    app: Arc<App>,
    verifier: Arc<dyn IdentityVerifier>,
}

impl SharedState {
    fn uid(&self, headers: &HeaderMap) -> Result<String, AppError> {
        let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        self.verifier.verify(authorization)
    }
}

pub fn router(app: Arc<App>, verifier: Arc<dyn IdentityVerifier>) -> Router {
    let shared_state = Arc::new(SharedState { app, verifier });

    Router::new()
        .route("/api/healthz", get(healthz))
        .route("/api/links", get(list_links).post(create_link))
        .route("/api/links/:id", get(get_link))
        .route("/api/links/:id/category", patch(move_category))
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/:id", delete(delete_category))
        .route("/api/search", get(search))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn start_app(
    app: Arc<App>,
    verifier: Arc<dyn IdentityVerifier>,
    listen_addr: &str,
) -> anyhow::Result<()> {
    async fn shutdown_signal() {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                log::error!("failed to listen for ctrl-c: {err}");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(err) => log::error!("failed to install signal handler: {err}"),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        log::warn!("shutting down");
    }

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("listening on {listen_addr}");

    axum::serve(listener, router(app, verifier))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(
    app: Arc<App>,
    verifier: Arc<dyn IdentityVerifier>,
    listen_addr: &str,
) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(app, verifier, listen_addr).await })
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self.0 {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "already_exists"),
            AppError::ExternalProvider(_) | AppError::Store(_) | AppError::Other(_) => {
                log::error!("{:?}", self.0);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };

        (
            status,
            Json(json!({ "code": code, "message": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// `Json` whose rejections use the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(HttpError))]
struct AppJson<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(HttpError))]
struct AppQuery<T>(T);

#[derive(Debug, Serialize)]
struct Items<T> {
    items: Vec<T>,
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

#[derive(Debug, Deserialize)]
struct CreateLinkRequest {
    url: String,
}

async fn create_link(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    AppJson(payload): AppJson<CreateLinkRequest>,
) -> Result<(StatusCode, Json<Link>), HttpError> {
    let uid = state.uid(&headers)?;

    let created =
        tokio::task::block_in_place(move || state.app.create_link(&uid, &payload.url))?;

    let status = if created.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(created.link)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListLinksQuery {
    category_id: Option<String>,
    #[serde(default)]
    inbox: bool,
    sort: Option<SortOrder>,
    limit: Option<usize>,
    cursor: Option<String>,
}

async fn list_links(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    AppQuery(query): AppQuery<ListLinksQuery>,
) -> Result<Json<Items<Link>>, HttpError> {
    let uid = state.uid(&headers)?;

    let opts = ListOptions {
        category_id: query.category_id.filter(|id| !id.is_empty()),
        inbox: query.inbox,
        sort: query.sort.unwrap_or_default(),
        limit: query.limit,
        cursor: query.cursor.filter(|c| !c.is_empty()),
    };

    let items = tokio::task::block_in_place(move || state.app.list_links(&uid, opts))?;
    Ok(Json(Items { items }))
}

async fn get_link(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Link>, HttpError> {
    let uid = state.uid(&headers)?;

    let link = tokio::task::block_in_place(move || state.app.get_link(&uid, &id))?;
    Ok(Json(link))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveCategoryRequest {
    category_id: Option<String>,
}

async fn move_category(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    AppJson(payload): AppJson<MoveCategoryRequest>,
) -> Result<Json<Link>, HttpError> {
    let uid = state.uid(&headers)?;

    let link = tokio::task::block_in_place(move || {
        state
            .app
            .move_category(&uid, &id, payload.category_id.as_deref())
    })?;
    Ok(Json(link))
}

async fn list_categories(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> Result<Json<Items<CategorySummary>>, HttpError> {
    let uid = state.uid(&headers)?;

    let items = tokio::task::block_in_place(move || state.app.list_categories(&uid))?;
    Ok(Json(Items { items }))
}

#[derive(Debug, Deserialize)]
struct CreateCategoryRequest {
    name: String,
    description: Option<String>,
}

async fn create_category(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    AppJson(payload): AppJson<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategorySummary>), HttpError> {
    let uid = state.uid(&headers)?;

    let category = tokio::task::block_in_place(move || {
        state
            .app
            .create_category(&uid, &payload.name, payload.description)
    })?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn delete_category(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let uid = state.uid(&headers)?;

    let moved = tokio::task::block_in_place(move || state.app.delete_category(&uid, &id))?;
    Ok(Json(json!({ "moved": moved })))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
    cursor: Option<String>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    AppQuery(query): AppQuery<SearchQuery>,
) -> Result<Json<Items<Link>>, HttpError> {
    let uid = state.uid(&headers)?;

    let items = tokio::task::block_in_place(move || {
        state
            .app
            .search_links(&uid, &query.q, query.limit, query.cursor.as_deref())
    })?;
    Ok(Json(Items { items }))
}
