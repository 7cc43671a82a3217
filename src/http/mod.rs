use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::catalog::{Store, StoreError};

pub mod handlers;
pub mod static_files;

/// Shared state handed to every route handler: the catalog to read from
/// and the document root static files are resolved against. Cheap to
/// clone — both fields are already behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub document_root: Arc<PathBuf>,
}

/// Errors an HTTP handler can fail with, mapped onto the 4xx/5xx policy
/// from the error handling design: catalog read failures are server
/// errors, unknown query targets and bad input are client errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("catalog unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("missing required query parameter: {0}")]
    MissingParam(&'static str),

    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self {
            HttpError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::MissingParam(_) | HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::NotFound => StatusCode::NOT_FOUND,
        };

        if matches!(status, StatusCode::INTERNAL_SERVER_ERROR) {
            log::error!("request failed: {self}");
        }

        (status, self.to_string()).into_response()
    }
}

/// Assembles the router: the `/bctl/*` catalog routes and `/stream` take
/// priority; anything else falls through to static-file resolution under
/// the configured document root. Each registered path only accepts `GET` —
/// axum's `MethodRouter` rejects other methods with `405` on its own.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/bctl/status", get(handlers::status))
        .route("/bctl/artists", get(handlers::list_artists))
        .route("/bctl/albums", get(handlers::list_albums))
        .route("/bctl/songs", get(handlers::list_songs))
        .route("/stream", get(handlers::stream_song))
        .fallback(get(static_files::serve_static))
        .with_state(state)
}
