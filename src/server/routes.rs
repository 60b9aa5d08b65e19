//! Router definition for the RPC surface

use axum::{extract::DefaultBodyLimit, routing::*, Router};

use super::{handlers, state::AppState};

/// Request bodies may carry one block plus headroom for framing.
const BODY_HEADROOM: usize = 64 * 1024;

/// Build the router for every RPC endpoint.
pub fn create_router(state: &AppState) -> Router {
    let body_limit = state.service.limits().max_block_bytes as usize + BODY_HEADROOM;

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/rpc/version", get(handlers::version))
        .route("/rpc/login", post(handlers::login))
        .route("/rpc/logout", post(handlers::logout))
        .route("/rpc/session", get(handlers::check_session))
        .route("/rpc/upload/status", get(handlers::upload_status))
        .route(
            "/rpc/upload/parameters",
            post(handlers::define_upload_parameters),
        )
        .route("/rpc/upload/start", post(handlers::start_uploading))
        .route("/rpc/upload/block", put(handlers::upload_block))
        .route("/rpc/download/files", get(handlers::list_download_files))
        .route("/rpc/download/start", post(handlers::start_downloading))
        .route("/rpc/download/block", get(handlers::download_block))
        .route("/rpc/share", post(handlers::share_files))
        .route("/rpc/cancel", post(handlers::cancel))
        .route("/rpc/finish", post(handlers::finish))
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(body_limit))
}
