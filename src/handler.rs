use std::sync::Arc;

use axum::{
    Router,
    http::Method,
    response::Response,
    routing::get,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::success;
use crate::assets::serve_embedded;
use crate::auth::IdentityProvider;
use crate::bookmarks::{self, BookmarkStore};

#[derive(Clone)]
pub struct AppState {
    pub store: BookmarkStore,
    pub identity: Arc<dyn IdentityProvider>,
    /// Ends long-lived responses such as the bookmark stream.
    pub shutdown: CancellationToken,
}

pub async fn healthcheck() -> Response {
    info!("got healthcheck request");
    success("ok")
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(healthcheck))
        .nest("/api", bookmarks::routes())
        .fallback(serve_embedded)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
