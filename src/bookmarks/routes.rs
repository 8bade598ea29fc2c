use axum::{
    Router,
    routing::{get, put},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookmarks", get(handler::list_bookmarks).post(handler::create_bookmark))
        .route("/bookmarks/stream", get(handler::stream_bookmarks))
        .route(
            "/bookmarks/:id",
            put(handler::update_bookmark).delete(handler::delete_bookmark),
        )
        .route("/tags", get(handler::list_tags))
}
