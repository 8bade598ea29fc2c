//! HTTP handlers for the bookmark API

use std::convert::Infallible;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection},
    },
    response::{
        Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use super::tags::{filter_by_tag, tag_counts};
use super::BookmarkStore;
use crate::api::{
    ListParams, bad_request, created, internal_error, no_content, not_found, success, unauthorized,
};
use crate::auth::Caller;
use crate::error::{StoreError, unpack_error};
use crate::handler::AppState;
use crate::model::BookmarkInput;

// Anonymous callers hear about missing identity before malformed input.
fn reject_input(caller: &Caller, reason: &str) -> Response {
    match caller.subject() {
        Some(_) => bad_request(reason),
        None => store_error("read input", StoreError::Unauthenticated),
    }
}

fn store_error(action: &str, err: StoreError) -> Response {
    match err {
        StoreError::Unauthenticated => unauthorized("not authenticated"),
        StoreError::NotFoundOrForbidden => not_found("bookmark not found"),
        other => {
            tracing::error!("failed to {}: {}", action, unpack_error(&other));
            internal_error(&format!("failed to {action}"))
        }
    }
}

pub async fn list_bookmarks(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> Response {
    match state.store.list(&caller).await {
        Ok(bookmarks) => match params.tag.as_deref() {
            Some(tag) if !tag.trim().is_empty() => success(filter_by_tag(bookmarks, tag)),
            _ => success(bookmarks),
        },
        Err(e) => store_error("list bookmarks", e),
    }
}

pub async fn create_bookmark(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<BookmarkInput>, JsonRejection>,
) -> Response {
    let input = match payload.map(|Json(p)| p.validated()) {
        Ok(Ok(input)) => input,
        Ok(Err(e)) => return reject_input(&caller, &e.to_string()),
        Err(e) => return reject_input(&caller, &e.body_text()),
    };

    match state.store.create(&caller, input).await {
        Ok(bookmark) => created(bookmark),
        Err(e) => store_error("create bookmark", e),
    }
}

pub async fn update_bookmark(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<BookmarkInput>, JsonRejection>,
) -> Response {
    let Path(id) = match id {
        Ok(id) => id,
        Err(e) => return reject_input(&caller, &e.body_text()),
    };
    let input = match payload.map(|Json(p)| p.validated()) {
        Ok(Ok(input)) => input,
        Ok(Err(e)) => return reject_input(&caller, &e.to_string()),
        Err(e) => return reject_input(&caller, &e.body_text()),
    };

    match state.store.update(&caller, id, input).await {
        Ok(bookmark) => success(bookmark),
        Err(e) => store_error("update bookmark", e),
    }
}

pub async fn delete_bookmark(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    let Path(id) = match id {
        Ok(id) => id,
        Err(e) => return reject_input(&caller, &e.body_text()),
    };
    match state.store.remove(&caller, id).await {
        Ok(()) => no_content(),
        Err(e) => store_error("delete bookmark", e),
    }
}

pub async fn list_tags(State(state): State<AppState>, caller: Caller) -> Response {
    match state.store.list(&caller).await {
        Ok(bookmarks) => success(tag_counts(&bookmarks)),
        Err(e) => store_error("list tags", e),
    }
}

async fn snapshot(store: &BookmarkStore, caller: &Caller) -> Event {
    let event = match store.list(caller).await {
        Ok(bookmarks) => Event::default().event("bookmarks").json_data(&bookmarks),
        Err(e) => {
            tracing::error!("failed to list bookmarks for stream: {}", unpack_error(&e));
            return Event::default().event("error").data("failed to list bookmarks");
        }
    };
    event.unwrap_or_else(|e| {
        tracing::error!("failed to encode bookmarks event: {}", e);
        Event::default().event("error").data("failed to encode bookmarks")
    })
}

/// Sends the caller's list now and again after each change to it.
pub async fn stream_bookmarks(
    State(state): State<AppState>,
    caller: Caller,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.store.subscribe();
    let init = (state.store, caller, rx, true);

    let events = stream::unfold(init, |(store, caller, mut rx, first)| async move {
        if !first {
            let subject = caller.subject()?;
            loop {
                match rx.recv().await {
                    Ok(change) if change.owner == subject => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "bookmark stream lagged, resending list");
                        break;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }

        let event = snapshot(&store, &caller).await;
        Some((Ok::<_, Infallible>(event), (store, caller, rx, false)))
    });

    Sse::new(events.take_until(state.shutdown.cancelled_owned())).keep_alive(KeepAlive::default())
}
