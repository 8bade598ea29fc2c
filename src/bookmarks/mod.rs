//! Bookmarks Module
//!
//! Owns the per-user bookmark collection: the libsql-backed store, the
//! derived tag views and the HTTP surface mounted under `/api`.
//!
//! Every operation is scoped to the [`Caller`](crate::auth::Caller) resolved
//! for the request. Reads by anonymous callers return an empty list; writes
//! fail with [`StoreError::Unauthenticated`](crate::error::StoreError).
//! Updates and removals of a record that is missing or owned by someone else
//! fail the same way, with `NotFoundOrForbidden`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use marque::bookmarks;
//!
//! let app = Router::new()
//!     .nest("/api", bookmarks::routes())
//!     .with_state(app_state);
//! ```

mod handler;
mod routes;
mod store;
mod tags;

pub use routes::routes;
pub use store::{BookmarkStore, authorize, now_millis};
pub use tags::{filter_by_tag, normalize_tags, tag_counts};

pub fn migrations() -> &'static [(&'static str, &'static str)] {
    &[(
        "bookmarks_001_schema.sql",
        include_str!("migrations/001_schema.sql"),
    )]
}
