use std::sync::Arc;

use libsql::Row;
use tokio::sync::broadcast;

use crate::auth::Caller;
use crate::db::Database;
use crate::error::StoreError;
use crate::model::{Bookmark, BookmarkInput, Change, ChangeKind};

use super::tags::normalize_tags;

type Result<T> = std::result::Result<T, StoreError>;

const CHANGE_CAPACITY: usize = 256;

const COLUMNS: &str = "id, user_id, url, title, tags, created_at";

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Ownership guard shared by every mutation path.
pub fn authorize<'a>(caller: &Caller, record: Option<&'a Bookmark>) -> Result<&'a Bookmark> {
    let subject = caller.subject().ok_or(StoreError::Unauthenticated)?;
    match record {
        Some(bookmark) if bookmark.user_id == subject => Ok(bookmark),
        _ => Err(StoreError::NotFoundOrForbidden),
    }
}

/// Per-user bookmark collection backed by libsql.
#[derive(Clone)]
pub struct BookmarkStore {
    db: Arc<Database>,
    changes: broadcast::Sender<Change>,
    clock: fn() -> i64,
}

impl BookmarkStore {
    pub fn new(db: Arc<Database>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        BookmarkStore {
            db,
            changes,
            clock: now_millis,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    fn publish(&self, owner: &str, id: i64, kind: ChangeKind) {
        // No receivers is the common case.
        let _ = self.changes.send(Change {
            owner: owner.to_string(),
            id,
            kind,
        });
    }

    /// The caller's bookmarks, newest first. Anonymous callers get nothing.
    pub async fn list(&self, caller: &Caller) -> Result<Vec<Bookmark>> {
        let Some(subject) = caller.subject() else {
            return Ok(vec![]);
        };

        let query = format!(
            "SELECT {COLUMNS} FROM bookmarks WHERE user_id = ? ORDER BY created_at DESC, id DESC"
        );
        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![subject])
            .await?;

        let mut bookmarks = Vec::new();
        while let Some(row) = rows.next().await? {
            bookmarks.push(row_to_bookmark(&row)?);
        }
        Ok(bookmarks)
    }

    pub async fn create(&self, caller: &Caller, input: BookmarkInput) -> Result<Bookmark> {
        let subject = caller.subject().ok_or(StoreError::Unauthenticated)?;
        let tags = serde_json::to_string(&normalize_tags(&input.tags))?;
        let created_at = (self.clock)();

        let query = format!(
            "INSERT INTO bookmarks (user_id, url, title, tags, created_at) VALUES (?, ?, ?, ?, ?) RETURNING {COLUMNS}"
        );
        let mut rows = self
            .db
            .connection()
            .query(
                &query,
                libsql::params![subject, input.url, input.title, tags, created_at],
            )
            .await?;

        let bookmark = match rows.next().await? {
            Some(row) => row_to_bookmark(&row)?,
            None => return Err(StoreError::MissingRow),
        };

        tracing::info!(id = bookmark.id, owner = subject, "created bookmark");
        self.publish(subject, bookmark.id, ChangeKind::Created);
        Ok(bookmark)
    }

    /// Replaces url, title and tags. Ownership, id and creation time stay.
    pub async fn update(&self, caller: &Caller, id: i64, input: BookmarkInput) -> Result<Bookmark> {
        let subject = caller.subject().ok_or(StoreError::Unauthenticated)?;
        let tags = normalize_tags(&input.tags);
        let tags_json = serde_json::to_string(&tags)?;

        let _guard = self.db.write_lock().await;
        let existing = self.get(id).await?;
        let current = authorize(caller, existing.as_ref())?;

        self.db
            .connection()
            .execute(
                "UPDATE bookmarks SET url = ?, title = ?, tags = ? WHERE id = ?",
                libsql::params![input.url.clone(), input.title.clone(), tags_json, id],
            )
            .await?;

        let updated = Bookmark {
            url: input.url,
            title: input.title,
            tags,
            ..current.clone()
        };

        tracing::info!(id, owner = subject, "updated bookmark");
        self.publish(subject, id, ChangeKind::Updated);
        Ok(updated)
    }

    pub async fn remove(&self, caller: &Caller, id: i64) -> Result<()> {
        let subject = caller.subject().ok_or(StoreError::Unauthenticated)?;

        let _guard = self.db.write_lock().await;
        let existing = self.get(id).await?;
        authorize(caller, existing.as_ref())?;

        self.db
            .connection()
            .execute("DELETE FROM bookmarks WHERE id = ?", libsql::params![id])
            .await?;

        tracing::info!(id, owner = subject, "removed bookmark");
        self.publish(subject, id, ChangeKind::Removed);
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Bookmark>> {
        let query = format!("SELECT {COLUMNS} FROM bookmarks WHERE id = ?");
        let mut rows = self.db.connection().query(&query, libsql::params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_bookmark(&row)?)),
            None => Ok(None),
        }
    }
}

fn row_to_bookmark(row: &Row) -> Result<Bookmark> {
    let tags: String = row.get(4)?;
    Ok(Bookmark {
        id: row.get(0)?,
        user_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        tags: serde_json::from_str(&tags)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    async fn store() -> BookmarkStore {
        BookmarkStore::new(Arc::new(Database::in_memory().await.unwrap()))
    }

    fn alice() -> Caller {
        Caller::from("alice")
    }

    fn bob() -> Caller {
        Caller::from("bob")
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let store = store().await;
        let created = store
            .create(&alice(), BookmarkInput::new("https://x.test", "X", &["a", "b"]))
            .await
            .unwrap();

        let listed = store.list(&alice()).await.unwrap();
        assert_eq!(listed, vec![created.clone()]);
        assert_eq!(created.user_id, "alice");
        assert_eq!(created.url, "https://x.test");
        assert_eq!(created.title, "X");
        assert_eq!(created.tags, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_ids_are_never_reused() {
        let store = store().await;
        let first = store.create(&alice(), BookmarkInput::new("u1", "t1", &[])).await.unwrap();
        store.remove(&alice(), first.id).await.unwrap();
        let second = store.create(&alice(), BookmarkInput::new("u2", "t2", &[])).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_owner() {
        let store = store().await;
        store.create(&alice(), BookmarkInput::new("u1", "a1", &[])).await.unwrap();
        store.create(&bob(), BookmarkInput::new("u2", "b1", &[])).await.unwrap();
        store.create(&alice(), BookmarkInput::new("u3", "a2", &[])).await.unwrap();

        let mine = store.list(&alice()).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|b| b.user_id == "alice"));

        let theirs = store.list(&bob()).await.unwrap();
        assert_eq!(theirs.len(), 1);
        assert_eq!(theirs[0].title, "b1");
    }

    #[tokio::test]
    async fn test_anonymous_list_is_empty_and_writes_fail() {
        let store = store().await;
        store.create(&alice(), BookmarkInput::new("u", "t", &[])).await.unwrap();

        let anon = Caller::anonymous();
        assert!(store.list(&anon).await.unwrap().is_empty());
        assert!(matches!(
            store.create(&anon, BookmarkInput::new("u", "t", &[])).await,
            Err(StoreError::Unauthenticated)
        ));
        assert!(matches!(
            store.update(&anon, 1, BookmarkInput::new("u", "t", &[])).await,
            Err(StoreError::Unauthenticated)
        ));
        assert!(matches!(store.remove(&anon, 1).await, Err(StoreError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_foreign_record_is_not_found() {
        let store = store().await;
        let theirs = store
            .create(&bob(), BookmarkInput::new("https://b.test", "B", &["x"]))
            .await
            .unwrap();

        assert!(matches!(
            store.update(&alice(), theirs.id, BookmarkInput::new("evil", "evil", &[])).await,
            Err(StoreError::NotFoundOrForbidden)
        ));
        assert!(matches!(
            store.remove(&alice(), theirs.id).await,
            Err(StoreError::NotFoundOrForbidden)
        ));
        assert!(matches!(
            store.remove(&alice(), theirs.id + 1000).await,
            Err(StoreError::NotFoundOrForbidden)
        ));

        assert_eq!(store.list(&bob()).await.unwrap(), vec![theirs]);
    }

    #[tokio::test]
    async fn test_update_replaces_tags() {
        let store = store().await;
        let created = store.create(&alice(), BookmarkInput::new("u", "t", &["a"])).await.unwrap();

        let updated = store
            .update(&alice(), created.id, BookmarkInput::new("u2", "t2", &["c", "d"]))
            .await
            .unwrap();
        assert_eq!(updated.tags, vec!["c", "d"]);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.user_id, created.user_id);
        assert_eq!(updated.created_at, created.created_at);

        let listed = store.list(&alice()).await.unwrap();
        assert_eq!(listed, vec![updated]);
    }

    #[tokio::test]
    async fn test_remove_is_permanent() {
        let store = store().await;
        let created = store.create(&alice(), BookmarkInput::new("u", "t", &[])).await.unwrap();

        store.remove(&alice(), created.id).await.unwrap();
        assert!(store.list(&alice()).await.unwrap().is_empty());
        assert!(matches!(
            store.remove(&alice(), created.id).await,
            Err(StoreError::NotFoundOrForbidden)
        ));
    }

    static TICK: AtomicI64 = AtomicI64::new(1_000);

    fn ticking_clock() -> i64 {
        TICK.fetch_add(10, Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_stable() {
        let store = store().await.with_clock(ticking_clock);
        let t1 = store.create(&alice(), BookmarkInput::new("u1", "t1", &[])).await.unwrap();
        let t2 = store.create(&alice(), BookmarkInput::new("u2", "t2", &[])).await.unwrap();
        let t3 = store.create(&alice(), BookmarkInput::new("u3", "t3", &[])).await.unwrap();
        assert!(t1.created_at < t2.created_at && t2.created_at < t3.created_at);

        let first = store.list(&alice()).await.unwrap();
        let ids: Vec<i64> = first.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![t3.id, t2.id, t1.id]);

        let second = store.list(&alice()).await.unwrap();
        assert_eq!(first, second);
    }

    fn fixed_clock() -> i64 {
        5
    }

    #[tokio::test]
    async fn test_equal_timestamps_list_higher_id_first() {
        let store = store().await.with_clock(fixed_clock);
        let first = store.create(&alice(), BookmarkInput::new("u1", "t1", &[])).await.unwrap();
        let second = store.create(&alice(), BookmarkInput::new("u2", "t2", &[])).await.unwrap();
        assert_eq!(first.created_at, second.created_at);

        let ids: Vec<i64> = store.list(&alice()).await.unwrap().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_tags_are_normalized_on_write() {
        let store = store().await;
        let created = store
            .create(&alice(), BookmarkInput::new("u", "t", &[" Rust ", "rust", "", "WEB"]))
            .await
            .unwrap();
        assert_eq!(created.tags, vec!["rust", "web"]);

        let updated = store
            .update(&alice(), created.id, BookmarkInput::new("u", "t", &["B", "b", "a"]))
            .await
            .unwrap();
        assert_eq!(updated.tags, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_writes_publish_changes() {
        let store = store().await;
        let mut rx = store.subscribe();

        let created = store.create(&alice(), BookmarkInput::new("u", "t", &[])).await.unwrap();
        store
            .update(&alice(), created.id, BookmarkInput::new("u", "t2", &[]))
            .await
            .unwrap();
        store.remove(&alice(), created.id).await.unwrap();
        let _ = store.remove(&bob(), created.id).await;

        let kinds: Vec<ChangeKind> = (0..3).map(|_| rx.try_recv().unwrap().kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Created, ChangeKind::Updated, ChangeKind::Removed]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_authorize_guard() {
        let record = Bookmark {
            id: 1,
            user_id: "alice".to_string(),
            url: "u".to_string(),
            title: "t".to_string(),
            tags: vec![],
            created_at: 0,
        };
        assert!(authorize(&alice(), Some(&record)).is_ok());
        assert!(matches!(authorize(&bob(), Some(&record)), Err(StoreError::NotFoundOrForbidden)));
        assert!(matches!(authorize(&alice(), None), Err(StoreError::NotFoundOrForbidden)));
        assert!(matches!(
            authorize(&Caller::anonymous(), Some(&record)),
            Err(StoreError::Unauthenticated)
        ));
    }
}
