use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: i64,
    pub user_id: String,
    pub url: String,
    pub title: String,
    pub tags: Vec<String>,
    pub created_at: i64,
}

impl Bookmark {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// The mutable field set of a bookmark, as submitted by a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookmarkInput {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BookmarkInput {
    pub fn new(url: &str, title: &str, tags: &[&str]) -> Self {
        BookmarkInput {
            url: url.to_string(),
            title: title.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Trims url and title and rejects blanks.
    pub fn validated(self) -> Result<Self, ValidationError> {
        let url = self.url.trim();
        let title = self.title.trim();
        if url.is_empty() {
            return Err(ValidationError::MissingUrl);
        }
        if title.is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        Ok(BookmarkInput {
            url: url.to_string(),
            title: title.to_string(),
            tags: self.tags,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Removed,
}

/// Published after every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub owner: String,
    pub id: i64,
    pub kind: ChangeKind,
}
