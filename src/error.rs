use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not authenticated")]
    Unauthenticated,
    /// Missing and foreign records are reported alike so callers cannot
    /// discover other users' ids.
    #[error("bookmark not found")]
    NotFoundOrForbidden,
    #[error("storage error")]
    Storage(#[from] libsql::Error),
    #[error("insert returned no row")]
    MissingRow,
    #[error("encoding error")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("url is required")]
    MissingUrl,
    #[error("title is required")]
    MissingTitle,
}

pub fn unpack_error(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_and_missing_share_message() {
        assert_eq!(StoreError::NotFoundOrForbidden.to_string(), "bookmark not found");
        assert_eq!(StoreError::Unauthenticated.to_string(), "not authenticated");
    }

    #[test]
    fn test_unpack_error_walks_sources() {
        let inner = serde_json::from_str::<Vec<String>>("{").unwrap_err();
        let inner_msg = inner.to_string();
        let err = StoreError::from(inner);
        let unpacked = unpack_error(&err);
        assert!(unpacked.starts_with("encoding error: "));
        assert!(unpacked.ends_with(&inner_msg));
        assert_eq!(unpacked.matches(inner_msg.as_str()).count(), 1);
    }
}
