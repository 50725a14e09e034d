use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque content URI: a storage handle, a document, or a document tree.
///
/// The broker never interprets the string beyond composing row ids onto a
/// collection; everything else is up to the content provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ContentUri(String);

impl ContentUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into().trim().to_string())
    }

    /// Compose a row id onto a collection URI, producing a storage handle
    pub fn with_id(&self, row_id: i64) -> Self {
        Self(format!("{}/{}", self.0.trim_end_matches('/'), row_id))
    }

    /// The trailing numeric row id, if this looks like a storage handle
    pub fn row_id(&self) -> Option<i64> {
        self.0.rsplit('/').next()?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentUri {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<String> for ContentUri {
    fn from(uri: String) -> Self {
        Self::new(uri)
    }
}

impl From<ContentUri> for String {
    fn from(uri: ContentUri) -> Self {
        uri.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_whitespace() {
        let uri = ContentUri::new("  content://media/external/images/media/7\n");
        assert_eq!(uri.as_str(), "content://media/external/images/media/7");
    }

    #[test]
    fn test_with_id_composes_handle() {
        let collection = ContentUri::new("content://media/external/images/media");
        let handle = collection.with_id(42);
        assert_eq!(handle.as_str(), "content://media/external/images/media/42");
        assert_eq!(handle.row_id(), Some(42));
    }

    #[test]
    fn test_with_id_ignores_trailing_slash() {
        let collection = ContentUri::new("content://media/external/downloads/");
        assert_eq!(
            collection.with_id(3).as_str(),
            "content://media/external/downloads/3"
        );
    }

    #[test]
    fn test_row_id_absent_for_documents() {
        let uri = ContentUri::new(
            "content://com.android.externalstorage.documents/tree/primary%3AMusic",
        );
        assert_eq!(uri.row_id(), None);
    }
}
