use serde::{Deserialize, Serialize};

use super::ContentUri;

/// One child of a document tree, as reported by the document provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    pub name: Option<String>,
    pub uri: ContentUri,
    pub is_virtual: bool,
    pub is_directory: bool,
    /// MIME type; `None` for directories on most providers
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    /// Milliseconds since the epoch, 0 when unknown
    pub last_modified: i64,
    #[serde(rename = "length")]
    pub size_bytes: i64,
}

/// A tree reference together with its immediate children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTreeInfo {
    pub uri: ContentUri,
    pub children: Vec<DocumentEntry>,
}

impl DocumentTreeInfo {
    pub fn new(uri: ContentUri, children: Vec<DocumentEntry>) -> Self {
        Self { uri, children }
    }

    /// A tree with no visible children
    pub fn empty(uri: ContentUri) -> Self {
        Self::new(uri, Vec::new())
    }

    /// The tree's own reference followed by every child reference
    pub fn uri_list(&self) -> Vec<ContentUri> {
        std::iter::once(self.uri.clone())
            .chain(self.children.iter().map(|child| child.uri.clone()))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Per-document capability flags (`Document.COLUMN_FLAGS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocumentFlags(pub i32);

impl DocumentFlags {
    pub const SUPPORTS_WRITE: i32 = 0x2;
    pub const SUPPORTS_DELETE: i32 = 0x4;

    pub fn supports_write(self) -> bool {
        self.0 & Self::SUPPORTS_WRITE != 0
    }

    pub fn supports_delete(self) -> bool {
        self.0 & Self::SUPPORTS_DELETE != 0
    }
}
