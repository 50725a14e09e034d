//! Platform seam
//!
//! The broker talks to the operating system only through the traits in this
//! module. On Android they are implemented over JNI (`media-store-android`);
//! tests and desktop hosts use [`crate::memory`].

pub mod mime;

use std::any::Any;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::consent::RequestCode;
use crate::error::BrokerError;
use crate::models::{ContentUri, DocumentEntry, DocumentFlags};
use crate::request::RequestId;

/// Opaque, launchable consent request handed out by the platform together
/// with a [`PlatformError::NeedsConsent`] failure.
#[derive(Clone)]
pub struct ConsentToken(Arc<dyn Any + Send + Sync>);

impl ConsentToken {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Arc::new(inner))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for ConsentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConsentToken(..)")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The process lacks a write grant the user can hand out interactively
    #[error("user consent required")]
    NeedsConsent(ConsentToken),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Content provider error: {0}")]
    Provider(String),
    #[error("Malformed content uri: {0}")]
    MalformedUri(String),
    #[error("Insert returned no row")]
    InsertFailed,
}

/// `DISPLAY_NAME = ? AND RELATIVE_PATH = ?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSelection {
    pub display_name: String,
    pub relative_path: String,
}

/// Values for a freshly inserted content row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRow {
    pub display_name: String,
    pub mime_type: String,
    pub relative_path: String,
    pub pending: bool,
}

pub trait ContentResolver: Send + Sync {
    /// `_ID` of the first visible row matching the selection
    fn query_row_id(
        &self,
        collection: &ContentUri,
        selection: &RowSelection,
    ) -> Result<Option<i64>, PlatformError>;

    fn insert(&self, collection: &ContentUri, row: &NewRow) -> Result<ContentUri, PlatformError>;

    fn set_pending(&self, uri: &ContentUri, pending: bool) -> Result<(), PlatformError>;

    /// Returns the number of rows removed
    fn delete(
        &self,
        uri: &ContentUri,
        selection: Option<&RowSelection>,
    ) -> Result<usize, PlatformError>;

    /// Open a truncating write stream. Dropping the stream releases it.
    fn open_output(&self, uri: &ContentUri) -> Result<Box<dyn Write + Send>, PlatformError>;

    fn open_input(&self, uri: &ContentUri) -> Result<Box<dyn Read + Send>, PlatformError>;

    fn mime_type_from_extension(&self, extension: &str) -> Option<String> {
        mime::from_extension(extension).map(str::to_string)
    }
}

pub trait DocumentProvider: Send + Sync {
    /// Whether the URI is shaped like a document reference
    fn is_document_uri(&self, uri: &ContentUri) -> bool;

    /// `None` when the provider has no row for the document
    fn document_flags(&self, uri: &ContentUri) -> Result<Option<DocumentFlags>, PlatformError>;

    fn delete_document(&self, uri: &ContentUri) -> Result<bool, PlatformError>;

    /// Immediate children of a tree reference
    fn list_tree(&self, tree: &ContentUri) -> Result<Vec<DocumentEntry>, PlatformError>;

    /// Persist a read + write grant on a picked tree across restarts
    fn take_persistable_permission(&self, tree: &ContentUri) -> Result<(), PlatformError>;
}

pub trait MediaScanner: Send + Sync {
    /// Start a scan. Completion is reported back through
    /// `MediaStoreBroker::on_media_scan_completed` with the same request id.
    fn scan_file(&self, path: &Path, request_id: &RequestId) -> Result<(), PlatformError>;
}

/// Interactive capabilities only a foreground activity has.
pub trait ActivityHost: Send + Sync {
    fn launch_consent(&self, token: &ConsentToken, code: RequestCode) -> Result<(), PlatformError>;

    /// Root URI the system directory picker opens at, if the platform exposes one
    fn picker_root_uri(&self) -> Option<ContentUri>;

    fn launch_directory_picker(
        &self,
        initial_uri: Option<&ContentUri>,
        code: RequestCode,
    ) -> Result<(), PlatformError>;
}

/// Everything needed to touch storage from one context.
#[derive(Clone)]
pub struct StorageContext {
    pub resolver: Arc<dyn ContentResolver>,
    pub documents: Arc<dyn DocumentProvider>,
    pub scanner: Arc<dyn MediaScanner>,
}

#[derive(Clone)]
pub struct ForegroundContext {
    pub storage: StorageContext,
    pub host: Arc<dyn ActivityHost>,
}

/// Foreground activity first, process-wide application context second.
#[derive(Clone, Default)]
pub struct ContextChain {
    foreground: Option<ForegroundContext>,
    application: Option<StorageContext>,
}

impl ContextChain {
    pub fn new(application: Option<StorageContext>) -> Self {
        Self {
            foreground: None,
            application,
        }
    }

    pub fn attach_foreground(&mut self, foreground: ForegroundContext) {
        self.foreground = Some(foreground);
    }

    pub fn detach_foreground(&mut self) {
        self.foreground = None;
    }

    pub fn has_foreground(&self) -> bool {
        self.foreground.is_some()
    }

    pub fn storage(&self) -> Result<&StorageContext, BrokerError> {
        self.foreground
            .as_ref()
            .map(|fg| &fg.storage)
            .or(self.application.as_ref())
            .ok_or(BrokerError::NoContext)
    }

    pub fn host(&self) -> Result<&Arc<dyn ActivityHost>, BrokerError> {
        self.foreground
            .as_ref()
            .map(|fg| &fg.host)
            .ok_or(BrokerError::NoForegroundActivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPlatform;

    #[test]
    fn test_empty_chain_has_no_context() {
        let chain = ContextChain::default();
        assert!(matches!(chain.storage(), Err(BrokerError::NoContext)));
        assert!(matches!(chain.host(), Err(BrokerError::NoForegroundActivity)));
    }

    #[test]
    fn test_application_context_fallback() {
        let platform = MemoryPlatform::new();
        let chain = ContextChain::new(Some(platform.storage_context()));
        assert!(chain.storage().is_ok());
        assert!(chain.host().is_err());
    }

    #[test]
    fn test_foreground_preferred() {
        let app = MemoryPlatform::new();
        let activity = MemoryPlatform::new();
        let mut chain = ContextChain::new(Some(app.storage_context()));
        chain.attach_foreground(activity.foreground_context());

        let storage = chain.storage().unwrap();
        assert!(Arc::ptr_eq(&storage.resolver, &activity.storage_context().resolver));
        assert!(chain.host().is_ok());

        chain.detach_foreground();
        let storage = chain.storage().unwrap();
        assert!(Arc::ptr_eq(&storage.resolver, &app.storage_context().resolver));
    }

    #[test]
    fn test_consent_token_downcast() {
        let token = ConsentToken::new(7_i64);
        assert_eq!(token.downcast_ref::<i64>(), Some(&7));
        assert!(token.downcast_ref::<String>().is_none());
    }
}
