//! In-memory platform
//!
//! A self-contained stand-in for the content resolver, document provider,
//! media scanner and foreground activity. Used by the test suite and by hosts
//! that have no Android runtime underneath them.
//!
//! Modelled platform behaviour:
//! - pending rows are invisible to queries
//! - rows owned by another app ("foreign") need consent before they can be
//!   mutated, protected documents need consent for any access
//! - writes can be made to fail part way through a copy

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::consent::RequestCode;
use crate::models::{ContentUri, DocumentEntry, DocumentFlags, Location};
use crate::platform::{
    ActivityHost, ConsentToken, ContentResolver, DocumentProvider, ForegroundContext,
    MediaScanner, NewRow, PlatformError, RowSelection, StorageContext,
};
use crate::request::RequestId;

const DOCUMENTS_AUTHORITY: &str = "content://com.android.externalstorage.documents";
const BASE_TIMESTAMP: i64 = 1_700_000_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRow {
    pub collection: ContentUri,
    pub display_name: String,
    pub mime_type: String,
    pub relative_path: String,
    pub pending: bool,
    pub foreign: bool,
    pub granted: bool,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
struct MemoryDocument {
    tree: ContentUri,
    name: String,
    is_directory: bool,
    mime_type: Option<String>,
    last_modified: i64,
    flags: i32,
    protected: bool,
    granted: bool,
    data: Vec<u8>,
}

/// What a consent token unlocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentTarget {
    Row(i64),
    Document(ContentUri),
}

/// A system UI launch recorded by the in-memory activity host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    Consent {
        code: RequestCode,
        target: ConsentTarget,
    },
    DirectoryPicker {
        code: RequestCode,
        initial_uri: Option<ContentUri>,
    },
}

#[derive(Default)]
struct State {
    rows: BTreeMap<i64, MemoryRow>,
    trees: BTreeSet<ContentUri>,
    documents: BTreeMap<ContentUri, MemoryDocument>,
    next_id: i64,
    clock: i64,
    fail_writes_after: Option<usize>,
    fail_reads_after: Option<usize>,
    fail_listing: bool,
    delete_calls: usize,
    launches: Vec<Launch>,
    picker_root: Option<ContentUri>,
    scans: Vec<(PathBuf, RequestId)>,
    persisted_grants: Vec<ContentUri>,
}

impl State {
    fn row_for(&self, uri: &ContentUri) -> Option<i64> {
        let id = uri.row_id()?;
        let row = self.rows.get(&id)?;
        (row.collection.with_id(id) == *uri).then_some(id)
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        BASE_TIMESTAMP + self.clock * 1000
    }
}

struct Shared {
    state: Arc<Mutex<State>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // Recover from poisoned mutex (a test panicked while holding the lock)
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle to one in-memory platform. Clones share state.
#[derive(Clone)]
pub struct MemoryPlatform {
    shared: Arc<Shared>,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Arc::new(Mutex::new(State {
                    next_id: 1,
                    ..State::default()
                })),
            }),
        }
    }

    pub fn storage_context(&self) -> StorageContext {
        StorageContext {
            resolver: self.shared.clone(),
            documents: self.shared.clone(),
            scanner: self.shared.clone(),
        }
    }

    pub fn foreground_context(&self) -> ForegroundContext {
        ForegroundContext {
            storage: self.storage_context(),
            host: self.shared.clone(),
        }
    }

    /// Insert a visible row directly, bypassing the pending protocol
    pub fn seed_row(&self, volume: &str, location: &Location, data: &[u8], foreign: bool) -> i64 {
        let mut state = self.shared.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.rows.insert(
            id,
            MemoryRow {
                collection: location.category.collection_uri(volume),
                display_name: location.display_name.clone(),
                mime_type: "application/octet-stream".to_string(),
                relative_path: location.relative_path(),
                pending: false,
                foreign,
                granted: false,
                data: data.to_vec(),
            },
        );
        id
    }

    pub fn row(&self, id: i64) -> Option<MemoryRow> {
        self.shared.lock().rows.get(&id).cloned()
    }

    /// Rows at a location, pending ones included
    pub fn count_rows(&self, volume: &str, location: &Location) -> usize {
        let collection = location.category.collection_uri(volume);
        let relative_path = location.relative_path();
        self.shared
            .lock()
            .rows
            .values()
            .filter(|row| {
                row.collection == collection
                    && row.display_name == location.display_name
                    && row.relative_path == relative_path
            })
            .count()
    }

    pub fn delete_calls(&self) -> usize {
        self.shared.lock().delete_calls
    }

    /// Make every subsequently opened write stream fail after `bytes` bytes
    pub fn fail_writes_after(&self, bytes: usize) {
        self.shared.lock().fail_writes_after = Some(bytes);
    }

    /// Make every subsequently opened read stream fail after `bytes` bytes
    pub fn fail_reads_after(&self, bytes: usize) {
        self.shared.lock().fail_reads_after = Some(bytes);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.shared.lock().fail_listing = fail;
    }

    pub fn seed_tree(&self, name: &str) -> ContentUri {
        let uri = ContentUri::new(format!(
            "{DOCUMENTS_AUTHORITY}/tree/{}",
            urlencoding::encode(&format!("primary:{name}"))
        ));
        self.shared.lock().trees.insert(uri.clone());
        uri
    }

    pub fn seed_document(&self, tree: &ContentUri, name: &str, data: &[u8]) -> ContentUri {
        self.insert_document(tree, name, false, data)
    }

    pub fn seed_directory(&self, tree: &ContentUri, name: &str) -> ContentUri {
        self.insert_document(tree, name, true, &[])
    }

    fn insert_document(
        &self,
        tree: &ContentUri,
        name: &str,
        is_directory: bool,
        data: &[u8],
    ) -> ContentUri {
        let tree_id = tree.as_str().rsplit('/').next().unwrap_or_default();
        let tree_path = urlencoding::decode(tree_id)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| tree_id.to_string());
        let uri = ContentUri::new(format!(
            "{tree}/document/{}",
            urlencoding::encode(&format!("{tree_path}/{name}"))
        ));
        let mime_type = if is_directory {
            None
        } else {
            Some(
                crate::platform::mime::extension_of(Path::new(name))
                    .and_then(|ext| crate::platform::mime::from_extension(&ext))
                    .unwrap_or(crate::platform::mime::OCTET_STREAM)
                    .to_string(),
            )
        };

        let mut state = self.shared.lock();
        let last_modified = state.tick();
        state.documents.insert(
            uri.clone(),
            MemoryDocument {
                tree: tree.clone(),
                name: name.to_string(),
                is_directory,
                mime_type,
                last_modified,
                flags: DocumentFlags::SUPPORTS_WRITE | DocumentFlags::SUPPORTS_DELETE,
                protected: false,
                granted: false,
                data: data.to_vec(),
            },
        );
        uri
    }

    pub fn set_document_flags(&self, uri: &ContentUri, flags: i32) {
        if let Some(doc) = self.shared.lock().documents.get_mut(uri) {
            doc.flags = flags;
        }
    }

    /// Require consent for any access to this document
    pub fn protect_document(&self, uri: &ContentUri) {
        if let Some(doc) = self.shared.lock().documents.get_mut(uri) {
            doc.protected = true;
        }
    }

    pub fn document_data(&self, uri: &ContentUri) -> Option<Vec<u8>> {
        self.shared.lock().documents.get(uri).map(|d| d.data.clone())
    }

    /// Grant everything the user has been asked about so far
    pub fn grant_requested(&self) {
        let mut state = self.shared.lock();
        let targets: Vec<ConsentTarget> = state
            .launches
            .iter()
            .filter_map(|launch| match launch {
                Launch::Consent { target, .. } => Some(target.clone()),
                Launch::DirectoryPicker { .. } => None,
            })
            .collect();
        for target in targets {
            match target {
                ConsentTarget::Row(id) => {
                    if let Some(row) = state.rows.get_mut(&id) {
                        row.granted = true;
                    }
                }
                ConsentTarget::Document(uri) => {
                    if let Some(doc) = state.documents.get_mut(&uri) {
                        doc.granted = true;
                    }
                }
            }
        }
    }

    /// Grant a single foreign row, as if the user had approved only its prompt
    pub fn grant_row(&self, id: i64) {
        if let Some(row) = self.shared.lock().rows.get_mut(&id) {
            row.granted = true;
        }
    }

    pub fn launches(&self) -> Vec<Launch> {
        self.shared.lock().launches.clone()
    }

    pub fn set_picker_root(&self, root: Option<ContentUri>) {
        self.shared.lock().picker_root = root;
    }

    pub fn scans(&self) -> Vec<(PathBuf, RequestId)> {
        self.shared.lock().scans.clone()
    }

    pub fn persisted_grants(&self) -> Vec<ContentUri> {
        self.shared.lock().persisted_grants.clone()
    }
}

fn needs_consent(target: ConsentTarget) -> PlatformError {
    PlatformError::NeedsConsent(ConsentToken::new(target))
}

fn not_found(uri: &ContentUri) -> PlatformError {
    PlatformError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("No content at {uri}"),
    ))
}

impl ContentResolver for Shared {
    fn query_row_id(
        &self,
        collection: &ContentUri,
        selection: &RowSelection,
    ) -> Result<Option<i64>, PlatformError> {
        let state = self.lock();
        let id = state
            .rows
            .iter()
            .find(|(_, row)| {
                !row.pending
                    && row.collection == *collection
                    && row.display_name == selection.display_name
                    && row.relative_path == selection.relative_path
            })
            .map(|(id, _)| *id);
        Ok(id)
    }

    fn insert(&self, collection: &ContentUri, row: &NewRow) -> Result<ContentUri, PlatformError> {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        // MediaStore normalises RELATIVE_PATH to end with a separator
        let relative_path = if row.relative_path.ends_with('/') {
            row.relative_path.clone()
        } else {
            format!("{}/", row.relative_path)
        };
        state.rows.insert(
            id,
            MemoryRow {
                collection: collection.clone(),
                display_name: row.display_name.clone(),
                mime_type: row.mime_type.clone(),
                relative_path,
                pending: row.pending,
                foreign: false,
                granted: false,
                data: Vec::new(),
            },
        );
        Ok(collection.with_id(id))
    }

    fn set_pending(&self, uri: &ContentUri, pending: bool) -> Result<(), PlatformError> {
        let mut state = self.lock();
        let id = state.row_for(uri).ok_or_else(|| not_found(uri))?;
        let row = state.rows.get_mut(&id).ok_or_else(|| not_found(uri))?;
        if row.foreign && !row.granted {
            return Err(needs_consent(ConsentTarget::Row(id)));
        }
        row.pending = pending;
        Ok(())
    }

    fn delete(
        &self,
        uri: &ContentUri,
        selection: Option<&RowSelection>,
    ) -> Result<usize, PlatformError> {
        let mut state = self.lock();
        state.delete_calls += 1;
        let Some(id) = state.row_for(uri) else {
            return Ok(0);
        };
        let row = &state.rows[&id];
        if let Some(selection) = selection
            && (row.display_name != selection.display_name
                || row.relative_path != selection.relative_path)
        {
            return Ok(0);
        }
        if row.foreign && !row.granted {
            return Err(needs_consent(ConsentTarget::Row(id)));
        }
        state.rows.remove(&id);
        Ok(1)
    }

    fn open_output(&self, uri: &ContentUri) -> Result<Box<dyn Write + Send>, PlatformError> {
        let mut state = self.lock();
        let target = if let Some(id) = state.row_for(uri) {
            let row = state.rows.get_mut(&id).ok_or_else(|| not_found(uri))?;
            if row.foreign && !row.granted {
                return Err(needs_consent(ConsentTarget::Row(id)));
            }
            row.data.clear();
            WriteTarget::Row(id)
        } else {
            let doc = state.documents.get_mut(uri).ok_or_else(|| not_found(uri))?;
            if doc.protected && !doc.granted {
                return Err(needs_consent(ConsentTarget::Document(uri.clone())));
            }
            doc.data.clear();
            WriteTarget::Document(uri.clone())
        };
        let limit = state.fail_writes_after;
        drop(state);

        Ok(Box::new(MemoryWriter {
            state: self.state.clone(),
            target,
            written: 0,
            limit,
        }))
    }

    fn open_input(&self, uri: &ContentUri) -> Result<Box<dyn Read + Send>, PlatformError> {
        let state = self.lock();
        let data = if let Some(id) = state.row_for(uri) {
            state.rows[&id].data.clone()
        } else {
            let doc = state.documents.get(uri).ok_or_else(|| not_found(uri))?;
            if doc.protected && !doc.granted {
                return Err(needs_consent(ConsentTarget::Document(uri.clone())));
            }
            doc.data.clone()
        };
        match state.fail_reads_after {
            Some(remaining) => Ok(Box::new(TruncatedReader {
                inner: Cursor::new(data),
                remaining,
            })),
            None => Ok(Box::new(Cursor::new(data))),
        }
    }
}

/// Serves at most `remaining` bytes, then fails
struct TruncatedReader {
    inner: Cursor<Vec<u8>>,
    remaining: usize,
}

impl Read for TruncatedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::other("injected read failure"));
        }
        let len = buf.len().min(self.remaining);
        let read = self.inner.read(&mut buf[..len])?;
        self.remaining -= read;
        Ok(read)
    }
}

enum WriteTarget {
    Row(i64),
    Document(ContentUri),
}

struct MemoryWriter {
    state: Arc<Mutex<State>>,
    target: WriteTarget,
    written: usize,
    limit: Option<usize>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let allowed = match self.limit {
            Some(limit) if self.written >= limit => {
                return Err(io::Error::other("injected write failure"));
            }
            Some(limit) => buf.len().min(limit - self.written),
            None => buf.len(),
        };
        let mut state = lock_state(&self.state);
        let data = match &self.target {
            WriteTarget::Row(id) => state.rows.get_mut(id).map(|row| &mut row.data),
            WriteTarget::Document(uri) => state.documents.get_mut(uri).map(|doc| &mut doc.data),
        };
        let data = data.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "row removed"))?;
        data.extend_from_slice(&buf[..allowed]);
        self.written += allowed;
        Ok(allowed)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DocumentProvider for Shared {
    fn is_document_uri(&self, uri: &ContentUri) -> bool {
        uri.as_str().starts_with(DOCUMENTS_AUTHORITY) && uri.as_str().contains("/document/")
    }

    fn document_flags(&self, uri: &ContentUri) -> Result<Option<DocumentFlags>, PlatformError> {
        Ok(self
            .lock()
            .documents
            .get(uri)
            .map(|doc| DocumentFlags(doc.flags)))
    }

    fn delete_document(&self, uri: &ContentUri) -> Result<bool, PlatformError> {
        let mut state = self.lock();
        state.delete_calls += 1;
        let doc = state.documents.get(uri).ok_or_else(|| not_found(uri))?;
        if doc.protected && !doc.granted {
            return Err(needs_consent(ConsentTarget::Document(uri.clone())));
        }
        state.documents.remove(uri);
        Ok(true)
    }

    fn list_tree(&self, tree: &ContentUri) -> Result<Vec<DocumentEntry>, PlatformError> {
        let state = self.lock();
        if state.fail_listing {
            return Err(PlatformError::Provider("listing failed".to_string()));
        }
        if !state.trees.contains(tree) {
            return Err(PlatformError::MalformedUri(tree.to_string()));
        }
        let mut children: Vec<DocumentEntry> = state
            .documents
            .iter()
            .filter(|(_, doc)| doc.tree == *tree)
            .map(|(uri, doc)| DocumentEntry {
                name: Some(doc.name.clone()),
                uri: uri.clone(),
                is_virtual: false,
                is_directory: doc.is_directory,
                mime_type: doc.mime_type.clone(),
                last_modified: doc.last_modified,
                size_bytes: doc.data.len() as i64,
            })
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    fn take_persistable_permission(&self, tree: &ContentUri) -> Result<(), PlatformError> {
        self.lock().persisted_grants.push(tree.clone());
        Ok(())
    }
}

impl MediaScanner for Shared {
    fn scan_file(&self, path: &Path, request_id: &RequestId) -> Result<(), PlatformError> {
        self.lock()
            .scans
            .push((path.to_path_buf(), request_id.clone()));
        Ok(())
    }
}

impl ActivityHost for Shared {
    fn launch_consent(&self, token: &ConsentToken, code: RequestCode) -> Result<(), PlatformError> {
        let target = token
            .downcast_ref::<ConsentTarget>()
            .cloned()
            .ok_or_else(|| PlatformError::Provider("foreign consent token".to_string()))?;
        self.lock().launches.push(Launch::Consent { code, target });
        Ok(())
    }

    fn picker_root_uri(&self) -> Option<ContentUri> {
        self.lock().picker_root.clone()
    }

    fn launch_directory_picker(
        &self,
        initial_uri: Option<&ContentUri>,
        code: RequestCode,
    ) -> Result<(), PlatformError> {
        self.lock().launches.push(Launch::DirectoryPicker {
            code,
            initial_uri: initial_uri.cloned(),
        });
        Ok(())
    }
}
