//! Content Operations
//!
//! Primitive create/read/update/delete against a resolved handle or a caller
//! supplied reference. Streams are scoped to each call and released on every
//! exit path, including errors.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::BrokerError;
use crate::models::{ContentUri, Location};
use crate::platform::{NewRow, PlatformError, StorageContext, mime};
use crate::resolver::{resolve, selection_for};

/// Write `source` into `location`, replacing any existing row.
///
/// The new row is inserted pending and only made visible once every byte has
/// been copied. On success the source temp file is removed.
pub fn create_or_replace(
    ctx: &StorageContext,
    volume: &str,
    source: &Path,
    location: &Location,
) -> Result<ContentUri, BrokerError> {
    let mut input = open_temp(source)?;
    let mime_type = mime_type_for(ctx, source);
    log::debug!(
        "Saving {} as {mime_type} into {}",
        location.display_name,
        location.relative_path()
    );

    delete_by_location(ctx, volume, location)?;

    let collection = location.category.collection_uri(volume);
    let row = NewRow {
        display_name: location.display_name.clone(),
        mime_type,
        relative_path: location.relative_path(),
        pending: true,
    };
    let uri = ctx.resolver.insert(&collection, &row)?;

    if let Err(e) = copy_to_uri(ctx, &mut input, &uri) {
        // The row is still pending, so nobody has seen it. Drop it.
        if let Err(rollback) = ctx.resolver.delete(&uri, None) {
            log::warn!("Failed to remove pending row {uri} after copy failure: {rollback}");
        }
        return Err(e.into());
    }

    ctx.resolver.set_pending(&uri, false)?;
    remove_temp(source);
    log::info!("Saved {} to {uri}", location.display_name);
    Ok(uri)
}

/// Delete the row at `location`. Returns whether one existed.
pub fn delete_by_location(
    ctx: &StorageContext,
    volume: &str,
    location: &Location,
) -> Result<bool, BrokerError> {
    let Some(handle) = resolve(ctx, volume, location)? else {
        return Ok(false);
    };
    let selection = selection_for(location);
    let removed = ctx.resolver.delete(&handle, Some(&selection))?;
    log::debug!("Deleted {removed} row(s) for {}", location.display_name);
    Ok(true)
}

pub fn delete_by_reference(ctx: &StorageContext, uri: &ContentUri) -> Result<bool, BrokerError> {
    let deleted = ctx.documents.delete_document(uri)?;
    log::debug!("Deleted document {uri}: {deleted}");
    Ok(deleted)
}

/// Copy the file at `location` into `destination`. `Ok(false)` when there is no such file.
pub fn read_by_location(
    ctx: &StorageContext,
    volume: &str,
    location: &Location,
    destination: &Path,
) -> Result<bool, BrokerError> {
    match resolve(ctx, volume, location)? {
        Some(handle) => read_by_reference(ctx, &handle, destination),
        None => Ok(false),
    }
}

pub fn read_by_reference(
    ctx: &StorageContext,
    uri: &ContentUri,
    destination: &Path,
) -> Result<bool, BrokerError> {
    let mut input = ctx.resolver.open_input(uri)?;
    let mut output = File::create(destination).map_err(|source| BrokerError::TempFile {
        path: destination.to_path_buf(),
        source,
    })?;
    match io::copy(&mut input, &mut output) {
        Ok(copied) => {
            log::debug!("Read {copied} bytes from {uri}");
            Ok(true)
        }
        Err(e) => {
            // A truncated copy must not look like a finished read
            drop(output);
            remove_temp(destination);
            Err(PlatformError::Io(e).into())
        }
    }
}

/// Overwrite the document at `uri` with the contents of `source`.
pub fn edit_by_reference(
    ctx: &StorageContext,
    uri: &ContentUri,
    source: &Path,
) -> Result<bool, BrokerError> {
    let mut input = open_temp(source)?;
    copy_to_uri(ctx, &mut input, uri)?;
    remove_temp(source);
    log::info!("Edited {uri}");
    Ok(true)
}

pub fn is_writable(ctx: &StorageContext, uri: &ContentUri) -> Result<bool, BrokerError> {
    if !ctx.documents.is_document_uri(uri) {
        return Ok(false);
    }
    let flags = ctx.documents.document_flags(uri)?.unwrap_or_default();
    Ok(flags.supports_write())
}

pub fn is_deletable(ctx: &StorageContext, uri: &ContentUri) -> Result<bool, BrokerError> {
    if !ctx.documents.is_document_uri(uri) {
        return Ok(false);
    }
    let flags = ctx.documents.document_flags(uri)?.unwrap_or_default();
    Ok(flags.supports_delete())
}

/// A recognised document reference the provider still has a row for
pub fn exists(ctx: &StorageContext, uri: &ContentUri) -> Result<bool, BrokerError> {
    if !ctx.documents.is_document_uri(uri) {
        return Ok(false);
    }
    Ok(ctx.documents.document_flags(uri)?.is_some())
}

pub fn mime_type_for(ctx: &StorageContext, path: &Path) -> String {
    mime::extension_of(path)
        .and_then(|ext| ctx.resolver.mime_type_from_extension(&ext))
        .unwrap_or_else(|| mime::OCTET_STREAM.to_string())
}

fn copy_to_uri(
    ctx: &StorageContext,
    input: &mut impl Read,
    uri: &ContentUri,
) -> Result<u64, PlatformError> {
    let mut output = ctx.resolver.open_output(uri)?;
    let copied = io::copy(input, &mut output)?;
    output.flush()?;
    Ok(copied)
}

fn open_temp(path: &Path) -> Result<File, BrokerError> {
    File::open(path).map_err(|source| BrokerError::TempFile {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_temp(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("Failed to remove temp file {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPlatform;
    use crate::models::StorageCategory;
    use crate::tests::{temp_source, test_location};
    use pretty_assertions::assert_eq;

    const VOLUME: &str = "external";

    #[test]
    fn test_create_then_resolve_and_read() {
        let platform = MemoryPlatform::new();
        let ctx = platform.storage_context();
        let dir = tempfile::tempdir().unwrap();
        let source = temp_source(&dir, "a.jpg", b"jpeg bytes");
        let location = test_location("a.jpg");

        let uri = create_or_replace(&ctx, VOLUME, &source, &location).unwrap();

        assert_eq!(resolve(&ctx, VOLUME, &location).unwrap(), Some(uri));
        let destination = dir.path().join("out.jpg");
        assert!(read_by_location(&ctx, VOLUME, &location, &destination).unwrap());
        assert_eq!(std::fs::read(&destination).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn test_create_removes_temp_file() {
        let platform = MemoryPlatform::new();
        let dir = tempfile::tempdir().unwrap();
        let source = temp_source(&dir, "a.jpg", b"x");

        create_or_replace(&platform.storage_context(), VOLUME, &source, &test_location("a.jpg"))
            .unwrap();

        assert!(!source.exists());
    }

    #[test]
    fn test_create_sets_mime_and_clears_pending() {
        let platform = MemoryPlatform::new();
        let dir = tempfile::tempdir().unwrap();
        let source = temp_source(&dir, "clip.mp4", b"x");
        let location = Location::new(StorageCategory::Video, "Movies", "MyApp", "clip.mp4");

        let uri =
            create_or_replace(&platform.storage_context(), VOLUME, &source, &location).unwrap();

        let row = platform.row(uri.row_id().unwrap()).unwrap();
        assert_eq!(row.mime_type, "video/mp4");
        assert_eq!(row.relative_path, "Movies/MyApp/");
        assert!(!row.pending);
    }

    #[test]
    fn test_create_replaces_existing_row() {
        let platform = MemoryPlatform::new();
        let ctx = platform.storage_context();
        let dir = tempfile::tempdir().unwrap();
        let location = test_location("a.jpg");

        let first = create_or_replace(&ctx, VOLUME, &temp_source(&dir, "a.jpg", b"old"), &location)
            .unwrap();
        let second =
            create_or_replace(&ctx, VOLUME, &temp_source(&dir, "a.jpg", b"new"), &location)
                .unwrap();

        assert_ne!(first, second);
        assert_eq!(platform.count_rows(VOLUME, &location), 1);
        assert_eq!(platform.row(second.row_id().unwrap()).unwrap().data, b"new");
    }

    #[test]
    fn test_failed_copy_leaves_no_visible_row() {
        let platform = MemoryPlatform::new();
        let ctx = platform.storage_context();
        let dir = tempfile::tempdir().unwrap();
        let source = temp_source(&dir, "a.jpg", &[7u8; 4096]);
        let location = test_location("a.jpg");
        platform.fail_writes_after(1024);

        let result = create_or_replace(&ctx, VOLUME, &source, &location);

        assert!(matches!(result, Err(BrokerError::Platform(PlatformError::Io(_)))));
        assert_eq!(resolve(&ctx, VOLUME, &location).unwrap(), None);
        assert_eq!(platform.count_rows(VOLUME, &location), 0);
        // Temp file is kept so the caller can retry
        assert!(source.exists());
    }

    #[test]
    fn test_create_with_missing_source_keeps_existing_row() {
        let platform = MemoryPlatform::new();
        let ctx = platform.storage_context();
        let dir = tempfile::tempdir().unwrap();
        let location = test_location("a.jpg");
        platform.seed_row(VOLUME, &location, b"keep", false);

        let result = create_or_replace(&ctx, VOLUME, &dir.path().join("missing.jpg"), &location);

        assert!(matches!(result, Err(BrokerError::TempFile { .. })));
        assert!(resolve(&ctx, VOLUME, &location).unwrap().is_some());
    }

    #[test]
    fn test_unknown_extension_falls_back_to_octet_stream() {
        let platform = MemoryPlatform::new();
        let ctx = platform.storage_context();
        assert_eq!(
            mime_type_for(&ctx, Path::new("/tmp/blob.unknownext")),
            "application/octet-stream"
        );
        assert_eq!(mime_type_for(&ctx, Path::new("/tmp/a.PNG")), "image/png");
    }

    #[test]
    fn test_delete_by_location_missing_returns_false() {
        let platform = MemoryPlatform::new();
        let deleted =
            delete_by_location(&platform.storage_context(), VOLUME, &test_location("nope.jpg"))
                .unwrap();
        assert!(!deleted);
        assert_eq!(platform.delete_calls(), 0);
    }

    #[test]
    fn test_delete_by_location_existing() {
        let platform = MemoryPlatform::new();
        let ctx = platform.storage_context();
        let location = test_location("a.jpg");
        platform.seed_row(VOLUME, &location, b"x", false);

        assert!(delete_by_location(&ctx, VOLUME, &location).unwrap());
        assert_eq!(resolve(&ctx, VOLUME, &location).unwrap(), None);
    }

    #[test]
    fn test_delete_foreign_row_needs_consent() {
        let platform = MemoryPlatform::new();
        let location = test_location("a.jpg");
        platform.seed_row(VOLUME, &location, b"x", true);

        let result = delete_by_location(&platform.storage_context(), VOLUME, &location);

        assert!(matches!(
            result,
            Err(BrokerError::Platform(PlatformError::NeedsConsent(_)))
        ));
    }

    #[test]
    fn test_read_by_location_missing_returns_false() {
        let platform = MemoryPlatform::new();
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out");

        let found = read_by_location(
            &platform.storage_context(),
            VOLUME,
            &test_location("nope.jpg"),
            &destination,
        )
        .unwrap();

        assert!(!found);
        assert!(!destination.exists());
    }

    #[test]
    fn test_edit_and_read_by_reference() {
        let platform = MemoryPlatform::new();
        let ctx = platform.storage_context();
        let tree = platform.seed_tree("Documents");
        let doc = platform.seed_document(&tree, "notes.txt", b"v1");
        let dir = tempfile::tempdir().unwrap();
        let source = temp_source(&dir, "edit.txt", b"v2 is longer");

        assert!(edit_by_reference(&ctx, &doc, &source).unwrap());
        assert!(!source.exists());

        let destination = dir.path().join("read.txt");
        assert!(read_by_reference(&ctx, &doc, &destination).unwrap());
        assert_eq!(std::fs::read(&destination).unwrap(), b"v2 is longer");
    }

    #[test]
    fn test_failed_read_removes_partial_destination() {
        // Given a document whose stream breaks after a few bytes
        let platform = MemoryPlatform::new();
        let ctx = platform.storage_context();
        let tree = platform.seed_tree("Documents");
        let doc = platform.seed_document(&tree, "big.bin", &[7u8; 4096]);
        platform.fail_reads_after(100);
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("big.bin");

        // When it is read
        let result = read_by_reference(&ctx, &doc, &destination);

        // Then the call fails and leaves no truncated copy behind
        assert!(matches!(
            result,
            Err(BrokerError::Platform(PlatformError::Io(_)))
        ));
        assert!(!destination.exists());
    }

    #[test]
    fn test_edit_truncates_previous_content() {
        let platform = MemoryPlatform::new();
        let ctx = platform.storage_context();
        let tree = platform.seed_tree("Documents");
        let doc = platform.seed_document(&tree, "notes.txt", b"a much longer original");
        let dir = tempfile::tempdir().unwrap();

        edit_by_reference(&ctx, &doc, &temp_source(&dir, "e.txt", b"short")).unwrap();

        let destination = dir.path().join("read.txt");
        read_by_reference(&ctx, &doc, &destination).unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"short");
    }

    #[test]
    fn test_delete_by_reference() {
        let platform = MemoryPlatform::new();
        let ctx = platform.storage_context();
        let tree = platform.seed_tree("Documents");
        let doc = platform.seed_document(&tree, "notes.txt", b"v1");

        assert!(delete_by_reference(&ctx, &doc).unwrap());
        assert!(!exists(&ctx, &doc).unwrap());
    }

    #[test]
    fn test_capability_checks() {
        let platform = MemoryPlatform::new();
        let ctx = platform.storage_context();
        let tree = platform.seed_tree("Documents");
        let doc = platform.seed_document(&tree, "notes.txt", b"v1");
        platform.set_document_flags(&doc, crate::models::DocumentFlags::SUPPORTS_WRITE);

        assert!(is_writable(&ctx, &doc).unwrap());
        assert!(!is_deletable(&ctx, &doc).unwrap());
        assert!(exists(&ctx, &doc).unwrap());
    }

    #[test]
    fn test_capability_checks_on_non_document_uri() {
        let platform = MemoryPlatform::new();
        let ctx = platform.storage_context();
        let uri = ContentUri::new("content://media/external/images/media/5");

        assert!(!is_writable(&ctx, &uri).unwrap());
        assert!(!is_deletable(&ctx, &uri).unwrap());
        assert!(!exists(&ctx, &uri).unwrap());
    }
}
