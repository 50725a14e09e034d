//! Tree Enumeration and the picker seed used by directory access requests.

use crate::models::{ContentUri, DocumentTreeInfo};
use crate::platform::{PlatformError, StorageContext};

/// Immediate children of a tree
pub fn enumerate(
    ctx: &StorageContext,
    tree: &ContentUri,
) -> Result<DocumentTreeInfo, PlatformError> {
    let children = ctx.documents.list_tree(tree)?;
    log::debug!("Tree {tree} has {} children", children.len());
    Ok(DocumentTreeInfo::new(tree.clone(), children))
}

/// Like [`enumerate`], but a tree that cannot be listed has no visible
/// children. The error is logged, not propagated.
pub fn list_children(ctx: &StorageContext, tree: &ContentUri) -> DocumentTreeInfo {
    enumerate(ctx, tree).unwrap_or_else(|e| {
        log::error!("Failed to list tree {tree}: {e}");
        DocumentTreeInfo::empty(tree.clone())
    })
}

/// Seed URI for the directory picker.
///
/// The picker expects the document form of the storage root with the start
/// path appended as an encoded document id: `/root/` becomes `/document/`,
/// then `%3A` and the path segments joined with `%2F`.
pub fn picker_initial_uri(root: &ContentUri, start_path: &str) -> ContentUri {
    let encoded = start_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("%2F");
    let document_root = root.as_str().replace("/root/", "/document/");
    ContentUri::new(format!("{document_root}%3A{encoded}"))
}
