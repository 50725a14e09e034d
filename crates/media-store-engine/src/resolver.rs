//! Handle Resolver
//!
//! Maps a logical [`Location`] onto the storage handle of the row currently
//! holding it. Nothing is cached: a grant or a delete between two requests
//! can change what is visible.

use crate::models::{ContentUri, Location};
use crate::platform::{PlatformError, RowSelection, StorageContext};

pub fn selection_for(location: &Location) -> RowSelection {
    RowSelection {
        display_name: location.display_name.clone(),
        relative_path: location.relative_path(),
    }
}

/// Find the handle of an existing row, or `None` if nothing matches yet.
pub fn resolve(
    ctx: &StorageContext,
    volume: &str,
    location: &Location,
) -> Result<Option<ContentUri>, PlatformError> {
    let collection = location.category.collection_uri(volume);
    let selection = selection_for(location);
    let row_id = ctx.resolver.query_row_id(&collection, &selection)?;

    match row_id {
        Some(id) => {
            let handle = collection.with_id(id);
            log::debug!("Resolved {} to {handle}", location.display_name);
            Ok(Some(handle))
        }
        None => {
            log::debug!(
                "No row for {} under {}",
                location.display_name,
                selection.relative_path
            );
            Ok(None)
        }
    }
}
