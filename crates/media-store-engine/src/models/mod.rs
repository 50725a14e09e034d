pub mod content_uri;
pub mod document;
pub mod location;

pub use content_uri::ContentUri;
pub use document::{DocumentEntry, DocumentFlags, DocumentTreeInfo};
pub use location::{Location, StorageCategory};
