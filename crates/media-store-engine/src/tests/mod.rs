use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::models::{Location, StorageCategory};

/// Write a temp file the way the caller hands over content to save or edit
pub fn temp_source(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

/// An image under Pictures/MyApp
pub fn test_location(name: &str) -> Location {
    Location::new(StorageCategory::Image, "Pictures", "MyApp", name)
}
