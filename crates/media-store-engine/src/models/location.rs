use relative_path::RelativePathBuf;
use serde::{Deserialize, Serialize};

use super::ContentUri;

/// Shared-storage content collection a file lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageCategory {
    Image,
    Audio,
    Video,
    Download,
}

impl StorageCategory {
    /// Decode the `dirType` integer used on the call channel.
    ///
    /// 0 = Image, 1 = Audio, 2 = Video, anything else = Download.
    pub fn from_dir_type(dir_type: i64) -> Self {
        match dir_type {
            0 => StorageCategory::Image,
            1 => StorageCategory::Audio,
            2 => StorageCategory::Video,
            _ => StorageCategory::Download,
        }
    }

    pub fn dir_type(self) -> i64 {
        match self {
            StorageCategory::Image => 0,
            StorageCategory::Audio => 1,
            StorageCategory::Video => 2,
            StorageCategory::Download => 3,
        }
    }

    /// Base collection URI for this category on the given volume
    pub fn collection_uri(self, volume: &str) -> ContentUri {
        let table = match self {
            StorageCategory::Image => "images/media",
            StorageCategory::Audio => "audio/media",
            StorageCategory::Video => "video/media",
            StorageCategory::Download => "downloads",
        };
        ContentUri::new(format!("content://media/{volume}/{table}"))
    }
}

/// Logical reference to a file in shared storage: category + path + name.
///
/// Not a stable identifier. Each request re-resolves it to a storage handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub category: StorageCategory,
    /// Top level shared directory, e.g. "Pictures" or "Music"
    pub root_dir_name: String,
    pub app_subfolder: String,
    pub display_name: String,
}

impl Location {
    pub fn new(
        category: StorageCategory,
        root_dir_name: impl Into<String>,
        app_subfolder: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            category,
            root_dir_name: root_dir_name.into(),
            app_subfolder: app_subfolder.into(),
            display_name: display_name.into(),
        }
    }

    /// The `RELATIVE_PATH` value for this location, always with a trailing separator.
    ///
    /// Empty and slash-only segments are dropped so "Pictures" + "" gives "Pictures/".
    pub fn relative_path(&self) -> String {
        let mut path = RelativePathBuf::new();
        for segment in [&self.root_dir_name, &self.app_subfolder] {
            let trimmed = segment.trim_matches('/');
            if !trimmed.is_empty() {
                path.push(trimmed);
            }
        }
        let path = path.normalize();
        if path.as_str().is_empty() {
            String::new()
        } else {
            format!("{}/", path.as_str())
        }
    }
}
