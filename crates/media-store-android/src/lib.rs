//! Android platform layer for the media-store broker
//!
//! Implements the engine's platform traits over JNI: MediaStore rows through
//! the `ContentResolver`, documents through `DocumentsContract`, consent and
//! picker prompts through the registered foreground activity.
//!
//! The Kotlin side registers its activity and media-scan host through the
//! `dev.mediastore.MediaStoreHost` native methods exported here.

#[cfg(target_os = "android")]
mod android;

#[cfg(target_os = "android")]
pub use android::*;

/// Platform API level. Off Android there is none.
#[cfg(not(target_os = "android"))]
pub fn sdk_int() -> i64 {
    0
}
