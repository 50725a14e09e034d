use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::platform::PlatformError;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("No foreground or application context registered")]
    NoContext,
    #[error("No foreground activity to launch a system prompt from")]
    NoForegroundActivity,
    #[error("No matching file or document")]
    NotFound,
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("Failed to access temp file at {path}: {source}")]
    TempFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("User declined the system prompt")]
    UserDenied,
    #[error("Consent prompt launched {attempts} times without effect")]
    ConsentExhausted { attempts: u32 },
    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::NoContext => ErrorKind::NoContext,
            BrokerError::NoForegroundActivity => ErrorKind::NoForegroundActivity,
            BrokerError::NotFound => ErrorKind::NotFound,
            BrokerError::Platform(PlatformError::NeedsConsent(_)) => ErrorKind::ConsentUnavailable,
            BrokerError::Platform(PlatformError::Io(e))
                if e.kind() == std::io::ErrorKind::NotFound =>
            {
                ErrorKind::NotFound
            }
            BrokerError::Platform(PlatformError::Io(_)) => ErrorKind::Io,
            BrokerError::Platform(PlatformError::MalformedUri(_)) => ErrorKind::InvalidRequest,
            BrokerError::Platform(_) => ErrorKind::Provider,
            BrokerError::TempFile { .. } => ErrorKind::Io,
            BrokerError::UserDenied => ErrorKind::UserDenied,
            BrokerError::ConsentExhausted { .. } => ErrorKind::ConsentUnavailable,
            BrokerError::Encode(_) => ErrorKind::Provider,
        }
    }
}

/// Structured failure reason attached to falsy responses.
///
/// Happy-path values never carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    UserDenied,
    ConsentUnavailable,
    NoContext,
    NoForegroundActivity,
    Io,
    Provider,
    InvalidRequest,
    NotImplemented,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(BrokerError::NoContext.kind(), ErrorKind::NoContext);
        assert_eq!(BrokerError::UserDenied.kind(), ErrorKind::UserDenied);
        let io = BrokerError::Platform(PlatformError::Io(std::io::Error::other("disk")));
        assert_eq!(io.kind(), ErrorKind::Io);
        let provider = BrokerError::Platform(PlatformError::InsertFailed);
        assert_eq!(provider.kind(), ErrorKind::Provider);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NoForegroundActivity).unwrap();
        assert_eq!(json, "\"no_foreground_activity\"");
    }
}
