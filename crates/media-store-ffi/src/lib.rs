//! UniFFI bindings for the media-store broker
//!
//! Kotlin hosts create one [`MediaStoreBridge`], forward channel calls into
//! [`MediaStoreBridge::call`], and after each call or activity callback pull
//! finished responses with [`MediaStoreBridge::drain_responses`].
//!
//! On Android the bridge talks to the real platform through JNI. Elsewhere it
//! runs over the in-memory platform so the binding can be exercised on a
//! desktop JVM.

use media_store_config::{Config, LoggingConfig};
use media_store_engine::{
    ActivityResult, BrokerSettings, ContentUri, ErrorKind, ForegroundContext, MediaStoreBroker,
    RequestId, Response, ResponseValue, StorageContext,
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

uniffi::setup_scaffolding!();

const DEFAULT_LOG_TAG: &str = "MediaStorePlus";

// ============ Errors ============

/// Errors that can cross the FFI boundary
/// Note: Field is named `reason` not `message` to avoid conflict with Throwable.message in Kotlin
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum FfiError {
    #[error("Config error: {reason}")]
    ConfigError { reason: String },
    #[error("Arguments are not valid JSON: {reason}")]
    InvalidJson { reason: String },
}

// ============ Logging ============

fn init_logger(level: log::LevelFilter, tag: &str) {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(level)
                .with_tag(tag),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        let _ = tag;
        // A second init is a no-op
        let _ = env_logger::Builder::from_default_env()
            .filter_level(level)
            .try_init();
    }
}

fn parse_level(level: &str) -> log::LevelFilter {
    log::LevelFilter::from_str(level).unwrap_or(log::LevelFilter::Debug)
}

fn init_logging_from(config: &LoggingConfig) {
    init_logger(parse_level(&config.level), &config.tag);
}

/// Start logging before a bridge exists. Unknown levels fall back to debug.
#[uniffi::export]
pub fn init_logging(level: String) {
    init_logger(parse_level(&level), DEFAULT_LOG_TAG);
}

// ============ Platform ============

/// Where storage contexts come from on this target
struct HostPlatform {
    #[cfg(not(target_os = "android"))]
    memory: media_store_engine::memory::MemoryPlatform,
}

impl HostPlatform {
    fn new() -> Self {
        Self {
            #[cfg(not(target_os = "android"))]
            memory: media_store_engine::memory::MemoryPlatform::new(),
        }
    }

    #[cfg(target_os = "android")]
    fn application(&self) -> StorageContext {
        media_store_android::storage_context()
    }

    #[cfg(not(target_os = "android"))]
    fn application(&self) -> StorageContext {
        self.memory.storage_context()
    }

    #[cfg(target_os = "android")]
    fn foreground(&self) -> Option<ForegroundContext> {
        media_store_android::foreground_context()
    }

    #[cfg(not(target_os = "android"))]
    fn foreground(&self) -> Option<ForegroundContext> {
        Some(self.memory.foreground_context())
    }

    fn sdk_int(&self) -> i64 {
        media_store_android::sdk_int()
    }
}

// ============ Bridge ============

/// One broker instance plus the platform it runs on.
#[derive(uniffi::Object)]
pub struct MediaStoreBridge {
    inner: Mutex<MediaStoreBroker>,
    platform: HostPlatform,
}

impl MediaStoreBridge {
    fn broker(&self) -> std::sync::MutexGuard<'_, MediaStoreBroker> {
        // Recover from poisoned mutex (another thread panicked while holding lock)
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[uniffi::export]
impl MediaStoreBridge {
    /// Create a bridge configured from `config_path`, or from the default
    /// config location when none is given.
    #[uniffi::constructor]
    pub fn new(config_path: Option<String>) -> Result<Self, FfiError> {
        let config = Config::load_or_default(config_path.as_deref().map(Path::new)).map_err(
            |e| FfiError::ConfigError {
                reason: e.to_string(),
            },
        )?;
        init_logging_from(&config.logging);

        let platform = HostPlatform::new();
        let settings = BrokerSettings {
            volume: config.storage.volume,
            max_consent_attempts: config.storage.max_consent_attempts,
        };
        let broker =
            MediaStoreBroker::new(Some(platform.application()), platform.sdk_int(), settings);
        log::info!("Media store bridge ready");

        Ok(Self {
            inner: Mutex::new(broker),
            platform,
        })
    }

    /// Submit a channel call. Returns the id its response will carry.
    pub fn call(
        &self,
        request_id: Option<String>,
        method: String,
        arguments_json: String,
    ) -> Result<String, FfiError> {
        let arguments = if arguments_json.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&arguments_json).map_err(|e| FfiError::InvalidJson {
                reason: e.to_string(),
            })?
        };
        let id = self
            .broker()
            .submit_call(request_id.map(RequestId::from), &method, arguments);
        Ok(id.as_str().to_string())
    }

    pub fn drain_responses(&self) -> Vec<ResponseDto> {
        self.broker()
            .drain_responses()
            .into_iter()
            .map(ResponseDto::from_engine)
            .collect()
    }

    /// Forward `onActivityResult`. Returns whether the result was ours.
    pub fn on_activity_result(
        &self,
        request_code: i32,
        result_ok: bool,
        data_uri: Option<String>,
    ) -> bool {
        let result = ActivityResult::from_parts(result_ok, data_uri.map(ContentUri::new));
        self.broker().on_activity_result(request_code, result)
    }

    pub fn on_media_scan_completed(&self, request_id: String, uri: Option<String>) -> bool {
        let uri = uri.map(ContentUri::new);
        self.broker()
            .on_media_scan_completed(&RequestId::from(request_id), uri)
    }

    /// Pick up the activity registered on the native side. Returns `false`
    /// when no activity is registered.
    pub fn activity_attached(&self) -> bool {
        match self.platform.foreground() {
            Some(foreground) => {
                self.broker().attach_foreground(foreground);
                true
            }
            None => {
                log::warn!("activity_attached called with no registered activity");
                false
            }
        }
    }

    pub fn activity_detached(&self) {
        self.broker().detach_foreground();
    }

    /// Requests still waiting on a prompt or scan
    pub fn in_flight(&self) -> u32 {
        self.broker().in_flight() as u32
    }
}

// ============ DTOs ============

/// A resolved request
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct ResponseDto {
    pub request_id: String,
    pub value: ResponseValueDto,
    /// snake_case failure reason, absent on success
    pub error: Option<String>,
    /// The whole response as JSON, for hosts that forward it verbatim
    pub json: String,
}

impl ResponseDto {
    fn from_engine(response: Response) -> Self {
        let json = serde_json::to_string(&response).unwrap_or_default();
        Self {
            request_id: response.request_id.as_str().to_string(),
            value: ResponseValueDto::from_engine(response.value),
            error: response.error.map(error_name),
            json,
        }
    }
}

fn error_name(kind: ErrorKind) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum ResponseValueDto {
    Bool { value: bool },
    Int { value: i64 },
    Text { value: String },
    Null,
}

impl ResponseValueDto {
    fn from_engine(value: ResponseValue) -> Self {
        match value {
            ResponseValue::Bool(value) => Self::Bool { value },
            ResponseValue::Int(value) => Self::Int { value },
            ResponseValue::Text(value) => Self::Text { value },
            ResponseValue::Null => Self::Null,
        }
    }
}
