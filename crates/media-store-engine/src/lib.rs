pub mod broker;
pub mod consent;
pub mod error;
pub mod memory;
pub mod models;
pub mod operations;
pub mod platform;
pub mod request;
pub mod resolver;
pub mod tree;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use broker::{ActivityResult, BrokerSettings, MediaStoreBroker};
pub use consent::{OperationState, RequestCode};
pub use error::{BrokerError, ErrorKind};
pub use models::*;
pub use platform::{ContextChain, ForegroundContext, PlatformError, StorageContext};
pub use request::{Request, RequestId, Response, ResponseValue};
