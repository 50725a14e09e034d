//! Consent-Recovery State Machine
//!
//! ```text
//! Idle -> Executing -> Completed
//!                   -> AwaitingConsent -(granted)-> Executing (replay from snapshot)
//!                                      -(denied)--> Completed (falsy response)
//! ```
//!
//! Every mutating request is captured as a [`PendingOperation`] before the
//! platform is touched. When the platform answers with a consent token the
//! snapshot is parked under the request code of its kind until the system
//! prompt completes. Only one prompt per request code is launched at a time;
//! other requests needing the same code queue behind it, so a completion is
//! always attributed to the request that launched it.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use crate::error::BrokerError;
use crate::models::{ContentUri, Location};
use crate::platform::{ConsentToken, PlatformError};
use crate::request::{RequestId, ResponseValue};

/// Activity request codes tagging each system prompt launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestCode {
    Save,
    Delete,
    DirectoryAccess,
    Edit,
    DeleteByUri,
    ReadByUri,
    Read,
}

impl RequestCode {
    pub const ALL: [RequestCode; 7] = [
        RequestCode::Save,
        RequestCode::Delete,
        RequestCode::DirectoryAccess,
        RequestCode::Edit,
        RequestCode::DeleteByUri,
        RequestCode::ReadByUri,
        RequestCode::Read,
    ];

    pub fn code(self) -> i32 {
        match self {
            RequestCode::Save => 990,
            RequestCode::Delete => 991,
            RequestCode::DirectoryAccess => 992,
            RequestCode::Edit => 993,
            RequestCode::DeleteByUri => 994,
            RequestCode::ReadByUri => 995,
            RequestCode::Read => 996,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

/// Full parameter set of an operation that may have to be replayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOperation {
    Save {
        temp_file_path: PathBuf,
        location: Location,
    },
    Delete {
        location: Location,
    },
    Edit {
        content_uri: ContentUri,
        temp_file_path: PathBuf,
    },
    DeleteByUri {
        content_uri: ContentUri,
    },
    ReadByUri {
        content_uri: ContentUri,
        temp_file_path: PathBuf,
    },
    Read {
        temp_file_path: PathBuf,
        location: Location,
    },
    DirectoryAccess {
        initial_relative_path: Option<String>,
    },
}

impl PendingOperation {
    pub fn request_code(&self) -> RequestCode {
        match self {
            PendingOperation::Save { .. } => RequestCode::Save,
            PendingOperation::Delete { .. } => RequestCode::Delete,
            PendingOperation::Edit { .. } => RequestCode::Edit,
            PendingOperation::DeleteByUri { .. } => RequestCode::DeleteByUri,
            PendingOperation::ReadByUri { .. } => RequestCode::ReadByUri,
            PendingOperation::Read { .. } => RequestCode::Read,
            PendingOperation::DirectoryAccess { .. } => RequestCode::DirectoryAccess,
        }
    }

    /// What the caller receives when the operation does not go through
    pub fn failure_value(&self) -> ResponseValue {
        match self {
            PendingOperation::DirectoryAccess { .. } => ResponseValue::Text(String::new()),
            _ => ResponseValue::Bool(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Executing,
    AwaitingConsent(RequestCode),
    /// Waiting for an earlier prompt with the same code to resolve
    Queued(RequestCode),
    AwaitingPicker,
    AwaitingScan,
}

/// Result of one execution attempt, matched on by the broker
#[derive(Debug)]
pub enum OperationOutcome<T> {
    Success(T),
    NeedsConsent(ConsentToken),
    Failure(BrokerError),
}

impl<T> From<Result<T, BrokerError>> for OperationOutcome<T> {
    fn from(result: Result<T, BrokerError>) -> Self {
        match result {
            Ok(value) => OperationOutcome::Success(value),
            Err(BrokerError::Platform(PlatformError::NeedsConsent(token))) => {
                OperationOutcome::NeedsConsent(token)
            }
            Err(e) => OperationOutcome::Failure(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub request_id: RequestId,
    pub operation: PendingOperation,
    /// Consent prompts launched for this request so far
    pub attempts: u32,
    pub state: OperationState,
}

impl PendingEntry {
    pub fn new(request_id: RequestId, operation: PendingOperation) -> Self {
        Self {
            request_id,
            operation,
            attempts: 0,
            state: OperationState::Executing,
        }
    }
}

/// Requests parked on one request code
#[derive(Debug, Default)]
struct CodeSlot {
    /// The request whose prompt is on screen
    prompted: Option<PendingEntry>,
    /// Requests waiting for that prompt to finish before launching their own
    queued: VecDeque<PendingEntry>,
}

impl CodeSlot {
    fn entries(&self) -> impl Iterator<Item = &PendingEntry> {
        self.prompted.iter().chain(self.queued.iter())
    }

    fn is_empty(&self) -> bool {
        self.prompted.is_none() && self.queued.is_empty()
    }
}

/// Parked snapshots.
///
/// Activity results carry only the request code, so at most one prompt per
/// code is on screen at a time. Later requests for the same code queue up
/// and launch in order once the prompt ahead of them resolves.
#[derive(Debug, Default)]
pub struct PendingTable {
    slots: HashMap<RequestCode, CodeSlot>,
}

impl PendingTable {
    /// Whether a prompt for `code` is on screen
    pub fn is_prompting(&self, code: RequestCode) -> bool {
        self.slots
            .get(&code)
            .is_some_and(|slot| slot.prompted.is_some())
    }

    /// Record the request whose prompt was just launched for `code`
    pub fn park(&mut self, code: RequestCode, mut entry: PendingEntry, state: OperationState) {
        entry.state = state;
        let slot = self.slots.entry(code).or_default();
        if let Some(previous) = slot.prompted.replace(entry) {
            log::warn!("Prompt for {code:?} replaced; re-queueing {}", previous.request_id);
            slot.queued.push_front(previous);
        }
    }

    /// Hold a request until the prompt for `code` resolves
    pub fn queue(&mut self, code: RequestCode, mut entry: PendingEntry) {
        entry.state = OperationState::Queued(code);
        self.slots.entry(code).or_default().queued.push_back(entry);
    }

    /// The request whose prompt for `code` just completed
    pub fn take(&mut self, code: RequestCode) -> Option<PendingEntry> {
        let slot = self.slots.get_mut(&code)?;
        let entry = slot.prompted.take();
        if slot.is_empty() {
            self.slots.remove(&code);
        }
        entry
    }

    /// Oldest queued request for `code`, once no prompt is on screen
    pub fn next_queued(&mut self, code: RequestCode) -> Option<PendingEntry> {
        let slot = self.slots.get_mut(&code)?;
        if slot.prompted.is_some() {
            return None;
        }
        let entry = slot.queued.pop_front();
        if slot.is_empty() {
            self.slots.remove(&code);
        }
        entry
    }

    pub fn state_of(&self, request_id: &RequestId) -> Option<OperationState> {
        self.slots
            .values()
            .flat_map(|slot| slot.entries())
            .find(|entry| entry.request_id == *request_id)
            .map(|entry| entry.state)
    }

    pub fn len(&self) -> usize {
        self.slots.values().map(|slot| slot.entries().count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
