//! The storage-operation broker.
//!
//! Receives decoded requests, runs them against the current context, parks
//! them while a system prompt is open and resolves every request with exactly
//! one [`Response`]. Responses are queued and handed out by
//! [`MediaStoreBroker::drain_responses`] once the submitting call has returned.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use serde_json::Value;

use crate::consent::{
    OperationOutcome, OperationState, PendingEntry, PendingOperation, PendingTable, RequestCode,
};
use crate::error::BrokerError;
use crate::models::{ContentUri, DocumentTreeInfo};
use crate::operations;
use crate::platform::{ContextChain, ForegroundContext, StorageContext};
use crate::request::{self, Request, RequestId, Response, ResponseValue};
use crate::resolver;
use crate::tree;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// MediaStore volume name used for every collection URI
    pub volume: String,
    /// Consent prompts launched per request before giving up
    pub max_consent_attempts: u32,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            volume: "external".to_string(),
            max_consent_attempts: 2,
        }
    }
}

/// Completion of a system activity launched by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityResult {
    Ok { data: Option<ContentUri> },
    Canceled,
}

impl ActivityResult {
    pub fn from_parts(result_ok: bool, data: Option<ContentUri>) -> Self {
        if result_ok {
            ActivityResult::Ok { data }
        } else {
            ActivityResult::Canceled
        }
    }
}

pub struct MediaStoreBroker {
    contexts: ContextChain,
    settings: BrokerSettings,
    sdk_int: i64,
    pending: PendingTable,
    scans: HashMap<RequestId, PathBuf>,
    outbox: VecDeque<Response>,
}

impl MediaStoreBroker {
    pub fn new(
        application: Option<StorageContext>,
        sdk_int: i64,
        settings: BrokerSettings,
    ) -> Self {
        Self {
            contexts: ContextChain::new(application),
            settings,
            sdk_int,
            pending: PendingTable::default(),
            scans: HashMap::new(),
            outbox: VecDeque::new(),
        }
    }

    pub fn attach_foreground(&mut self, foreground: ForegroundContext) {
        log::debug!("Foreground activity attached");
        self.contexts.attach_foreground(foreground);
    }

    pub fn detach_foreground(&mut self) {
        log::debug!("Foreground activity detached");
        self.contexts.detach_foreground();
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Decode and run a raw channel call. Undecodable calls still get a response.
    pub fn submit_call(
        &mut self,
        request_id: Option<RequestId>,
        method: &str,
        arguments: Value,
    ) -> RequestId {
        let request_id = request_id.unwrap_or_else(RequestId::generate);
        match Request::from_method_call(method, arguments) {
            Ok(request) => self.submit_with_id(request_id.clone(), request),
            Err(e) => {
                log::error!("Rejected call {request_id}: {e}");
                self.respond(Response::failure(
                    request_id.clone(),
                    request::failure_value_for(method),
                    e.kind(),
                ));
            }
        }
        request_id
    }

    pub fn submit(&mut self, request: Request) -> RequestId {
        let request_id = RequestId::generate();
        self.submit_with_id(request_id.clone(), request);
        request_id
    }

    pub fn submit_with_id(&mut self, request_id: RequestId, request: Request) {
        log::debug!("{} {request_id}", request.method());
        let failure_value = request.failure_value();

        let result = match request {
            Request::PlatformSdkInt => Ok(ResponseValue::Int(self.sdk_int)),
            Request::GetFileUri { location } => self
                .storage()
                .and_then(|ctx| Ok(resolver::resolve(ctx, &self.settings.volume, &location)?))
                .and_then(|uri| {
                    uri.map(|u| ResponseValue::Text(u.into_string()))
                        .ok_or(BrokerError::NotFound)
                }),
            Request::IsFileDeletable { content_uri } => self
                .storage()
                .and_then(|ctx| operations::is_deletable(ctx, &content_uri))
                .map(ResponseValue::Bool),
            Request::IsFileWritable { content_uri } => self
                .storage()
                .and_then(|ctx| operations::is_writable(ctx, &content_uri))
                .map(ResponseValue::Bool),
            Request::IsFileUriExist { content_uri } => self
                .storage()
                .and_then(|ctx| operations::exists(ctx, &content_uri))
                .map(ResponseValue::Bool),
            Request::GetDocumentTree { content_uri } => {
                self.document_tree(request_id, content_uri);
                return;
            }
            Request::GetUriFromFilePath { file_path } => {
                self.start_scan(request_id, file_path);
                return;
            }
            Request::SaveFile {
                temp_file_path,
                location,
            } => {
                return self.execute(PendingEntry::new(
                    request_id,
                    PendingOperation::Save {
                        temp_file_path,
                        location,
                    },
                ));
            }
            Request::DeleteFile { location } => {
                return self.execute(PendingEntry::new(
                    request_id,
                    PendingOperation::Delete { location },
                ));
            }
            Request::ReadFile {
                temp_file_path,
                location,
            } => {
                return self.execute(PendingEntry::new(
                    request_id,
                    PendingOperation::Read {
                        temp_file_path,
                        location,
                    },
                ));
            }
            Request::EditFile {
                content_uri,
                temp_file_path,
            } => {
                return self.execute(PendingEntry::new(
                    request_id,
                    PendingOperation::Edit {
                        content_uri,
                        temp_file_path,
                    },
                ));
            }
            Request::DeleteFileUsingUri { content_uri } => {
                return self.execute(PendingEntry::new(
                    request_id,
                    PendingOperation::DeleteByUri { content_uri },
                ));
            }
            Request::ReadFileUsingUri {
                content_uri,
                temp_file_path,
            } => {
                return self.execute(PendingEntry::new(
                    request_id,
                    PendingOperation::ReadByUri {
                        content_uri,
                        temp_file_path,
                    },
                ));
            }
            Request::RequestForAccess {
                initial_relative_path,
            } => {
                return self.execute(PendingEntry::new(
                    request_id,
                    PendingOperation::DirectoryAccess {
                        initial_relative_path,
                    },
                ));
            }
        };

        match result {
            Ok(value) => self.respond(Response::success(request_id, value)),
            Err(e) => self.fail(request_id, failure_value, e),
        }
    }

    /// Completion of a consent prompt or the directory picker.
    ///
    /// Returns whether the request code belonged to a parked request.
    pub fn on_activity_result(&mut self, request_code: i32, result: ActivityResult) -> bool {
        let Some(code) = RequestCode::from_code(request_code) else {
            return false;
        };
        let Some(entry) = self.pending.take(code) else {
            log::warn!("Activity result for {code:?} with nothing pending");
            return false;
        };

        if code == RequestCode::DirectoryAccess {
            self.finish_directory_access(entry, result);
        } else {
            match result {
                ActivityResult::Ok { .. } => {
                    log::info!("Consent granted for {}, replaying", entry.request_id);
                    self.execute(entry);
                }
                ActivityResult::Canceled => {
                    log::info!("Consent denied for {}", entry.request_id);
                    let value = entry.operation.failure_value();
                    self.fail(entry.request_id, value, BrokerError::UserDenied);
                }
            }
        }
        self.launch_queued(code);
        true
    }

    /// Completion of a media scan started for `getUriFromFilePath`
    pub fn on_media_scan_completed(
        &mut self,
        request_id: &RequestId,
        uri: Option<ContentUri>,
    ) -> bool {
        let Some(path) = self.scans.remove(request_id) else {
            log::warn!("Scan completion for unknown request {request_id}");
            return false;
        };
        log::debug!("Scanned {}: {uri:?}", path.display());
        match uri {
            Some(uri) => self.respond(Response::success(
                request_id.clone(),
                ResponseValue::Text(uri.into_string()),
            )),
            None => self.fail(request_id.clone(), ResponseValue::Null, BrokerError::NotFound),
        }
        true
    }

    pub fn drain_responses(&mut self) -> Vec<Response> {
        self.outbox.drain(..).collect()
    }

    pub fn state_of(&self, request_id: &RequestId) -> Option<OperationState> {
        self.pending.state_of(request_id).or_else(|| {
            self.scans
                .contains_key(request_id)
                .then_some(OperationState::AwaitingScan)
        })
    }

    /// Requests still waiting on a system prompt or scan
    pub fn in_flight(&self) -> usize {
        self.pending.len() + self.scans.len()
    }

    fn storage(&self) -> Result<&StorageContext, BrokerError> {
        self.contexts.storage()
    }

    /// Run queued requests for `code` until one of them puts a prompt on screen
    fn launch_queued(&mut self, code: RequestCode) {
        while !self.pending.is_prompting(code) {
            let Some(entry) = self.pending.next_queued(code) else {
                break;
            };
            log::debug!("{} resumes after earlier {code:?} prompt", entry.request_id);
            self.execute(entry);
        }
    }

    fn execute(&mut self, mut entry: PendingEntry) {
        let code = entry.operation.request_code();
        let is_picker = matches!(entry.operation, PendingOperation::DirectoryAccess { .. });
        if is_picker && self.pending.is_prompting(code) {
            log::debug!("{} queued behind open directory picker", entry.request_id);
            self.pending.queue(code, entry);
            return;
        }

        entry.state = OperationState::Executing;
        let outcome = OperationOutcome::from(self.run_operation(&entry.operation));

        match outcome {
            OperationOutcome::Success(Some(value)) => {
                self.respond(Response::success(entry.request_id, value));
            }
            OperationOutcome::Success(None) => {
                self.pending.park(
                    RequestCode::DirectoryAccess,
                    entry,
                    OperationState::AwaitingPicker,
                );
            }
            OperationOutcome::NeedsConsent(_) if self.pending.is_prompting(code) => {
                log::debug!("{} queued behind open {code:?} prompt", entry.request_id);
                self.pending.queue(code, entry);
            }
            OperationOutcome::NeedsConsent(token) => {
                if entry.attempts >= self.settings.max_consent_attempts {
                    let value = entry.operation.failure_value();
                    let attempts = entry.attempts;
                    self.fail(
                        entry.request_id,
                        value,
                        BrokerError::ConsentExhausted { attempts },
                    );
                    return;
                }
                let launched = self
                    .contexts
                    .host()
                    .and_then(|host| Ok(host.launch_consent(&token, code)?));
                match launched {
                    Ok(()) => {
                        entry.attempts += 1;
                        log::info!("{} awaiting consent ({code:?})", entry.request_id);
                        self.pending
                            .park(code, entry, OperationState::AwaitingConsent(code));
                    }
                    Err(e) => {
                        let value = entry.operation.failure_value();
                        self.fail(entry.request_id, value, e);
                    }
                }
            }
            OperationOutcome::Failure(e) => {
                let value = entry.operation.failure_value();
                self.fail(entry.request_id, value, e);
            }
        }
    }

    /// Run one attempt of a snapshot. `Ok(None)` means the operation is now
    /// suspended on the directory picker.
    fn run_operation(
        &self,
        operation: &PendingOperation,
    ) -> Result<Option<ResponseValue>, BrokerError> {
        if let PendingOperation::DirectoryAccess {
            initial_relative_path,
        } = operation
        {
            self.launch_picker(initial_relative_path.as_deref())?;
            return Ok(None);
        }

        let ctx = self.storage()?;
        let volume = self.settings.volume.as_str();
        let found = match operation {
            PendingOperation::Save {
                temp_file_path,
                location,
            } => {
                operations::create_or_replace(ctx, volume, temp_file_path, location)?;
                true
            }
            PendingOperation::Delete { location } => {
                operations::delete_by_location(ctx, volume, location)?
            }
            PendingOperation::Edit {
                content_uri,
                temp_file_path,
            } => operations::edit_by_reference(ctx, content_uri, temp_file_path)?,
            PendingOperation::DeleteByUri { content_uri } => {
                operations::delete_by_reference(ctx, content_uri)?
            }
            PendingOperation::ReadByUri {
                content_uri,
                temp_file_path,
            } => operations::read_by_reference(ctx, content_uri, temp_file_path)?,
            PendingOperation::Read {
                temp_file_path,
                location,
            } => operations::read_by_location(ctx, volume, location, temp_file_path)?,
            PendingOperation::DirectoryAccess { .. } => false,
        };

        if found {
            Ok(Some(ResponseValue::Bool(true)))
        } else {
            Err(BrokerError::NotFound)
        }
    }

    fn launch_picker(&self, start_path: Option<&str>) -> Result<(), BrokerError> {
        let host = self.contexts.host()?;
        let initial_uri = start_path
            .filter(|path| !path.trim().is_empty())
            .and_then(|path| {
                host.picker_root_uri()
                    .map(|root| tree::picker_initial_uri(&root, path))
            });
        if let Some(uri) = &initial_uri {
            log::debug!("Directory picker seeded at {uri}");
        }
        host.launch_directory_picker(initial_uri.as_ref(), RequestCode::DirectoryAccess)?;
        Ok(())
    }

    fn finish_directory_access(&mut self, entry: PendingEntry, result: ActivityResult) {
        let failure = entry.operation.failure_value();
        match result {
            ActivityResult::Ok { data: Some(tree) } => match self.grant_and_list(&tree) {
                Ok(json) => {
                    self.respond(Response::success(entry.request_id, ResponseValue::Text(json)))
                }
                Err(e) => self.fail(entry.request_id, failure, e),
            },
            ActivityResult::Ok { data: None } => {
                self.fail(entry.request_id, failure, BrokerError::NotFound);
            }
            ActivityResult::Canceled => {
                self.fail(entry.request_id, failure, BrokerError::UserDenied);
            }
        }
    }

    fn grant_and_list(&self, tree: &ContentUri) -> Result<String, BrokerError> {
        let ctx = self.storage()?;
        ctx.documents.take_persistable_permission(tree)?;
        let info = tree::list_children(ctx, tree);
        log::info!(
            "Access granted to {tree} with {} references",
            info.uri_list().len()
        );
        Ok(info.to_json()?)
    }

    /// Tree JSON for `getDocumentTree`. A known tree that fails to list still
    /// answers with its empty-children JSON, plus the error kind.
    fn document_tree(&mut self, request_id: RequestId, tree_uri: ContentUri) {
        let listed = self.storage().map(|ctx| tree::enumerate(ctx, &tree_uri));
        let (info, error) = match listed {
            Ok(Ok(info)) => (info, None),
            Ok(Err(e)) => (DocumentTreeInfo::empty(tree_uri), Some(BrokerError::from(e))),
            Err(e) => return self.fail(request_id, ResponseValue::Text(String::new()), e),
        };
        match (info.to_json(), error) {
            (Ok(json), None) => {
                self.respond(Response::success(request_id, ResponseValue::Text(json)))
            }
            (Ok(json), Some(e)) => self.fail(request_id, ResponseValue::Text(json), e),
            (Err(e), _) => self.fail(request_id, ResponseValue::Text(String::new()), e.into()),
        }
    }

    fn start_scan(&mut self, request_id: RequestId, file_path: PathBuf) {
        let started = self
            .storage()
            .and_then(|ctx| Ok(ctx.scanner.scan_file(&file_path, &request_id)?));
        match started {
            Ok(()) => {
                self.scans.insert(request_id, file_path);
            }
            Err(e) => self.fail(request_id, ResponseValue::Null, e),
        }
    }

    fn respond(&mut self, response: Response) {
        log::debug!("Resolved {} with {:?}", response.request_id, response.value);
        self.outbox.push_back(response);
    }

    fn fail(&mut self, request_id: RequestId, value: ResponseValue, error: BrokerError) {
        match error {
            BrokerError::NotFound | BrokerError::UserDenied => {
                log::debug!("{request_id}: {error}");
            }
            _ => log::error!("{request_id} failed: {error}"),
        }
        self.respond(Response::failure(request_id, value, error.kind()));
    }
}
