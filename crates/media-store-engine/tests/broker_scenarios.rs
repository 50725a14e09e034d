//! End-to-end scenarios driven through the raw call channel.

use media_store_engine::memory::MemoryPlatform;
use media_store_engine::{
    ActivityResult, BrokerSettings, ContentUri, DocumentTreeInfo, ErrorKind, Location,
    MediaStoreBroker, OperationState, RequestId, Response, ResponseValue, StorageCategory,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::fs;
use tempfile::TempDir;

const PICKED_TREE_NAME: &str = "Music";

struct Harness {
    platform: MemoryPlatform,
    broker: MediaStoreBroker,
    dir: TempDir,
    next_id: u32,
}

impl Harness {
    fn new() -> Self {
        let platform = MemoryPlatform::new();
        let mut broker = MediaStoreBroker::new(
            Some(platform.storage_context()),
            34,
            BrokerSettings::default(),
        );
        broker.attach_foreground(platform.foreground_context());
        Self {
            platform,
            broker,
            dir: tempfile::tempdir().unwrap(),
            next_id: 0,
        }
    }

    fn temp_file(&self, name: &str, bytes: &[u8]) -> String {
        let path = self.dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path.to_string_lossy().into_owned()
    }

    /// Submit a call and return its id without collecting a response
    fn submit(&mut self, method: &str, arguments: Value) -> RequestId {
        self.next_id += 1;
        let id = RequestId::from(format!("req-{}", self.next_id));
        self.broker.submit_call(Some(id.clone()), method, arguments)
    }

    /// Submit a call that is expected to resolve immediately
    fn call(&mut self, method: &str, arguments: Value) -> Response {
        let id = self.submit(method, arguments);
        let mut responses = self.broker.drain_responses();
        assert_eq!(responses.len(), 1, "{method} did not resolve exactly once");
        let response = responses.remove(0);
        assert_eq!(response.request_id, id);
        response
    }
}

fn picture_args(name: &str) -> Value {
    json!({"fileName": name, "appFolder": "MyApp", "dirType": 0, "dirName": "Pictures"})
}

fn save_args(temp_file_path: &str, name: &str) -> Value {
    let mut args = picture_args(name);
    args["tempFilePath"] = Value::String(temp_file_path.to_string());
    args
}

#[test]
fn test_save_get_delete_round_trip() {
    // Given a fresh store
    let mut h = Harness::new();
    let source = h.temp_file("a.jpg", b"jpeg");

    // When saving then resolving
    let saved = h.call("saveFile", save_args(&source, "a.jpg"));
    let resolved = h.call("getFileUri", picture_args("a.jpg"));

    // Then the file resolves to a handle in the images collection
    assert_eq!(saved.value, ResponseValue::Bool(true));
    let ResponseValue::Text(uri) = resolved.value else {
        panic!("expected a URI, got {:?}", resolved.value);
    };
    assert!(uri.starts_with("content://media/external/images/media/"));

    // When deleting it
    let deleted = h.call("deleteFile", picture_args("a.jpg"));

    // Then it no longer resolves
    assert_eq!(deleted.value, ResponseValue::Bool(true));
    let gone = h.call("getFileUri", picture_args("a.jpg"));
    assert_eq!(gone.value, ResponseValue::Null);
    assert_eq!(gone.error, Some(ErrorKind::NotFound));
}

#[test]
fn test_read_file_returns_saved_bytes() {
    let mut h = Harness::new();
    let source = h.temp_file("in.jpg", b"exact bytes");
    h.call("saveFile", save_args(&source, "a.jpg"));
    let destination = h.dir.path().join("out.jpg");

    let mut args = picture_args("a.jpg");
    args["tempFilePath"] = json!(destination.to_string_lossy());
    let read = h.call("readFile", args);

    assert_eq!(read.value, ResponseValue::Bool(true));
    assert_eq!(fs::read(destination).unwrap(), b"exact bytes");
}

#[test]
fn test_save_replaces_existing_file() {
    let mut h = Harness::new();
    let first = h.temp_file("1.jpg", b"one");
    let second = h.temp_file("2.jpg", b"two");

    h.call("saveFile", save_args(&first, "a.jpg"));
    h.call("saveFile", save_args(&second, "a.jpg"));

    let location = Location::new(StorageCategory::Image, "Pictures", "MyApp", "a.jpg");
    assert_eq!(h.platform.count_rows("external", &location), 1);
}

#[test]
fn test_delete_missing_file_returns_false() {
    let mut h = Harness::new();

    let response = h.call("deleteFile", picture_args("nothing.jpg"));

    assert_eq!(response.value, ResponseValue::Bool(false));
    assert_eq!(h.platform.delete_calls(), 0);
}

#[test]
fn test_save_over_foreign_file_replays_after_consent() {
    // Given a file at the location owned by another app
    let mut h = Harness::new();
    let location = Location::new(StorageCategory::Image, "Pictures", "MyApp", "a.jpg");
    h.platform.seed_row("external", &location, b"theirs", true);
    let source = h.temp_file("a.jpg", b"ours");

    // When saving over it
    let id = h.submit("saveFile", save_args(&source, "a.jpg"));

    // Then the request waits for consent
    assert!(h.broker.drain_responses().is_empty());
    assert!(matches!(
        h.broker.state_of(&id),
        Some(OperationState::AwaitingConsent(_))
    ));

    // When the user grants it
    h.platform.grant_requested();
    assert!(h.broker.on_activity_result(990, ActivityResult::Ok { data: None }));

    // Then the outcome is the same as an unobstructed save
    assert_eq!(
        h.broker.drain_responses(),
        vec![Response::success(id, ResponseValue::Bool(true))]
    );
    assert_eq!(h.platform.count_rows("external", &location), 1);
    let destination = h.dir.path().join("check.jpg");
    let mut args = picture_args("a.jpg");
    args["tempFilePath"] = json!(destination.to_string_lossy());
    h.call("readFile", args);
    assert_eq!(fs::read(destination).unwrap(), b"ours");
}

#[test]
fn test_save_over_foreign_file_denied() {
    let mut h = Harness::new();
    let location = Location::new(StorageCategory::Image, "Pictures", "MyApp", "a.jpg");
    let existing = h.platform.seed_row("external", &location, b"theirs", true);
    let source = h.temp_file("a.jpg", b"ours");

    let id = h.submit("saveFile", save_args(&source, "a.jpg"));
    assert!(h.broker.on_activity_result(990, ActivityResult::Canceled));

    assert_eq!(
        h.broker.drain_responses(),
        vec![Response::failure(
            id,
            ResponseValue::Bool(false),
            ErrorKind::UserDenied
        )]
    );
    // Nothing of ours was written
    assert_eq!(h.platform.count_rows("external", &location), 1);
    assert_eq!(h.platform.row(existing).unwrap().data, b"theirs");
}

#[test]
fn test_request_for_access_cancelled() {
    let mut h = Harness::new();

    let id = h.submit("requestForAccess", json!({"initialRelativePath": "Music"}));
    assert!(h.broker.drain_responses().is_empty());
    assert!(h.broker.on_activity_result(992, ActivityResult::Canceled));

    assert_eq!(
        h.broker.drain_responses(),
        vec![Response::failure(
            id,
            ResponseValue::Text(String::new()),
            ErrorKind::UserDenied
        )]
    );
}

#[test]
fn test_request_for_access_matches_document_tree() {
    // Given a picked tree with two children
    let mut h = Harness::new();
    let tree = h.platform.seed_tree(PICKED_TREE_NAME);
    h.platform.seed_document(&tree, "song.mp3", b"la la");
    h.platform.seed_directory(&tree, "Albums");

    // When the picker returns that tree
    let id = h.submit("requestForAccess", json!({"initialRelativePath": "Music"}));
    h.broker.on_activity_result(
        992,
        ActivityResult::from_parts(true, Some(tree.clone())),
    );
    let responses = h.broker.drain_responses();

    // Then the grant is persisted and the JSON lists the children
    assert_eq!(h.platform.persisted_grants(), vec![tree.clone()]);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].request_id, id);
    let ResponseValue::Text(picked_json) = &responses[0].value else {
        panic!("expected JSON text");
    };
    let picked: DocumentTreeInfo = serde_json::from_str(picked_json).unwrap();
    assert_eq!(picked.uri, tree);
    assert_eq!(picked.children.len(), 2);

    // And getDocumentTree on the same uri gives the same children
    let listed = h.call("getDocumentTree", json!({"contentUri": tree.as_str()}));
    let ResponseValue::Text(listed_json) = listed.value else {
        panic!("expected JSON text");
    };
    let listed: DocumentTreeInfo = serde_json::from_str(&listed_json).unwrap();
    assert_eq!(listed.children, picked.children);
}

#[test]
fn test_document_queries() {
    let mut h = Harness::new();
    let tree = h.platform.seed_tree("Documents");
    let doc = h.platform.seed_document(&tree, "notes.txt", b"hello");
    h.platform.set_document_flags(&doc, 0x2);
    let uri = json!({"contentUri": doc.as_str()});

    assert_eq!(h.call("isFileUriExist", uri.clone()).value, ResponseValue::Bool(true));
    assert_eq!(h.call("isFileWritable", uri.clone()).value, ResponseValue::Bool(true));
    assert_eq!(h.call("isFileDeletable", uri.clone()).value, ResponseValue::Bool(false));

    let media = json!({"contentUri": "content://media/external/images/media/1"});
    assert_eq!(h.call("isFileUriExist", media).value, ResponseValue::Bool(false));
}

#[test]
fn test_edit_and_delete_by_uri() {
    let mut h = Harness::new();
    let tree = h.platform.seed_tree("Documents");
    let doc = h.platform.seed_document(&tree, "notes.txt", b"old");
    let source = h.temp_file("edit.txt", b"new text");

    let edited = h.call(
        "editFile",
        json!({"contentUri": doc.as_str(), "tempFilePath": source}),
    );
    assert_eq!(edited.value, ResponseValue::Bool(true));
    assert_eq!(h.platform.document_data(&doc).unwrap(), b"new text");

    let deleted = h.call("deleteFileUsingUri", json!({"contentUri": doc.as_str()}));
    assert_eq!(deleted.value, ResponseValue::Bool(true));
    assert_eq!(h.platform.document_data(&doc), None);
}

#[test]
fn test_get_uri_from_file_path_resolves_on_scan() {
    let mut h = Harness::new();

    let id = h.submit(
        "getUriFromFilePath",
        json!({"filePath": "/storage/emulated/0/Download/report.pdf"}),
    );
    assert!(h.broker.drain_responses().is_empty());

    h.broker.on_media_scan_completed(
        &id,
        Some(ContentUri::new("content://media/external/file/77")),
    );

    assert_eq!(
        h.broker.drain_responses(),
        vec![Response::success(
            id,
            ResponseValue::Text("content://media/external/file/77".to_string())
        )]
    );
}

#[test]
fn test_prompt_without_activity_fails_fast() {
    let mut h = Harness::new();
    h.broker.detach_foreground();

    let response = h.call("requestForAccess", json!({}));

    assert_eq!(response.value, ResponseValue::Text(String::new()));
    assert_eq!(response.error, Some(ErrorKind::NoForegroundActivity));
    assert_eq!(h.broker.in_flight(), 0);
}

#[test]
fn test_invalid_arguments_still_resolve() {
    let mut h = Harness::new();

    let response = h.call("saveFile", json!({"fileName": "a.jpg"}));

    assert_eq!(response.value, ResponseValue::Bool(false));
    assert_eq!(response.error, Some(ErrorKind::InvalidRequest));

    let response = h.call("getDocumentTree", json!({"uri": "content://x"}));

    assert_eq!(response.value, ResponseValue::Text(String::new()));
    assert_eq!(response.error, Some(ErrorKind::InvalidRequest));
}
