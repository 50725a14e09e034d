//! Requests arriving over the call channel and the responses sent back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::models::{ContentUri, Location, StorageCategory};

/// Correlates a request with its eventual response
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Method not implemented: {0}")]
    NotImplemented(String),
    #[error("Invalid arguments for {method}: {source}")]
    InvalidArguments {
        method: String,
        source: serde_json::Error,
    },
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::NotImplemented(_) => ErrorKind::NotImplemented,
            RequestError::InvalidArguments { .. } => ErrorKind::InvalidRequest,
        }
    }
}

/// One decoded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    PlatformSdkInt,
    SaveFile {
        temp_file_path: PathBuf,
        location: Location,
    },
    DeleteFile {
        location: Location,
    },
    GetFileUri {
        location: Location,
    },
    GetUriFromFilePath {
        file_path: PathBuf,
    },
    RequestForAccess {
        initial_relative_path: Option<String>,
    },
    EditFile {
        content_uri: ContentUri,
        temp_file_path: PathBuf,
    },
    DeleteFileUsingUri {
        content_uri: ContentUri,
    },
    IsFileDeletable {
        content_uri: ContentUri,
    },
    IsFileWritable {
        content_uri: ContentUri,
    },
    ReadFile {
        temp_file_path: PathBuf,
        location: Location,
    },
    ReadFileUsingUri {
        content_uri: ContentUri,
        temp_file_path: PathBuf,
    },
    IsFileUriExist {
        content_uri: ContentUri,
    },
    GetDocumentTree {
        content_uri: ContentUri,
    },
}

const PLATFORM_SDK_INT: &str = "getPlatformSDKInt";

pub const METHODS: [&str; 14] = [
    PLATFORM_SDK_INT,
    "saveFile",
    "deleteFile",
    "getFileUri",
    "getUriFromFilePath",
    "requestForAccess",
    "editFile",
    "deleteFileUsingUri",
    "isFileDeletable",
    "isFileWritable",
    "readFile",
    "readFileUsingUri",
    "isFileUriExist",
    "getDocumentTree",
];

impl Request {
    /// Decode a method name plus its JSON arguments object
    pub fn from_method_call(method: &str, arguments: Value) -> Result<Self, RequestError> {
        if !METHODS.contains(&method) {
            return Err(RequestError::NotImplemented(method.to_string()));
        }

        let mut call = serde_json::Map::new();
        call.insert("method".to_string(), Value::String(method.to_string()));
        if method != PLATFORM_SDK_INT {
            let arguments = match arguments {
                Value::Null => Value::Object(serde_json::Map::new()),
                arguments => arguments,
            };
            call.insert("arguments".to_string(), arguments);
        }

        let wire: MethodCall = serde_json::from_value(Value::Object(call)).map_err(|source| {
            RequestError::InvalidArguments {
                method: method.to_string(),
                source,
            }
        })?;
        Ok(wire.into())
    }

    pub fn method(&self) -> &'static str {
        match self {
            Request::PlatformSdkInt => PLATFORM_SDK_INT,
            Request::SaveFile { .. } => "saveFile",
            Request::DeleteFile { .. } => "deleteFile",
            Request::GetFileUri { .. } => "getFileUri",
            Request::GetUriFromFilePath { .. } => "getUriFromFilePath",
            Request::RequestForAccess { .. } => "requestForAccess",
            Request::EditFile { .. } => "editFile",
            Request::DeleteFileUsingUri { .. } => "deleteFileUsingUri",
            Request::IsFileDeletable { .. } => "isFileDeletable",
            Request::IsFileWritable { .. } => "isFileWritable",
            Request::ReadFile { .. } => "readFile",
            Request::ReadFileUsingUri { .. } => "readFileUsingUri",
            Request::IsFileUriExist { .. } => "isFileUriExist",
            Request::GetDocumentTree { .. } => "getDocumentTree",
        }
    }

    /// Falsy value for this method's response when it fails
    pub fn failure_value(&self) -> ResponseValue {
        failure_value_for(self.method())
    }
}

/// Falsy value a method answers with when it fails, known from its name alone
/// so calls that cannot be decoded still answer in the expected shape.
pub fn failure_value_for(method: &str) -> ResponseValue {
    match method {
        PLATFORM_SDK_INT | "getFileUri" | "getUriFromFilePath" => ResponseValue::Null,
        "requestForAccess" | "getDocumentTree" => ResponseValue::Text(String::new()),
        method if METHODS.contains(&method) => ResponseValue::Bool(false),
        _ => ResponseValue::Null,
    }
}

/// Location arguments exactly as they appear on the channel
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationArgs {
    file_name: String,
    app_folder: String,
    dir_type: i64,
    dir_name: String,
}

impl From<LocationArgs> for Location {
    fn from(args: LocationArgs) -> Self {
        Location::new(
            StorageCategory::from_dir_type(args.dir_type),
            args.dir_name,
            args.app_folder,
            args.file_name,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(
    tag = "method",
    content = "arguments",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
enum MethodCall {
    #[serde(rename = "getPlatformSDKInt")]
    GetPlatformSdkInt,
    SaveFile {
        temp_file_path: PathBuf,
        #[serde(flatten)]
        location: LocationArgs,
    },
    DeleteFile {
        #[serde(flatten)]
        location: LocationArgs,
    },
    GetFileUri {
        #[serde(flatten)]
        location: LocationArgs,
    },
    GetUriFromFilePath {
        file_path: PathBuf,
    },
    RequestForAccess {
        initial_relative_path: Option<String>,
    },
    EditFile {
        content_uri: ContentUri,
        temp_file_path: PathBuf,
    },
    DeleteFileUsingUri {
        content_uri: ContentUri,
    },
    IsFileDeletable {
        content_uri: ContentUri,
    },
    IsFileWritable {
        content_uri: ContentUri,
    },
    ReadFile {
        temp_file_path: PathBuf,
        #[serde(flatten)]
        location: LocationArgs,
    },
    ReadFileUsingUri {
        content_uri: ContentUri,
        temp_file_path: PathBuf,
    },
    IsFileUriExist {
        content_uri: ContentUri,
    },
    GetDocumentTree {
        content_uri: ContentUri,
    },
}

impl From<MethodCall> for Request {
    fn from(call: MethodCall) -> Self {
        match call {
            MethodCall::GetPlatformSdkInt => Request::PlatformSdkInt,
            MethodCall::SaveFile {
                temp_file_path,
                location,
            } => Request::SaveFile {
                temp_file_path,
                location: location.into(),
            },
            MethodCall::DeleteFile { location } => Request::DeleteFile {
                location: location.into(),
            },
            MethodCall::GetFileUri { location } => Request::GetFileUri {
                location: location.into(),
            },
            MethodCall::GetUriFromFilePath { file_path } => {
                Request::GetUriFromFilePath { file_path }
            }
            MethodCall::RequestForAccess {
                initial_relative_path,
            } => Request::RequestForAccess {
                initial_relative_path,
            },
            MethodCall::EditFile {
                content_uri,
                temp_file_path,
            } => Request::EditFile {
                content_uri,
                temp_file_path,
            },
            MethodCall::DeleteFileUsingUri { content_uri } => {
                Request::DeleteFileUsingUri { content_uri }
            }
            MethodCall::IsFileDeletable { content_uri } => Request::IsFileDeletable { content_uri },
            MethodCall::IsFileWritable { content_uri } => Request::IsFileWritable { content_uri },
            MethodCall::ReadFile {
                temp_file_path,
                location,
            } => Request::ReadFile {
                temp_file_path,
                location: location.into(),
            },
            MethodCall::ReadFileUsingUri {
                content_uri,
                temp_file_path,
            } => Request::ReadFileUsingUri {
                content_uri,
                temp_file_path,
            },
            MethodCall::IsFileUriExist { content_uri } => Request::IsFileUriExist { content_uri },
            MethodCall::GetDocumentTree { content_uri } => Request::GetDocumentTree { content_uri },
        }
    }
}

/// Result value in the shape each method has always returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub request_id: RequestId,
    pub value: ResponseValue,
    pub error: Option<ErrorKind>,
}

impl Response {
    pub fn success(request_id: RequestId, value: ResponseValue) -> Self {
        Self {
            request_id,
            value,
            error: None,
        }
    }

    pub fn failure(request_id: RequestId, value: ResponseValue, kind: ErrorKind) -> Self {
        Self {
            request_id,
            value,
            error: Some(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_decode_save_file() {
        let request = Request::from_method_call(
            "saveFile",
            json!({
                "tempFilePath": "/tmp/a.jpg",
                "fileName": "a.jpg",
                "appFolder": "MyApp",
                "dirType": 0,
                "dirName": "Pictures",
            }),
        )
        .unwrap();

        assert_eq!(
            request,
            Request::SaveFile {
                temp_file_path: PathBuf::from("/tmp/a.jpg"),
                location: Location::new(StorageCategory::Image, "Pictures", "MyApp", "a.jpg"),
            }
        );
    }

    #[test]
    fn test_decode_unknown_dir_type_is_download() {
        let request = Request::from_method_call(
            "getFileUri",
            json!({"fileName": "a.pdf", "appFolder": "MyApp", "dirType": 9, "dirName": "Download"}),
        )
        .unwrap();

        let Request::GetFileUri { location } = request else {
            panic!("expected GetFileUri");
        };
        assert_eq!(location.category, StorageCategory::Download);
    }

    #[rstest]
    #[case("saveFile", ResponseValue::Bool(false))]
    #[case("isFileUriExist", ResponseValue::Bool(false))]
    #[case("requestForAccess", ResponseValue::Text(String::new()))]
    #[case("getDocumentTree", ResponseValue::Text(String::new()))]
    #[case("getFileUri", ResponseValue::Null)]
    #[case("getPlatformSDKInt", ResponseValue::Null)]
    #[case("renameFile", ResponseValue::Null)]
    fn test_failure_value_by_method(#[case] method: &str, #[case] expected: ResponseValue) {
        assert_eq!(failure_value_for(method), expected);
    }

    #[test]
    fn test_decode_platform_sdk_int_ignores_arguments() {
        assert_eq!(
            Request::from_method_call("getPlatformSDKInt", json!({})).unwrap(),
            Request::PlatformSdkInt
        );
        assert_eq!(
            Request::from_method_call("getPlatformSDKInt", Value::Null).unwrap(),
            Request::PlatformSdkInt
        );
    }

    #[test]
    fn test_decode_request_for_access_without_path() {
        let request = Request::from_method_call("requestForAccess", json!({})).unwrap();
        assert_eq!(
            request,
            Request::RequestForAccess {
                initial_relative_path: None
            }
        );
    }

    #[test]
    fn test_decode_uri_methods() {
        let request = Request::from_method_call(
            "readFileUsingUri",
            json!({"contentUri": " content://x/1 ", "tempFilePath": "/tmp/out"}),
        )
        .unwrap();
        assert_eq!(
            request,
            Request::ReadFileUsingUri {
                content_uri: ContentUri::new("content://x/1"),
                temp_file_path: PathBuf::from("/tmp/out"),
            }
        );
        assert_eq!(request.method(), "readFileUsingUri");
    }

    #[test]
    fn test_unknown_method() {
        let err = Request::from_method_call("formatDisk", json!({})).unwrap_err();
        assert!(matches!(err, RequestError::NotImplemented(ref m) if m == "formatDisk"));
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
    }

    #[test]
    fn test_missing_argument() {
        let err = Request::from_method_call("editFile", json!({"contentUri": "content://x"}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("editFile"));
    }

    #[test]
    fn test_every_method_has_a_name() {
        for method in METHODS {
            assert!(method.chars().next().unwrap().is_lowercase());
        }
    }

    #[test]
    fn test_failure_values() {
        let uri = ContentUri::new("content://x");
        assert_eq!(
            Request::GetDocumentTree { content_uri: uri.clone() }.failure_value(),
            ResponseValue::Text(String::new())
        );
        assert_eq!(
            Request::IsFileWritable { content_uri: uri }.failure_value(),
            ResponseValue::Bool(false)
        );
        assert_eq!(
            Request::GetUriFromFilePath {
                file_path: PathBuf::from("/a")
            }
            .failure_value(),
            ResponseValue::Null
        );
    }

    #[test]
    fn test_response_json() {
        let response = Response::failure(
            RequestId::from("r1"),
            ResponseValue::Bool(false),
            ErrorKind::UserDenied,
        );
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"requestId":"r1","value":false,"error":"user_denied"}"#
        );
        let ok = Response::success(RequestId::from("r2"), ResponseValue::Null);
        assert_eq!(
            serde_json::to_string(&ok).unwrap(),
            r#"{"requestId":"r2","value":null,"error":null}"#
        );
    }
}
