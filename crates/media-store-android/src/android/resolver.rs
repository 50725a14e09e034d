use std::io::{Read, Write};
use std::path::Path;

use jni::JNIEnv;
use jni::objects::{JObject, JValue};
use media_store_engine::platform::{
    ContentResolver, MediaScanner, NewRow, PlatformError, RowSelection, mime,
};
use media_store_engine::{ContentUri, RequestId};

use super::streams::{JavaInputStream, JavaOutputStream};
use super::{
    ContextRef, SCAN_HOST, content_resolver, java_string, parse_uri, slot, string_array, uri_string,
    with_env, with_jni,
};

const ID: &str = "_id";
const DISPLAY_NAME: &str = "_display_name";
const MIME_TYPE: &str = "mime_type";
const RELATIVE_PATH: &str = "relative_path";
const IS_PENDING: &str = "is_pending";

const QUERY_SIGNATURE: &str = "(Landroid/net/Uri;[Ljava/lang/String;Ljava/lang/String;[Ljava/lang/String;Ljava/lang/String;)Landroid/database/Cursor;";

/// MediaStore rows and SAF documents reached through one `Context`
pub(crate) struct AndroidStorage {
    context: ContextRef,
}

impl AndroidStorage {
    pub(crate) fn new(context: ContextRef) -> Self {
        Self { context }
    }

    pub(super) fn context(&self) -> &ContextRef {
        &self.context
    }
}

fn selection_clause() -> String {
    format!("{DISPLAY_NAME} = ? AND {RELATIVE_PATH} = ?")
}

/// `resolver.query(uri, projection, selection, args, null)`; a null cursor is `None`
pub(super) fn query<'local>(
    env: &mut JNIEnv<'local>,
    resolver: &JObject,
    uri: &JObject,
    projection: &[&str],
    selection: Option<&RowSelection>,
) -> jni::errors::Result<Option<JObject<'local>>> {
    let projection = string_array(env, projection)?;
    let (clause, args) = match selection {
        Some(selection) => (
            JObject::from(env.new_string(selection_clause())?),
            JObject::from(string_array(
                env,
                &[selection.display_name.as_str(), selection.relative_path.as_str()],
            )?),
        ),
        None => (JObject::null(), JObject::null()),
    };
    let cursor = env
        .call_method(
            resolver,
            "query",
            QUERY_SIGNATURE,
            &[
                JValue::Object(uri),
                JValue::Object(&projection),
                JValue::Object(&clause),
                JValue::Object(&args),
                JValue::Object(&JObject::null()),
            ],
        )?
        .l()?;
    Ok((!cursor.is_null()).then_some(cursor))
}

/// Run `f` on the cursor's first row and close the cursor.
///
/// No JNI call is allowed while an exception is pending, so on error the
/// cursor is left to its finalizer.
pub(super) fn first_row<T>(
    env: &mut JNIEnv,
    cursor: JObject,
    f: impl FnOnce(&mut JNIEnv, &JObject) -> jni::errors::Result<T>,
) -> jni::errors::Result<Option<T>> {
    let row = if env.call_method(&cursor, "moveToFirst", "()Z", &[])?.z()? {
        Some(f(env, &cursor)?)
    } else {
        None
    };
    env.call_method(&cursor, "close", "()V", &[])?;
    Ok(row)
}

fn content_values<'local>(env: &mut JNIEnv<'local>) -> jni::errors::Result<JObject<'local>> {
    env.new_object("android/content/ContentValues", "()V", &[])
}

fn put_string(
    env: &mut JNIEnv,
    values: &JObject,
    key: &str,
    value: &str,
) -> jni::errors::Result<()> {
    let key = env.new_string(key)?;
    let value = env.new_string(value)?;
    env.call_method(
        values,
        "put",
        "(Ljava/lang/String;Ljava/lang/String;)V",
        &[JValue::Object(&key), JValue::Object(&value)],
    )?;
    Ok(())
}

fn put_int(env: &mut JNIEnv, values: &JObject, key: &str, value: i32) -> jni::errors::Result<()> {
    let key = env.new_string(key)?;
    let boxed = env
        .call_static_method(
            "java/lang/Integer",
            "valueOf",
            "(I)Ljava/lang/Integer;",
            &[JValue::Int(value)],
        )?
        .l()?;
    env.call_method(
        values,
        "put",
        "(Ljava/lang/String;Ljava/lang/Integer;)V",
        &[JValue::Object(&key), JValue::Object(&boxed)],
    )?;
    Ok(())
}

impl ContentResolver for AndroidStorage {
    fn query_row_id(
        &self,
        collection: &ContentUri,
        selection: &RowSelection,
    ) -> Result<Option<i64>, PlatformError> {
        with_jni(&self.context, |env, context| {
            let resolver = content_resolver(env, context)?;
            let uri = parse_uri(env, collection.as_str())?;
            let Some(cursor) = query(env, &resolver, &uri, &[ID], Some(selection))? else {
                return Ok(None);
            };
            first_row(env, cursor, |env, cursor| {
                env.call_method(cursor, "getLong", "(I)J", &[JValue::Int(0)])?.j()
            })
        })
    }

    fn insert(&self, collection: &ContentUri, row: &NewRow) -> Result<ContentUri, PlatformError> {
        let inserted = with_jni(&self.context, |env, context| {
            let resolver = content_resolver(env, context)?;
            let uri = parse_uri(env, collection.as_str())?;
            let values = content_values(env)?;
            put_string(env, &values, DISPLAY_NAME, &row.display_name)?;
            put_string(env, &values, MIME_TYPE, &row.mime_type)?;
            put_string(env, &values, RELATIVE_PATH, &row.relative_path)?;
            put_int(env, &values, IS_PENDING, i32::from(row.pending))?;
            let handle = env
                .call_method(
                    &resolver,
                    "insert",
                    "(Landroid/net/Uri;Landroid/content/ContentValues;)Landroid/net/Uri;",
                    &[JValue::Object(&uri), JValue::Object(&values)],
                )?
                .l()?;
            uri_string(env, &handle)
        })?;
        inserted.map(ContentUri::new).ok_or(PlatformError::InsertFailed)
    }

    fn set_pending(&self, uri: &ContentUri, pending: bool) -> Result<(), PlatformError> {
        with_jni(&self.context, |env, context| {
            let resolver = content_resolver(env, context)?;
            let target = parse_uri(env, uri.as_str())?;
            let values = content_values(env)?;
            put_int(env, &values, IS_PENDING, i32::from(pending))?;
            env.call_method(
                &resolver,
                "update",
                "(Landroid/net/Uri;Landroid/content/ContentValues;Ljava/lang/String;[Ljava/lang/String;)I",
                &[
                    JValue::Object(&target),
                    JValue::Object(&values),
                    JValue::Object(&JObject::null()),
                    JValue::Object(&JObject::null()),
                ],
            )?;
            Ok(())
        })
    }

    fn delete(
        &self,
        uri: &ContentUri,
        selection: Option<&RowSelection>,
    ) -> Result<usize, PlatformError> {
        with_jni(&self.context, |env, context| {
            let resolver = content_resolver(env, context)?;
            let target = parse_uri(env, uri.as_str())?;
            let (clause, args) = match selection {
                Some(selection) => (
                    JObject::from(env.new_string(selection_clause())?),
                    JObject::from(string_array(
                        env,
                        &[selection.display_name.as_str(), selection.relative_path.as_str()],
                    )?),
                ),
                None => (JObject::null(), JObject::null()),
            };
            let removed = env
                .call_method(
                    &resolver,
                    "delete",
                    "(Landroid/net/Uri;Ljava/lang/String;[Ljava/lang/String;)I",
                    &[
                        JValue::Object(&target),
                        JValue::Object(&clause),
                        JValue::Object(&args),
                    ],
                )?
                .i()?;
            Ok(usize::try_from(removed).unwrap_or(0))
        })
    }

    fn open_output(&self, uri: &ContentUri) -> Result<Box<dyn Write + Send>, PlatformError> {
        let stream = with_jni(&self.context, |env, context| {
            let resolver = content_resolver(env, context)?;
            let target = parse_uri(env, uri.as_str())?;
            // "wt" truncates
            let mode = env.new_string("wt")?;
            let stream = env
                .call_method(
                    &resolver,
                    "openOutputStream",
                    "(Landroid/net/Uri;Ljava/lang/String;)Ljava/io/OutputStream;",
                    &[JValue::Object(&target), JValue::Object(&mode)],
                )?
                .l()?;
            if stream.is_null() {
                return Ok(None);
            }
            Ok(Some(env.new_global_ref(stream)?))
        })?;
        let stream = stream
            .ok_or_else(|| PlatformError::Provider(format!("No output stream for {uri}")))?;
        Ok(Box::new(JavaOutputStream::new(stream)))
    }

    fn open_input(&self, uri: &ContentUri) -> Result<Box<dyn Read + Send>, PlatformError> {
        let stream = with_jni(&self.context, |env, context| {
            let resolver = content_resolver(env, context)?;
            let target = parse_uri(env, uri.as_str())?;
            let stream = env
                .call_method(
                    &resolver,
                    "openInputStream",
                    "(Landroid/net/Uri;)Ljava/io/InputStream;",
                    &[JValue::Object(&target)],
                )?
                .l()?;
            if stream.is_null() {
                return Ok(None);
            }
            Ok(Some(env.new_global_ref(stream)?))
        })?;
        let stream =
            stream.ok_or_else(|| PlatformError::Provider(format!("No input stream for {uri}")))?;
        Ok(Box::new(JavaInputStream::new(stream)))
    }

    fn mime_type_from_extension(&self, extension: &str) -> Option<String> {
        let mime_type = with_env(|env| {
            let map = env
                .call_static_method(
                    "android/webkit/MimeTypeMap",
                    "getSingleton",
                    "()Landroid/webkit/MimeTypeMap;",
                    &[],
                )?
                .l()?;
            let extension = env.new_string(extension.to_lowercase())?;
            let mime_type = env
                .call_method(
                    &map,
                    "getMimeTypeFromExtension",
                    "(Ljava/lang/String;)Ljava/lang/String;",
                    &[JValue::Object(&extension)],
                )?
                .l()?;
            java_string(env, mime_type)
        });
        match mime_type {
            Ok(Some(mime_type)) => Some(mime_type),
            Ok(None) => mime::from_extension(extension).map(str::to_string),
            Err(e) => {
                log::warn!("MimeTypeMap lookup failed for .{extension}: {e}");
                mime::from_extension(extension).map(str::to_string)
            }
        }
    }
}

/// Starts scans through the registered Kotlin host, which reports back via
/// `MediaStoreBridge::on_media_scan_completed`
pub(crate) struct AndroidScanner;

impl MediaScanner for AndroidScanner {
    fn scan_file(&self, path: &Path, request_id: &RequestId) -> Result<(), PlatformError> {
        let host = slot(&SCAN_HOST)
            .clone()
            .ok_or_else(|| PlatformError::Provider("No media scan host registered".to_string()))?;
        let absolute = std::path::absolute(path)?;
        with_env(|env| {
            let path = env.new_string(absolute.to_string_lossy())?;
            let request_id = env.new_string(request_id.as_str())?;
            env.call_method(
                host.as_obj(),
                "requestMediaScan",
                "(Ljava/lang/String;Ljava/lang/String;)V",
                &[JValue::Object(&path), JValue::Object(&request_id)],
            )?;
            Ok(())
        })
    }
}
