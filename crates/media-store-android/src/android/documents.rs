use jni::JNIEnv;
use jni::objects::{JObject, JValue};
use media_store_engine::platform::{DocumentProvider, PlatformError};
use media_store_engine::{ContentUri, DocumentEntry, DocumentFlags};

use super::resolver::{AndroidStorage, first_row, query};
use super::{content_resolver, java_string, parse_uri, uri_string, with_jni};

const DOCUMENTS_CONTRACT: &str = "android/provider/DocumentsContract";

const COLUMN_DOCUMENT_ID: &str = "document_id";
const COLUMN_DISPLAY_NAME: &str = "_display_name";
const COLUMN_MIME_TYPE: &str = "mime_type";
const COLUMN_LAST_MODIFIED: &str = "last_modified";
const COLUMN_SIZE: &str = "_size";
const COLUMN_FLAGS: &str = "flags";

const MIME_TYPE_DIR: &str = "vnd.android.document/directory";
const FLAG_VIRTUAL_DOCUMENT: i32 = 0x200;

const GRANT_READ_WRITE: i32 = 0x1 | 0x2;

/// Local refs created while reading one cursor row
const ROW_FRAME: i32 = 8;

/// One cursor row of a child listing, in projection order
fn read_child(
    env: &mut JNIEnv,
    cursor: &JObject,
    tree: &JObject,
) -> jni::errors::Result<DocumentEntry> {
    let document_id = cursor_string(env, cursor, 0)?.unwrap_or_default();
    let name = cursor_string(env, cursor, 1)?;
    let mime_type = cursor_string(env, cursor, 2)?;
    let last_modified = cursor_long(env, cursor, 3)?;
    let size_bytes = cursor_long(env, cursor, 4)?;
    let flags = env
        .call_method(cursor, "getInt", "(I)I", &[JValue::Int(5)])?
        .i()?;

    let id = env.new_string(&document_id)?;
    let child = env
        .call_static_method(
            DOCUMENTS_CONTRACT,
            "buildDocumentUriUsingTree",
            "(Landroid/net/Uri;Ljava/lang/String;)Landroid/net/Uri;",
            &[JValue::Object(tree), JValue::Object(&id)],
        )?
        .l()?;
    let uri = uri_string(env, &child)?.unwrap_or_default();
    env.delete_local_ref(child)?;
    env.delete_local_ref(id)?;

    let is_directory = mime_type.as_deref() == Some(MIME_TYPE_DIR);
    Ok(DocumentEntry {
        name,
        uri: ContentUri::new(uri),
        is_virtual: flags & FLAG_VIRTUAL_DOCUMENT != 0,
        is_directory,
        // Directories report no type, like DocumentFile does
        mime_type: if is_directory { None } else { mime_type },
        last_modified,
        size_bytes,
    })
}

fn read_children(
    env: &mut JNIEnv,
    cursor: &JObject,
    tree: &JObject,
) -> jni::errors::Result<Vec<DocumentEntry>> {
    let mut children = Vec::new();
    while env.call_method(cursor, "moveToNext", "()Z", &[])?.z()? {
        // One frame per row keeps local refs bounded on large directories
        let child = env.with_local_frame(ROW_FRAME, |env| read_child(env, cursor, tree))?;
        children.push(child);
    }
    Ok(children)
}

fn cursor_string(
    env: &mut JNIEnv,
    cursor: &JObject,
    column: i32,
) -> jni::errors::Result<Option<String>> {
    let value = env
        .call_method(cursor, "getString", "(I)Ljava/lang/String;", &[JValue::Int(column)])?
        .l()?;
    java_string(env, value)
}

fn cursor_long(env: &mut JNIEnv, cursor: &JObject, column: i32) -> jni::errors::Result<i64> {
    env.call_method(cursor, "getLong", "(I)J", &[JValue::Int(column)])?
        .j()
}

impl DocumentProvider for AndroidStorage {
    fn is_document_uri(&self, uri: &ContentUri) -> bool {
        let result = with_jni(self.context(), |env, context| {
            let target = parse_uri(env, uri.as_str())?;
            env.call_static_method(
                DOCUMENTS_CONTRACT,
                "isDocumentUri",
                "(Landroid/content/Context;Landroid/net/Uri;)Z",
                &[JValue::Object(context), JValue::Object(&target)],
            )?
            .z()
        });
        result.unwrap_or_else(|e| {
            log::warn!("isDocumentUri failed for {uri}: {e}");
            false
        })
    }

    fn document_flags(&self, uri: &ContentUri) -> Result<Option<DocumentFlags>, PlatformError> {
        with_jni(self.context(), |env, context| {
            let resolver = content_resolver(env, context)?;
            let target = parse_uri(env, uri.as_str())?;
            let Some(cursor) = query(env, &resolver, &target, &[COLUMN_FLAGS], None)? else {
                return Ok(None);
            };
            first_row(env, cursor, |env, cursor| {
                let flags = env
                    .call_method(cursor, "getInt", "(I)I", &[JValue::Int(0)])?
                    .i()?;
                Ok(DocumentFlags(flags))
            })
        })
    }

    fn delete_document(&self, uri: &ContentUri) -> Result<bool, PlatformError> {
        with_jni(self.context(), |env, context| {
            let resolver = content_resolver(env, context)?;
            let target = parse_uri(env, uri.as_str())?;
            env.call_static_method(
                DOCUMENTS_CONTRACT,
                "deleteDocument",
                "(Landroid/content/ContentResolver;Landroid/net/Uri;)Z",
                &[JValue::Object(&resolver), JValue::Object(&target)],
            )?
            .z()
        })
    }

    fn list_tree(&self, tree: &ContentUri) -> Result<Vec<DocumentEntry>, PlatformError> {
        with_jni(self.context(), |env, context| {
            let resolver = content_resolver(env, context)?;
            let tree_uri = parse_uri(env, tree.as_str())?;
            let parent_id = env
                .call_static_method(
                    DOCUMENTS_CONTRACT,
                    "getTreeDocumentId",
                    "(Landroid/net/Uri;)Ljava/lang/String;",
                    &[JValue::Object(&tree_uri)],
                )?
                .l()?;
            let children_uri = env
                .call_static_method(
                    DOCUMENTS_CONTRACT,
                    "buildChildDocumentsUriUsingTree",
                    "(Landroid/net/Uri;Ljava/lang/String;)Landroid/net/Uri;",
                    &[JValue::Object(&tree_uri), JValue::Object(&parent_id)],
                )?
                .l()?;

            let projection = [
                COLUMN_DOCUMENT_ID,
                COLUMN_DISPLAY_NAME,
                COLUMN_MIME_TYPE,
                COLUMN_LAST_MODIFIED,
                COLUMN_SIZE,
                COLUMN_FLAGS,
            ];
            let Some(cursor) = query(env, &resolver, &children_uri, &projection, None)? else {
                return Ok(Vec::new());
            };

            let children = read_children(env, &cursor, &tree_uri)?;
            env.call_method(&cursor, "close", "()V", &[])?;
            Ok(children)
        })
    }

    fn take_persistable_permission(&self, tree: &ContentUri) -> Result<(), PlatformError> {
        with_jni(self.context(), |env, context| {
            let resolver = content_resolver(env, context)?;
            let target = parse_uri(env, tree.as_str())?;
            env.call_method(
                &resolver,
                "takePersistableUriPermission",
                "(Landroid/net/Uri;I)V",
                &[JValue::Object(&target), JValue::Int(GRANT_READ_WRITE)],
            )?;
            Ok(())
        })
    }
}
