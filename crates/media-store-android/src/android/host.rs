//! System prompts launched from the foreground activity.

use jni::objects::{GlobalRef, JObject, JValue};
use media_store_engine::platform::{ActivityHost, ConsentToken, PlatformError};
use media_store_engine::{ContentUri, RequestCode};

use super::{ContextRef, IntentSender, get_sdk_version, parse_uri, uri_string, with_jni};

const ACTION_OPEN_DOCUMENT_TREE: &str = "android.intent.action.OPEN_DOCUMENT_TREE";
const EXTRA_INITIAL_URI: &str = "android.provider.extra.INITIAL_URI";
const STORAGE_SERVICE: &str = "storage";

/// Build.VERSION_CODES.Q, first level with StorageVolume.createOpenDocumentTreeIntent
const API_Q: i32 = 29;

pub(crate) struct AndroidActivityHost {
    activity: ContextRef,
}

impl AndroidActivityHost {
    pub(crate) fn new(activity: GlobalRef) -> Self {
        Self {
            activity: ContextRef::Activity(activity),
        }
    }
}

impl ActivityHost for AndroidActivityHost {
    fn launch_consent(&self, token: &ConsentToken, code: RequestCode) -> Result<(), PlatformError> {
        let sender = token.downcast_ref::<IntentSender>().ok_or_else(|| {
            PlatformError::Provider("Consent token is not an IntentSender".to_string())
        })?;
        with_jni(&self.activity, |env, activity| {
            env.call_method(
                activity,
                "startIntentSenderForResult",
                "(Landroid/content/IntentSender;ILandroid/content/Intent;III)V",
                &[
                    JValue::Object(sender.0.as_obj()),
                    JValue::Int(code.code()),
                    JValue::Object(&JObject::null()),
                    JValue::Int(0),
                    JValue::Int(0),
                    JValue::Int(0),
                ],
            )?;
            Ok(())
        })
    }

    fn picker_root_uri(&self) -> Option<ContentUri> {
        let root = with_jni(&self.activity, |env, activity| {
            if get_sdk_version(env)? < API_Q {
                return Ok(None);
            }
            let service = env.new_string(STORAGE_SERVICE)?;
            let storage_manager = env
                .call_method(
                    activity,
                    "getSystemService",
                    "(Ljava/lang/String;)Ljava/lang/Object;",
                    &[JValue::Object(&service)],
                )?
                .l()?;
            let volume = env
                .call_method(
                    &storage_manager,
                    "getPrimaryStorageVolume",
                    "()Landroid/os/storage/StorageVolume;",
                    &[],
                )?
                .l()?;
            let intent = env
                .call_method(
                    &volume,
                    "createOpenDocumentTreeIntent",
                    "()Landroid/content/Intent;",
                    &[],
                )?
                .l()?;
            let extra = env.new_string(EXTRA_INITIAL_URI)?;
            let uri = env
                .call_method(
                    &intent,
                    "getParcelableExtra",
                    "(Ljava/lang/String;)Landroid/os/Parcelable;",
                    &[JValue::Object(&extra)],
                )?
                .l()?;
            uri_string(env, &uri)
        });
        match root {
            Ok(root) => root.map(ContentUri::new),
            Err(e) => {
                log::warn!("No picker root available: {e}");
                None
            }
        }
    }

    fn launch_directory_picker(
        &self,
        initial_uri: Option<&ContentUri>,
        code: RequestCode,
    ) -> Result<(), PlatformError> {
        with_jni(&self.activity, |env, activity| {
            let action = env.new_string(ACTION_OPEN_DOCUMENT_TREE)?;
            let intent = env.new_object(
                "android/content/Intent",
                "(Ljava/lang/String;)V",
                &[JValue::Object(&action)],
            )?;
            if let Some(initial_uri) = initial_uri {
                let extra = env.new_string(EXTRA_INITIAL_URI)?;
                let uri = parse_uri(env, initial_uri.as_str())?;
                env.call_method(
                    &intent,
                    "putExtra",
                    "(Ljava/lang/String;Landroid/os/Parcelable;)Landroid/content/Intent;",
                    &[JValue::Object(&extra), JValue::Object(&uri)],
                )?;
            }
            env.call_method(
                activity,
                "startActivityForResult",
                "(Landroid/content/Intent;I)V",
                &[JValue::Object(&intent), JValue::Int(code.code())],
            )?;
            Ok(())
        })
    }
}
