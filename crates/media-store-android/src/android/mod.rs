//! JNI plumbing shared by the platform implementations.

mod documents;
mod host;
mod resolver;
mod streams;

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use jni::JNIEnv;
use jni::objects::{GlobalRef, JClass, JObject, JObjectArray, JString, JValue};
use media_store_engine::platform::{ConsentToken, PlatformError};
use media_store_engine::{ForegroundContext, StorageContext};

use host::AndroidActivityHost;
use resolver::{AndroidScanner, AndroidStorage};

const RECOVERABLE_SECURITY_EXCEPTION: &str = "android/app/RecoverableSecurityException";
const FILE_NOT_FOUND_EXCEPTION: &str = "java/io/FileNotFoundException";

/// Activity currently in the foreground, if any
static ACTIVITY: Mutex<Option<GlobalRef>> = Mutex::new(None);
/// Kotlin object that runs `MediaScannerConnection.scanFile` for us
static SCAN_HOST: Mutex<Option<GlobalRef>> = Mutex::new(None);

fn slot(slot: &Mutex<Option<GlobalRef>>) -> MutexGuard<'_, Option<GlobalRef>> {
    // Recover from poisoned mutex (another thread panicked while holding lock)
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Which Android `Context` a platform object talks through
#[derive(Clone)]
pub(crate) enum ContextRef {
    Application,
    Activity(GlobalRef),
}

/// Intent sender carried by a `RecoverableSecurityException`
pub(crate) struct IntentSender(pub(crate) GlobalRef);

fn provider_error(e: jni::errors::Error) -> PlatformError {
    PlatformError::Provider(format!("JNI error: {e}"))
}

/// Run JNI operations on the current thread, attaching it if needed.
fn with_env<F, T>(f: F) -> Result<T, PlatformError>
where
    F: FnOnce(&mut JNIEnv) -> jni::errors::Result<T>,
{
    let ctx = ndk_context::android_context();
    let vm = unsafe { jni::JavaVM::from_raw(ctx.vm().cast()) }.map_err(provider_error)?;
    let mut env = vm.attach_current_thread().map_err(provider_error)?;

    match f(&mut env) {
        Ok(result) => Ok(result),
        Err(jni::errors::Error::JavaException) => Err(take_exception(&mut env)),
        Err(e) => Err(provider_error(e)),
    }
}

/// Run JNI operations against `context`. A thrown Java exception is cleared
/// and translated, so callers see a recoverable permission as `NeedsConsent`.
fn with_jni<F, T>(context: &ContextRef, f: F) -> Result<T, PlatformError>
where
    F: FnOnce(&mut JNIEnv, &JObject) -> jni::errors::Result<T>,
{
    with_env(|env| match context {
        ContextRef::Application => {
            let ctx = ndk_context::android_context();
            let application = unsafe { JObject::from_raw(ctx.context().cast()) };
            f(env, &application)
        }
        ContextRef::Activity(activity) => f(env, activity.as_obj()),
    })
}

fn take_exception(env: &mut JNIEnv) -> PlatformError {
    let throwable = match env.exception_occurred() {
        Ok(throwable) if !throwable.is_null() => throwable,
        _ => return PlatformError::Provider("Java exception without a throwable".to_string()),
    };
    if let Err(e) = env.exception_clear() {
        return provider_error(e);
    }

    if env
        .is_instance_of(&throwable, RECOVERABLE_SECURITY_EXCEPTION)
        .unwrap_or(false)
    {
        match intent_sender(env, &throwable) {
            Ok(sender) => return PlatformError::NeedsConsent(ConsentToken::new(sender)),
            Err(e) => {
                let _ = env.exception_clear();
                log::warn!("RecoverableSecurityException without a usable action: {e}");
            }
        }
    }

    let message = describe(env, &throwable).unwrap_or_else(|_| "Java exception".to_string());
    if env
        .is_instance_of(&throwable, FILE_NOT_FOUND_EXCEPTION)
        .unwrap_or(false)
    {
        return PlatformError::Io(io::Error::new(io::ErrorKind::NotFound, message));
    }
    PlatformError::Provider(message)
}

/// `exception.userAction.actionIntent.intentSender`
fn intent_sender(env: &mut JNIEnv, throwable: &JObject) -> jni::errors::Result<IntentSender> {
    let action = env
        .call_method(throwable, "getUserAction", "()Landroid/app/RemoteAction;", &[])?
        .l()?;
    let pending = env
        .call_method(&action, "getActionIntent", "()Landroid/app/PendingIntent;", &[])?
        .l()?;
    let sender = env
        .call_method(&pending, "getIntentSender", "()Landroid/content/IntentSender;", &[])?
        .l()?;
    Ok(IntentSender(env.new_global_ref(sender)?))
}

fn describe(env: &mut JNIEnv, object: &JObject) -> jni::errors::Result<String> {
    let text = env
        .call_method(object, "toString", "()Ljava/lang/String;", &[])?
        .l()?;
    Ok(java_string(env, text)?.unwrap_or_default())
}

fn java_string(env: &mut JNIEnv, object: JObject) -> jni::errors::Result<Option<String>> {
    if object.is_null() {
        return Ok(None);
    }
    let text = JString::from(object);
    let value: String = env.get_string(&text)?.into();
    Ok(Some(value))
}

fn parse_uri<'local>(env: &mut JNIEnv<'local>, uri: &str) -> jni::errors::Result<JObject<'local>> {
    let uri_string = env.new_string(uri)?;
    env.call_static_method(
        "android/net/Uri",
        "parse",
        "(Ljava/lang/String;)Landroid/net/Uri;",
        &[JValue::Object(&uri_string)],
    )?
    .l()
}

fn uri_string(env: &mut JNIEnv, uri: &JObject) -> jni::errors::Result<Option<String>> {
    if uri.is_null() {
        return Ok(None);
    }
    let text = describe(env, uri)?;
    Ok(Some(text.trim().to_string()))
}

fn string_array<'local>(
    env: &mut JNIEnv<'local>,
    items: &[&str],
) -> jni::errors::Result<JObjectArray<'local>> {
    let array = env.new_object_array(items.len() as i32, "java/lang/String", JObject::null())?;
    for (index, item) in items.iter().enumerate() {
        let value = env.new_string(item)?;
        env.set_object_array_element(&array, index as i32, &value)?;
        env.delete_local_ref(value)?;
    }
    Ok(array)
}

fn content_resolver<'local>(
    env: &mut JNIEnv<'local>,
    context: &JObject,
) -> jni::errors::Result<JObject<'local>> {
    env.call_method(
        context,
        "getContentResolver",
        "()Landroid/content/ContentResolver;",
        &[],
    )?
    .l()
}

/// Get the Android SDK version (Build.VERSION.SDK_INT)
fn get_sdk_version(env: &mut JNIEnv) -> jni::errors::Result<i32> {
    let build_version = env.find_class("android/os/Build$VERSION")?;
    let sdk_int = env.get_static_field(build_version, "SDK_INT", "I")?;
    sdk_int.i()
}

pub fn sdk_int() -> i64 {
    match with_env(get_sdk_version) {
        Ok(version) => i64::from(version),
        Err(e) => {
            log::error!("Failed to read SDK_INT: {e}");
            0
        }
    }
}

fn storage_for(context: ContextRef) -> StorageContext {
    let storage = Arc::new(AndroidStorage::new(context));
    StorageContext {
        resolver: storage.clone(),
        documents: storage,
        scanner: Arc::new(AndroidScanner),
    }
}

/// Process-wide context, usable without an activity
pub fn storage_context() -> StorageContext {
    storage_for(ContextRef::Application)
}

/// Context of the registered activity, if one is attached
pub fn foreground_context() -> Option<ForegroundContext> {
    let activity = slot(&ACTIVITY).clone()?;
    Some(ForegroundContext {
        storage: storage_for(ContextRef::Activity(activity.clone())),
        host: Arc::new(AndroidActivityHost::new(activity)),
    })
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_dev_mediastore_MediaStoreHost_nativeAttachActivity(
    env: JNIEnv,
    _class: JClass,
    activity: JObject,
) {
    match env.new_global_ref(activity) {
        Ok(activity) => {
            log::debug!("Activity registered");
            *slot(&ACTIVITY) = Some(activity);
        }
        Err(e) => log::error!("Failed to register activity: {e}"),
    }
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_dev_mediastore_MediaStoreHost_nativeDetachActivity(
    _env: JNIEnv,
    _class: JClass,
) {
    log::debug!("Activity unregistered");
    *slot(&ACTIVITY) = None;
}

#[unsafe(no_mangle)]
pub extern "system" fn Java_dev_mediastore_MediaStoreHost_nativeRegisterScanHost(
    env: JNIEnv,
    _class: JClass,
    host: JObject,
) {
    match env.new_global_ref(host) {
        Ok(host) => *slot(&SCAN_HOST) = Some(host),
        Err(e) => log::error!("Failed to register media scan host: {e}"),
    }
}
