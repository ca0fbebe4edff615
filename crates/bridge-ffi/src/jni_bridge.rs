// JNI bindings for Android/JVM
// The Java provider object implements:
//   boolean connect(long ticket)
//   void disconnect()
//   boolean sendCommand(int command, long argument)
// and forwards its MediaBrowser callbacks to the nativeProvider* functions.
// Listeners implement: void onBridgeEvent(int kind, long value, long extra, String json)
// A listener may call into other bridges, never into the one notifying it.

use super::*;
use jni::objects::{GlobalRef, JClass, JObject, JString, JValue};
use jni::sys::{jboolean, jfloat, jint, jlong, jstring, JNI_FALSE, JNI_TRUE};
use jni::{JNIEnv, JavaVM};

fn jni_error(err: jni::errors::Error) -> BridgeError {
    BridgeError::InvalidArgument(format!("JNI error: {}", err))
}

fn jstring_to_string(env: &mut JNIEnv, jstr: &JString) -> Result<String> {
    let java_str = env.get_string(jstr).map_err(jni_error)?;
    Ok(java_str.into())
}

fn opt_jstring(env: &mut JNIEnv, jstr: &JString) -> Option<String> {
    if jstr.is_null() {
        return None;
    }
    jstring_to_string(env, jstr).ok()
}

fn string_to_jstring(env: &JNIEnv, s: &str) -> Result<jstring> {
    env.new_string(s)
        .map(|j| j.into_raw())
        .map_err(jni_error)
}

/// Java provider object reachable from any thread
#[derive(Clone)]
struct JavaPeer {
    vm: Arc<JavaVM>,
    object: GlobalRef,
}

impl JavaPeer {
    fn new(env: &mut JNIEnv, object: &JObject) -> Result<Self> {
        Ok(Self {
            vm: Arc::new(env.get_java_vm().map_err(jni_error)?),
            object: env.new_global_ref(object).map_err(jni_error)?,
        })
    }

    fn call_bool(&self, name: &str, sig: &str, args: &[JValue]) -> Result<bool> {
        let mut env = self.vm.attach_current_thread().map_err(jni_error)?;
        env.call_method(self.object.as_obj(), name, sig, args)
            .and_then(|v| v.z())
            .map_err(jni_error)
    }

    fn call_void(&self, name: &str, sig: &str, args: &[JValue]) -> Result<()> {
        let mut env = self.vm.attach_current_thread().map_err(jni_error)?;
        env.call_method(self.object.as_obj(), name, sig, args)
            .map(|_| ())
            .map_err(jni_error)
    }
}

struct JavaProvider {
    peer: JavaPeer,
}

impl SessionProvider for JavaProvider {
    fn connect(&mut self, events: ProviderEvents) -> std::result::Result<(), ConnectError> {
        match self
            .peer
            .call_bool("connect", "(J)Z", &[JValue::Long(events.ticket() as jlong)])
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(ConnectError::ProviderUnavailable("connect refused".into())),
            Err(err) => Err(ConnectError::Other(err.to_string())),
        }
    }

    fn disconnect(&mut self) {
        if let Err(err) = self.peer.call_void("disconnect", "()V", &[]) {
            log::error!("Java disconnect failed: {}", err);
        }
    }
}

struct JavaSession {
    peer: JavaPeer,
}

impl SessionHandle for JavaSession {
    fn send(&mut self, command: TransportCommand) -> Result<()> {
        let (code, argument) = command_code(command);
        let accepted = self.peer.call_bool(
            "sendCommand",
            "(IJ)Z",
            &[JValue::Int(code), JValue::Long(argument)],
        )?;
        if accepted {
            Ok(())
        } else {
            Err(BridgeError::Command(format!("{:?} rejected", command)))
        }
    }
}

struct JavaListener {
    peer: JavaPeer,
}

impl BridgeListener for JavaListener {
    fn on_event(&self, event: &BridgeEvent) {
        let encoded = encode_event(event);
        let json = match (&encoded.metadata, &encoded.message) {
            (Some(metadata), _) => serde_json::to_string(metadata).unwrap_or_default(),
            (None, Some(message)) => serde_json::json!({ "message": message }).to_string(),
            (None, None) => String::new(),
        };

        let result = (|| -> Result<()> {
            let mut env = self.peer.vm.attach_current_thread().map_err(jni_error)?;
            let text = env.new_string(&json).map_err(jni_error)?;
            env.call_method(
                self.peer.object.as_obj(),
                "onBridgeEvent",
                "(IJJLjava/lang/String;)V",
                &[
                    JValue::Int(encoded.kind),
                    JValue::Long(encoded.value),
                    JValue::Long(encoded.extra),
                    JValue::Object(&text),
                ],
            )
            .map_err(jni_error)?;
            Ok(())
        })();
        if let Err(err) = result {
            log::error!("Java listener failed: {}", err);
        }
    }
}

fn as_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

fn create_java_bridge(env: &mut JNIEnv, provider: &JObject, config: Result<BridgeConfig>) -> jlong {
    init_logging();
    let created = config.and_then(|config| JavaPeer::new(env, provider).map(|peer| (config, peer)));
    let (config, peer) = match created {
        Ok(created) => created,
        Err(err) => {
            log::error!("Failed to create bridge: {}", err);
            return -1;
        }
    };
    register_bridge(config, move |_bridge_id| {
        let session_peer = peer.clone();
        let factory: SessionFactory = Arc::new(move || {
            Box::new(JavaSession {
                peer: session_peer.clone(),
            }) as Box<dyn SessionHandle>
        });
        (Box::new(JavaProvider { peer }), factory)
    })
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeCreate(
    mut env: JNIEnv,
    _class: JClass,
    provider: JObject,
) -> jlong {
    create_java_bridge(&mut env, &provider, Ok(BridgeConfig::default()))
}

/// `config` is a TOML document, e.g. `pending_commands = "replay_latest"`
#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeCreateWithConfig(
    mut env: JNIEnv,
    _class: JClass,
    provider: JObject,
    config: JString,
) -> jlong {
    let config = if config.is_null() {
        Err(BridgeError::InvalidArgument("config is null".into()))
    } else {
        jstring_to_string(&mut env, &config).and_then(|text| BridgeConfig::from_toml_str(&text))
    };
    create_java_bridge(&mut env, &provider, config)
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeSetListener(
    mut env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
    listener: JObject,
) -> jint {
    if listener.is_null() {
        return to_code(set_listener(bridge_id, None));
    }
    let result = JavaPeer::new(&mut env, &listener).and_then(|peer| {
        set_listener(bridge_id, Some(Arc::new(JavaListener { peer }) as Arc<dyn BridgeListener>))
    });
    to_code(result)
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeOnStart(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jint {
    to_code(with_bridge_mut(bridge_id, |b| b.on_become_visible()))
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeOnStop(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jint {
    to_code(with_bridge_mut(bridge_id, |b| {
        b.on_become_hidden();
        Ok(())
    }))
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativePlay(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jint {
    to_code(with_bridge_mut(bridge_id, |b| b.play()))
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativePause(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jint {
    to_code(with_bridge_mut(bridge_id, |b| b.pause()))
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeSkipNext(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jint {
    to_code(with_bridge_mut(bridge_id, |b| b.skip_next()))
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeSkipPrevious(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jint {
    to_code(with_bridge_mut(bridge_id, |b| b.skip_previous()))
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeTogglePlayPause(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jint {
    to_code(with_bridge_mut(bridge_id, |b| b.toggle_play_pause()))
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeSeek(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
    position_ms: jlong,
) -> jint {
    if position_ms < 0 {
        return -1;
    }
    to_code(with_bridge_mut(bridge_id, |b| b.seek_to(position_ms as u64)))
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeDispatch(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jint {
    with_bridge_mut(bridge_id, |b| Ok(b.dispatch_pending() as jint)).unwrap_or(-1)
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeIsPlaying(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jboolean {
    as_jboolean(with_bridge(bridge_id, |b| Ok(b.is_playing())).unwrap_or(false))
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeGetConnectionState(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jint {
    with_bridge(bridge_id, |b| Ok(connection_state_code(b.current_state()))).unwrap_or(-1)
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeGetGeneration(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jlong {
    with_bridge(bridge_id, |b| Ok(b.current_generation() as jlong)).unwrap_or(-1)
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeGetPosition(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jlong {
    with_bridge(bridge_id, |b| Ok(b.estimated_position()))
        .ok()
        .flatten()
        .map(|pos| pos as jlong)
        .unwrap_or(-1)
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeGetMetadataJson(
    env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jstring {
    match metadata_json(bridge_id).and_then(|json| string_to_jstring(&env, &json)) {
        Ok(text) => text,
        Err(err) => {
            log::error!("Failed to get metadata: {}", err);
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeRelease(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
) -> jint {
    to_code(release_bridge(bridge_id))
}

// Provider callbacks; may be called from any thread.

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeProviderConnected(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
    ticket: jlong,
) -> jint {
    to_code(provider_events(bridge_id, ticket).map(|(events, new_session)| {
        events.connected(new_session());
    }))
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeProviderConnectionFailed(
    mut env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
    ticket: jlong,
    code: jint,
    reason: JString,
) -> jint {
    let reason = opt_jstring(&mut env, &reason).unwrap_or_else(|| format!("code {}", code));
    let error = connect_error_with_reason(code, reason);
    to_code(provider_events(bridge_id, ticket).map(|(events, _)| events.connection_failed(error)))
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeProviderConnectionLost(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
    ticket: jlong,
) -> jint {
    to_code(provider_events(bridge_id, ticket).map(|(events, _)| events.connection_lost()))
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeProviderStateChanged(
    _env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
    ticket: jlong,
    state: jint,
    position_ms: jlong,
    playback_speed: jfloat,
) -> jint {
    mediabridge_provider_state_changed(bridge_id, ticket, state, position_ms, playback_speed)
}

#[no_mangle]
pub extern "system" fn Java_com_example_android_mediasession_client_NativeMediaBridge_nativeProviderMetadataChanged(
    mut env: JNIEnv,
    _class: JClass,
    bridge_id: jlong,
    ticket: jlong,
    media_id: JString,
    title: JString,
    artist: JString,
    artwork: JString,
    duration_ms: jlong,
) -> jint {
    let metadata = opt_jstring(&mut env, &media_id).map(|media_id| {
        let mut metadata = TrackMetadata::new(
            media_id,
            opt_jstring(&mut env, &title).unwrap_or_default(),
            opt_jstring(&mut env, &artist).unwrap_or_default(),
        );
        metadata.artwork_ref = opt_jstring(&mut env, &artwork);
        metadata.duration_ms = u64::try_from(duration_ms).ok();
        metadata
    });
    to_code(provider_events(bridge_id, ticket).map(|(events, _)| events.metadata_changed(metadata)))
}
