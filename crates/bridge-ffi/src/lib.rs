// FFI bridge for the media session core
// Provides C ABI + JNI entrypoints so a native presentation layer and a
// platform session provider can drive a SessionBridge through integer handles.

use mediabridge_core::{
    BridgeConfig, BridgeError, BridgeEvent, BridgeListener, ConnectError, ConnectionState,
    ListenerId, Notifier, PlaybackState, PlaybackStatus, ProviderEvents, Result, SessionBridge,
    SessionHandle, SessionProvider, TrackMetadata, TransportCommand,
};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::{Arc, Once};

#[cfg(any(feature = "android", feature = "desktop"))]
mod jni_bridge;

// -----------------------------------------------------------------------------
// Wire codes
// -----------------------------------------------------------------------------

pub const EVENT_CONNECTION_STATE: i32 = 1;
pub const EVENT_PLAYBACK_STATUS: i32 = 2;
pub const EVENT_POSITION: i32 = 3;
pub const EVENT_METADATA: i32 = 4;
pub const EVENT_RESYNC: i32 = 5;
pub const EVENT_CONNECTION_FAILED: i32 = 6;
pub const EVENT_CONNECTION_LOST: i32 = 7;

pub const COMMAND_PLAY: i32 = 0;
pub const COMMAND_PAUSE: i32 = 1;
pub const COMMAND_SKIP_NEXT: i32 = 2;
pub const COMMAND_SKIP_PREVIOUS: i32 = 3;
pub const COMMAND_SEEK_TO: i32 = 4;

/// Provider `connect` return code for a permission refusal
pub const CONNECT_PERMISSION_DENIED: i32 = -2;

fn connection_state_code(state: ConnectionState) -> i32 {
    match state {
        ConnectionState::Disconnected => 0,
        ConnectionState::Connecting => 1,
        ConnectionState::Connected => 2,
        ConnectionState::Failed => 3,
    }
}

fn playback_state_code(state: PlaybackState) -> i32 {
    match state {
        PlaybackState::Idle => 0,
        PlaybackState::Playing => 1,
        PlaybackState::Paused => 2,
        PlaybackState::Buffering => 3,
        PlaybackState::Stopped => 4,
        PlaybackState::Error => 5,
    }
}

fn playback_state_from_code(code: i32) -> Result<PlaybackState> {
    Ok(match code {
        0 => PlaybackState::Idle,
        1 => PlaybackState::Playing,
        2 => PlaybackState::Paused,
        3 => PlaybackState::Buffering,
        4 => PlaybackState::Stopped,
        5 => PlaybackState::Error,
        other => {
            return Err(BridgeError::InvalidArgument(format!(
                "unknown playback state {}",
                other
            )))
        }
    })
}

fn command_code(command: TransportCommand) -> (i32, i64) {
    match command {
        TransportCommand::Play => (COMMAND_PLAY, 0),
        TransportCommand::Pause => (COMMAND_PAUSE, 0),
        TransportCommand::SkipNext => (COMMAND_SKIP_NEXT, 0),
        TransportCommand::SkipPrevious => (COMMAND_SKIP_PREVIOUS, 0),
        TransportCommand::SeekTo(position_ms) => (COMMAND_SEEK_TO, position_ms as i64),
    }
}

fn connect_error_from_code(code: i32) -> ConnectError {
    connect_error_with_reason(code, format!("provider returned {}", code))
}

/// Map a provider failure code plus its description to a `ConnectError`
pub(crate) fn connect_error_with_reason(code: i32, reason: String) -> ConnectError {
    if code == CONNECT_PERMISSION_DENIED {
        ConnectError::PermissionDenied(reason)
    } else {
        ConnectError::ProviderUnavailable(reason)
    }
}

fn generation_from(ticket: i64) -> Result<u64> {
    u64::try_from(ticket)
        .map_err(|_| BridgeError::InvalidArgument(format!("negative generation {}", ticket)))
}

/// Flattened bridge event shared by the C and JNI listener paths
#[derive(Debug, Default, PartialEq)]
pub(crate) struct EncodedEvent {
    pub kind: i32,
    pub value: i64,
    pub extra: i64,
    pub metadata: Option<TrackMetadata>,
    pub message: Option<String>,
}

pub(crate) fn encode_event(event: &BridgeEvent) -> EncodedEvent {
    match event {
        BridgeEvent::ConnectionStateChanged {
            old_state,
            new_state,
        } => EncodedEvent {
            kind: EVENT_CONNECTION_STATE,
            value: connection_state_code(*new_state) as i64,
            extra: connection_state_code(*old_state) as i64,
            ..Default::default()
        },
        BridgeEvent::PlaybackStatusChanged { status } => EncodedEvent {
            kind: EVENT_PLAYBACK_STATUS,
            value: playback_state_code(status.state) as i64,
            extra: status.position_ms as i64,
            ..Default::default()
        },
        BridgeEvent::PositionChanged {
            position_ms,
            duration_ms,
        } => EncodedEvent {
            kind: EVENT_POSITION,
            value: *position_ms as i64,
            extra: duration_ms.map_or(-1, |d| d as i64),
            ..Default::default()
        },
        BridgeEvent::MetadataChanged { metadata } => EncodedEvent {
            kind: EVENT_METADATA,
            value: metadata.duration_ms.map_or(-1, |d| d as i64),
            extra: -1,
            metadata: Some((**metadata).clone()),
            ..Default::default()
        },
        BridgeEvent::Resync { snapshot } => EncodedEvent {
            kind: EVENT_RESYNC,
            value: snapshot
                .status
                .as_ref()
                .map_or(-1, |s| playback_state_code(s.state) as i64),
            extra: snapshot.status.as_ref().map_or(-1, |s| s.position_ms as i64),
            metadata: snapshot.metadata.as_ref().map(|m| (**m).clone()),
            ..Default::default()
        },
        BridgeEvent::ConnectionFailed { reason } => EncodedEvent {
            kind: EVENT_CONNECTION_FAILED,
            message: Some(reason.to_string()),
            ..Default::default()
        },
        BridgeEvent::ConnectionLost => EncodedEvent {
            kind: EVENT_CONNECTION_LOST,
            ..Default::default()
        },
    }
}

// -----------------------------------------------------------------------------
// C provider and listener
// -----------------------------------------------------------------------------

/// Session provider implemented on the native side.
/// `connect` receives the ticket to pass back with every `mediabridge_provider_*` call.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct MediaBridgeProvider {
    pub context: *mut c_void,
    pub connect: extern "C" fn(context: *mut c_void, bridge_id: i64, ticket: i64) -> i32,
    pub disconnect: extern "C" fn(context: *mut c_void, bridge_id: i64),
    pub command: extern "C" fn(context: *mut c_void, bridge_id: i64, command: i32, argument: i64) -> i32,
}

// The native side owns `context` and guarantees it is usable from any thread.
unsafe impl Send for MediaBridgeProvider {}
unsafe impl Sync for MediaBridgeProvider {}

struct NativeProvider {
    vtable: MediaBridgeProvider,
    bridge_id: i64,
}

impl SessionProvider for NativeProvider {
    fn connect(&mut self, events: ProviderEvents) -> std::result::Result<(), ConnectError> {
        let code = (self.vtable.connect)(self.vtable.context, self.bridge_id, events.ticket() as i64);
        if code == 0 {
            Ok(())
        } else {
            Err(connect_error_from_code(code))
        }
    }

    fn disconnect(&mut self) {
        (self.vtable.disconnect)(self.vtable.context, self.bridge_id);
    }
}

struct NativeSession {
    vtable: MediaBridgeProvider,
    bridge_id: i64,
}

impl SessionHandle for NativeSession {
    fn send(&mut self, command: TransportCommand) -> Result<()> {
        let (code, argument) = command_code(command);
        match (self.vtable.command)(self.vtable.context, self.bridge_id, code, argument) {
            0 => Ok(()),
            rc => Err(BridgeError::Command(format!("{:?} rejected ({})", command, rc))),
        }
    }
}

/// Event passed to native listeners. Strings are valid for the duration of the call only.
#[repr(C)]
pub struct MediaBridgeEvent {
    pub kind: i32,
    pub value: i64,
    pub extra: i64,
    pub media_id: *const c_char,
    pub title: *const c_char,
    pub artist: *const c_char,
    pub artwork: *const c_char,
    pub message: *const c_char,
}

pub type MediaBridgeListenerFn = extern "C" fn(context: *mut c_void, event: *const MediaBridgeEvent);

struct NativeListener {
    callback: MediaBridgeListenerFn,
    context: *mut c_void,
}

unsafe impl Send for NativeListener {}
unsafe impl Sync for NativeListener {}

fn to_cstring(text: &str) -> CString {
    CString::new(text.replace('\0', "")).unwrap_or_default()
}

fn opt_ptr(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(ptr::null(), |s| s.as_ptr())
}

impl BridgeListener for NativeListener {
    fn on_event(&self, event: &BridgeEvent) {
        let encoded = encode_event(event);
        let meta = encoded.metadata.as_ref();
        let media_id = meta.map(|m| to_cstring(&m.media_id));
        let title = meta.map(|m| to_cstring(&m.title));
        let artist = meta.map(|m| to_cstring(&m.artist));
        let artwork = meta.and_then(|m| m.artwork_ref.as_deref()).map(to_cstring);
        let message = encoded.message.as_deref().map(to_cstring);

        let raw = MediaBridgeEvent {
            kind: encoded.kind,
            value: encoded.value,
            extra: encoded.extra,
            media_id: opt_ptr(&media_id),
            title: opt_ptr(&title),
            artist: opt_ptr(&artist),
            artwork: opt_ptr(&artwork),
            message: opt_ptr(&message),
        };
        (self.callback)(self.context, &raw);
    }
}

// -----------------------------------------------------------------------------
// Registry
// -----------------------------------------------------------------------------

struct BridgeEntry {
    bridge: SessionBridge,
    listener: Option<ListenerId>,
}

type SessionFactory = Arc<dyn Fn() -> Box<dyn SessionHandle> + Send + Sync>;

/// Provider-facing half of a registered bridge.
/// Kept apart from the bridge registry so provider callbacks issued from
/// inside a transport command never contend for the bridge lock.
#[derive(Clone)]
struct ProviderSink {
    notifier: Notifier,
    new_session: SessionFactory,
}

// Each bridge has its own lock; the registry lock is only held to look an
// entry up, so a listener running inside one bridge may use other handles.
static BRIDGE_REGISTRY: Lazy<Mutex<HashMap<i64, Arc<Mutex<BridgeEntry>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static PROVIDER_SINKS: Lazy<Mutex<HashMap<i64, ProviderSink>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_BRIDGE_ID: Lazy<Mutex<i64>> = Lazy::new(|| Mutex::new(1));
static INIT_LOGGER: Once = Once::new();

pub(crate) fn init_logging() {
    INIT_LOGGER.call_once(|| {
        #[cfg(all(target_os = "android", feature = "android"))]
        {
            android_logger::init_once(
                android_logger::Config::default()
                    .with_max_level(log::LevelFilter::Debug)
                    .with_tag("MediaBridge"),
            );
        }

        #[cfg(not(all(target_os = "android", feature = "android")))]
        {
            let _ = env_logger::builder()
                .is_test(false)
                .filter_level(log::LevelFilter::Info)
                .try_init();
        }
    });
}

pub(crate) fn register_bridge(
    config: BridgeConfig,
    provider: impl FnOnce(i64) -> (Box<dyn SessionProvider>, SessionFactory),
) -> i64 {
    init_logging();
    let mut next = NEXT_BRIDGE_ID.lock();
    let id = *next;
    *next += 1;
    drop(next);

    let (provider, new_session) = provider(id);
    let bridge = SessionBridge::with_config(provider, config);
    PROVIDER_SINKS.lock().insert(
        id,
        ProviderSink {
            notifier: bridge.notifier(),
            new_session,
        },
    );
    BRIDGE_REGISTRY.lock().insert(
        id,
        Arc::new(Mutex::new(BridgeEntry {
            bridge,
            listener: None,
        })),
    );
    log::info!("bridge {} registered", id);
    id
}

fn register_native(vtable: MediaBridgeProvider, config: BridgeConfig) -> i64 {
    register_bridge(config, |bridge_id| {
        let factory: SessionFactory = Arc::new(move || {
            Box::new(NativeSession { vtable, bridge_id }) as Box<dyn SessionHandle>
        });
        (Box::new(NativeProvider { vtable, bridge_id }), factory)
    })
}

pub(crate) fn release_bridge(id: i64) -> Result<()> {
    PROVIDER_SINKS.lock().remove(&id);
    // Dropping the last reference disconnects the bridge
    let entry = BRIDGE_REGISTRY.lock().remove(&id);
    match entry {
        Some(_) => {
            log::info!("bridge {} released", id);
            Ok(())
        }
        None => Err(BridgeError::InvalidHandle),
    }
}

fn bridge_entry(id: i64) -> Result<Arc<Mutex<BridgeEntry>>> {
    BRIDGE_REGISTRY
        .lock()
        .get(&id)
        .cloned()
        .ok_or(BridgeError::InvalidHandle)
}

pub(crate) fn with_bridge_mut<R>(id: i64, f: impl FnOnce(&mut SessionBridge) -> Result<R>) -> Result<R> {
    let entry = bridge_entry(id)?;
    let mut entry = entry.lock();
    f(&mut entry.bridge)
}

pub(crate) fn with_bridge<R>(id: i64, f: impl FnOnce(&SessionBridge) -> Result<R>) -> Result<R> {
    let entry = bridge_entry(id)?;
    let entry = entry.lock();
    f(&entry.bridge)
}

/// Replace the bridge's foreign listener (`None` removes it)
pub(crate) fn set_listener(id: i64, listener: Option<Arc<dyn BridgeListener>>) -> Result<()> {
    let entry = bridge_entry(id)?;
    let mut guard = entry.lock();
    let entry = &mut *guard;
    if let Some(previous) = entry.listener.take() {
        entry.bridge.remove_listener(previous);
    }
    entry.listener = listener.map(|l| entry.bridge.add_listener(l));
    Ok(())
}

fn provider_sink(id: i64) -> Result<ProviderSink> {
    PROVIDER_SINKS
        .lock()
        .get(&id)
        .cloned()
        .ok_or(BridgeError::InvalidHandle)
}

pub(crate) fn provider_events(id: i64, ticket: i64) -> Result<(ProviderEvents, SessionFactory)> {
    let sink = provider_sink(id)?;
    Ok((sink.notifier.for_ticket(generation_from(ticket)?), sink.new_session))
}

pub(crate) fn metadata_json(id: i64) -> Result<String> {
    with_bridge(id, |b| {
        let json = match b.metadata() {
            Some(metadata) => serde_json::to_string(metadata.as_ref()),
            None => Ok("{}".to_string()),
        };
        json.map_err(|e| BridgeError::InvalidArgument(e.to_string()))
    })
}

pub(crate) fn to_code(result: Result<()>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) => {
            log::error!("FFI error: {}", err);
            -1
        }
    }
}

unsafe fn read_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(BridgeError::InvalidArgument(format!("{} is null", what)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| BridgeError::InvalidArgument(format!("{} is not UTF-8", what)))
}

unsafe fn read_opt_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(str::to_string)
}

// -------------------------------
// C ABI: presentation side
// -------------------------------

/// Create a bridge over a native provider. Returns the handle, or -1.
#[no_mangle]
pub extern "C" fn mediabridge_create(provider: *const MediaBridgeProvider) -> i64 {
    if provider.is_null() {
        return -1;
    }
    let vtable = unsafe { *provider };
    register_native(vtable, BridgeConfig::default())
}

/// Same as `mediabridge_create`, with a TOML configuration string
#[no_mangle]
pub extern "C" fn mediabridge_create_with_config(
    provider: *const MediaBridgeProvider,
    config_toml: *const c_char,
) -> i64 {
    if provider.is_null() {
        return -1;
    }
    let config = unsafe { read_str(config_toml, "config") }.and_then(BridgeConfig::from_toml_str);
    match config {
        Ok(config) => register_native(unsafe { *provider }, config),
        Err(err) => {
            init_logging();
            log::error!("Failed to create bridge: {}", err);
            -1
        }
    }
}

#[no_mangle]
pub extern "C" fn mediabridge_release(bridge_id: i64) -> i32 {
    to_code(release_bridge(bridge_id))
}

#[no_mangle]
pub extern "C" fn mediabridge_set_listener(
    bridge_id: i64,
    callback: Option<MediaBridgeListenerFn>,
    context: *mut c_void,
) -> i32 {
    let listener = callback.map(|callback| {
        Arc::new(NativeListener { callback, context }) as Arc<dyn BridgeListener>
    });
    to_code(set_listener(bridge_id, listener))
}

#[no_mangle]
pub extern "C" fn mediabridge_on_start(bridge_id: i64) -> i32 {
    to_code(with_bridge_mut(bridge_id, |b| b.on_become_visible()))
}

#[no_mangle]
pub extern "C" fn mediabridge_on_stop(bridge_id: i64) -> i32 {
    to_code(with_bridge_mut(bridge_id, |b| {
        b.on_become_hidden();
        Ok(())
    }))
}

#[no_mangle]
pub extern "C" fn mediabridge_play(bridge_id: i64) -> i32 {
    to_code(with_bridge_mut(bridge_id, |b| b.play()))
}

#[no_mangle]
pub extern "C" fn mediabridge_pause(bridge_id: i64) -> i32 {
    to_code(with_bridge_mut(bridge_id, |b| b.pause()))
}

#[no_mangle]
pub extern "C" fn mediabridge_skip_next(bridge_id: i64) -> i32 {
    to_code(with_bridge_mut(bridge_id, |b| b.skip_next()))
}

#[no_mangle]
pub extern "C" fn mediabridge_skip_previous(bridge_id: i64) -> i32 {
    to_code(with_bridge_mut(bridge_id, |b| b.skip_previous()))
}

#[no_mangle]
pub extern "C" fn mediabridge_toggle_play_pause(bridge_id: i64) -> i32 {
    to_code(with_bridge_mut(bridge_id, |b| b.toggle_play_pause()))
}

#[no_mangle]
pub extern "C" fn mediabridge_seek(bridge_id: i64, position_ms: i64) -> i32 {
    if position_ms < 0 {
        return -1;
    }
    to_code(with_bridge_mut(bridge_id, |b| b.seek_to(position_ms as u64)))
}

/// Apply queued provider notifications; returns how many, or -1.
/// Listener callbacks run inside this call (and inside `on_start`, `on_stop`
/// and `set_listener`); they may use other handles but must not call back
/// into the bridge that is notifying them.
#[no_mangle]
pub extern "C" fn mediabridge_dispatch(bridge_id: i64) -> i32 {
    match with_bridge_mut(bridge_id, |b| Ok(b.dispatch_pending())) {
        Ok(handled) => handled as i32,
        Err(err) => {
            log::error!("Failed to dispatch: {}", err);
            -1
        }
    }
}

#[no_mangle]
pub extern "C" fn mediabridge_get_connection_state(bridge_id: i64) -> i32 {
    match with_bridge(bridge_id, |b| Ok(b.current_state())) {
        Ok(state) => connection_state_code(state),
        Err(err) => {
            log::error!("Failed to get connection state: {}", err);
            -1
        }
    }
}

#[no_mangle]
pub extern "C" fn mediabridge_get_generation(bridge_id: i64) -> i64 {
    with_bridge(bridge_id, |b| Ok(b.current_generation() as i64)).unwrap_or(-1)
}

#[no_mangle]
pub extern "C" fn mediabridge_is_playing(bridge_id: i64) -> i32 {
    match with_bridge(bridge_id, |b| Ok(b.is_playing())) {
        Ok(playing) => playing as i32,
        Err(_) => -1,
    }
}

/// Estimated playback position in milliseconds, or -1 when unknown
#[no_mangle]
pub extern "C" fn mediabridge_get_position(bridge_id: i64) -> i64 {
    match with_bridge(bridge_id, |b| Ok(b.estimated_position())) {
        Ok(Some(position)) => position as i64,
        Ok(None) => -1,
        Err(err) => {
            log::error!("Failed to get position: {}", err);
            -1
        }
    }
}

/// Current track as JSON. Free with `mediabridge_string_free`.
#[no_mangle]
pub extern "C" fn mediabridge_get_metadata_json(bridge_id: i64) -> *mut c_char {
    match metadata_json(bridge_id) {
        Ok(json) => to_cstring(&json).into_raw(),
        Err(err) => {
            log::error!("Failed to get metadata: {}", err);
            ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "C" fn mediabridge_string_free(text: *mut c_char) {
    if !text.is_null() {
        drop(unsafe { CString::from_raw(text) });
    }
}

// -------------------------------
// C ABI: provider side (any thread)
// -------------------------------

#[no_mangle]
pub extern "C" fn mediabridge_provider_connected(bridge_id: i64, ticket: i64) -> i32 {
    to_code(provider_events(bridge_id, ticket).map(|(events, new_session)| {
        events.connected(new_session());
    }))
}

#[no_mangle]
pub extern "C" fn mediabridge_provider_connection_failed(
    bridge_id: i64,
    ticket: i64,
    code: i32,
    reason: *const c_char,
) -> i32 {
    let detail = unsafe { read_opt_str(reason) }.unwrap_or_else(|| format!("code {}", code));
    let error = connect_error_with_reason(code, detail);
    to_code(provider_events(bridge_id, ticket).map(|(events, _)| events.connection_failed(error)))
}

#[no_mangle]
pub extern "C" fn mediabridge_provider_connection_lost(bridge_id: i64, ticket: i64) -> i32 {
    to_code(provider_events(bridge_id, ticket).map(|(events, _)| events.connection_lost()))
}

#[no_mangle]
pub extern "C" fn mediabridge_provider_state_changed(
    bridge_id: i64,
    ticket: i64,
    state: i32,
    position_ms: i64,
    playback_speed: f32,
) -> i32 {
    let result = playback_state_from_code(state).and_then(|state| {
        let status = PlaybackStatus::new(state, position_ms.max(0) as u64).with_speed(playback_speed);
        let (events, _) = provider_events(bridge_id, ticket)?;
        events.state_changed(status);
        Ok(())
    });
    to_code(result)
}

/// A null `media_id` reports "no metadata", which keeps the last known track
#[no_mangle]
pub extern "C" fn mediabridge_provider_metadata_changed(
    bridge_id: i64,
    ticket: i64,
    media_id: *const c_char,
    title: *const c_char,
    artist: *const c_char,
    artwork: *const c_char,
    duration_ms: i64,
) -> i32 {
    let metadata = unsafe { read_opt_str(media_id) }.map(|media_id| {
        let mut metadata = TrackMetadata::new(
            media_id,
            unsafe { read_opt_str(title) }.unwrap_or_default(),
            unsafe { read_opt_str(artist) }.unwrap_or_default(),
        );
        metadata.artwork_ref = unsafe { read_opt_str(artwork) };
        metadata.duration_ms = u64::try_from(duration_ms).ok();
        metadata
    });
    to_code(provider_events(bridge_id, ticket).map(|(events, _)| events.metadata_changed(metadata)))
}
