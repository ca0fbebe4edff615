// SessionBridge: the façade a presentation layer drives.
// Combines the connection, the observer and transport access, and applies
// provider notifications on the owner's context.

use crate::callback::{BridgeEvent, BridgeListener, ListenerId, ListenerRegistry};
use crate::config::{BridgeConfig, PendingCommandPolicy};
use crate::connection::SessionConnection;
use crate::error::{BridgeError, Result};
use crate::observer::PlaybackObserver;
use crate::provider::{Notification, Notifier, ProviderEvent, SessionProvider, TransportCommand};
use crate::state::{ConnectionState, Generation, PlaybackStatus, Snapshot, TrackMetadata};
use crossbeam_channel::Receiver;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct SessionBridge {
    config: BridgeConfig,
    connection: SessionConnection,
    observer: PlaybackObserver,
    pending: Option<TransportCommand>,
    notifier: Notifier,
    inbox: Receiver<Notification>,
}

impl SessionBridge {
    pub fn new(provider: Box<dyn SessionProvider>) -> Self {
        Self::with_config(provider, BridgeConfig::default())
    }

    pub fn with_config(provider: Box<dyn SessionProvider>, config: BridgeConfig) -> Self {
        let (tx, inbox) = crossbeam_channel::unbounded();
        let notifier = Notifier::new(tx);
        let listeners = ListenerRegistry::new(config.position_throttle_ms);
        Self {
            connection: SessionConnection::new(provider, notifier.clone()),
            observer: PlaybackObserver::new(listeners),
            pending: None,
            notifier,
            inbox,
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Start connecting. No-op while already connecting or connected.
    pub fn connect(&mut self) -> Result<()> {
        let old_state = self.connection.current_state();
        let result = self.connection.connect();
        self.emit_transition(old_state);

        if let Err(reason) = result {
            self.observer.notify(BridgeEvent::ConnectionFailed {
                reason: reason.clone(),
            });
            return Err(BridgeError::Connect(reason));
        }
        Ok(())
    }

    /// Drop the connection. Notifications still in flight become stale.
    pub fn disconnect(&mut self) {
        let old_state = self.connection.current_state();
        if !self.connection.disconnect() {
            return;
        }
        self.pending = None;
        if old_state == ConnectionState::Connected {
            self.leave_connected();
        }
        self.emit_transition(old_state);
    }

    /// Tear down any existing connection, then connect afresh
    pub fn reconnect(&mut self) -> Result<()> {
        self.disconnect();
        self.connect()
    }

    pub fn on_become_visible(&mut self) -> Result<()> {
        log::info!("[bridge] presentation visible");
        self.connect()
    }

    pub fn on_become_hidden(&mut self) {
        log::info!("[bridge] presentation hidden");
        self.disconnect();
    }

    /// Connect and return a guard that disconnects when dropped
    pub fn enter_foreground(&mut self) -> Result<ForegroundScope<'_>> {
        self.on_become_visible()?;
        Ok(ForegroundScope { bridge: self })
    }

    pub fn current_state(&self) -> ConnectionState {
        self.connection.current_state()
    }

    pub fn current_generation(&self) -> Generation {
        self.connection.generation()
    }

    // ---------------------------------------------------------------------
    // Provider notifications
    // ---------------------------------------------------------------------

    /// Thread-safe handle for posting provider notifications into this bridge
    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Apply every queued provider notification. Never blocks.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(notification) = self.inbox.try_recv() {
            self.handle(notification);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for a notification, then drain the queue
    pub fn dispatch_timeout(&mut self, timeout: Duration) -> usize {
        match self.inbox.recv_timeout(timeout) {
            Ok(notification) => {
                self.handle(notification);
                1 + self.dispatch_pending()
            }
            Err(_) => 0,
        }
    }

    /// Apply one notification on the owner's context
    pub fn handle(&mut self, notification: Notification) {
        let Notification { generation, event } = notification;
        match event {
            ProviderEvent::Connected(session) => {
                let old_state = self.connection.current_state();
                let Some(current) = self.connection.accept_established(generation, session) else {
                    return;
                };
                if let Some(session) = self.connection.session() {
                    let status = session.initial_status();
                    let metadata = session.initial_metadata();
                    self.observer.seed(status, metadata);
                }
                self.observer.attach(current);
                self.emit_transition(old_state);
                self.observer.resync_all();
                self.replay_pending();
            }
            ProviderEvent::ConnectionFailed(reason) => {
                let old_state = self.connection.current_state();
                if self.connection.accept_failure(generation, &reason) {
                    self.pending = None;
                    self.emit_transition(old_state);
                    self.observer.notify(BridgeEvent::ConnectionFailed { reason });
                }
            }
            ProviderEvent::ConnectionLost => {
                let old_state = self.connection.current_state();
                if self.connection.connection_lost(generation) {
                    self.pending = None;
                    self.leave_connected();
                    self.observer.notify(BridgeEvent::ConnectionLost);
                    self.emit_transition(old_state);
                }
            }
            ProviderEvent::StateChanged(status) => {
                self.on_state_changed(generation, status);
            }
            ProviderEvent::MetadataChanged(metadata) => {
                self.on_metadata_changed(generation, metadata);
            }
        }
    }

    pub fn on_state_changed(&mut self, generation: Generation, status: PlaybackStatus) -> bool {
        self.observer.on_state_changed(generation, status)
    }

    pub fn on_metadata_changed(
        &mut self,
        generation: Generation,
        metadata: Option<TrackMetadata>,
    ) -> bool {
        self.observer.on_metadata_changed(generation, metadata)
    }

    // ---------------------------------------------------------------------
    // Listeners and cached state
    // ---------------------------------------------------------------------

    /// Register a listener; while connected it gets an immediate resync
    pub fn add_listener(&mut self, listener: Arc<dyn BridgeListener>) -> ListenerId {
        self.observer.add_listener(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.observer.remove_listener(id)
    }

    /// Shared registry handle, usable from inside listener callbacks
    pub fn listeners(&self) -> ListenerRegistry {
        self.observer.listeners().clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.observer.snapshot()
    }

    pub fn playback_status(&self) -> Option<&PlaybackStatus> {
        self.observer.status()
    }

    pub fn metadata(&self) -> Option<&Arc<TrackMetadata>> {
        self.observer.metadata()
    }

    pub fn is_playing(&self) -> bool {
        self.observer.is_playing()
    }

    /// Position extrapolated to now, for progress displays.
    /// Without a live session the last reported position is returned as is.
    pub fn estimated_position(&self) -> Option<u64> {
        let status = self.observer.status()?;
        if self.current_state() != ConnectionState::Connected {
            return Some(status.position_ms);
        }
        let duration = self.observer.metadata().and_then(|m| m.duration_ms);
        Some(status.estimated_position(Instant::now(), duration))
    }

    /// Forget the cached status and metadata
    pub fn reset_snapshot(&mut self) {
        self.observer.reset();
    }

    // ---------------------------------------------------------------------
    // Transport
    // ---------------------------------------------------------------------

    pub fn play(&mut self) -> Result<()> {
        self.command(TransportCommand::Play)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.command(TransportCommand::Pause)
    }

    pub fn skip_next(&mut self) -> Result<()> {
        self.command(TransportCommand::SkipNext)
    }

    pub fn skip_previous(&mut self) -> Result<()> {
        self.command(TransportCommand::SkipPrevious)
    }

    pub fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.command(TransportCommand::SeekTo(position_ms))
    }

    /// Pause when playing, play otherwise
    pub fn toggle_play_pause(&mut self) -> Result<()> {
        if self.is_playing() {
            self.pause()
        } else {
            self.play()
        }
    }

    pub fn command(&mut self, command: TransportCommand) -> Result<()> {
        match self.connection.transport() {
            Ok(mut sink) => sink.send(command),
            Err(err) => {
                if let BridgeError::NotConnected {
                    state: ConnectionState::Connecting,
                } = err
                {
                    if self.config.pending_commands == PendingCommandPolicy::ReplayLatest {
                        log::debug!("[bridge] holding {:?} until connected", command);
                        self.pending = Some(command);
                    }
                }
                log::debug!("[bridge] rejected {:?}: {}", command, err);
                Err(err)
            }
        }
    }

    fn replay_pending(&mut self) {
        let Some(command) = self.pending.take() else {
            return;
        };
        log::info!("[bridge] replaying {:?}", command);
        if let Err(err) = self.connection.transport().and_then(|mut sink| sink.send(command)) {
            log::warn!("[bridge] replay of {:?} failed: {}", command, err);
        }
    }

    fn leave_connected(&mut self) {
        self.observer.detach();
        if self.config.clear_on_disconnect {
            self.observer.reset();
        }
    }

    fn emit_transition(&self, old_state: ConnectionState) {
        let new_state = self.connection.current_state();
        if old_state != new_state {
            log::info!("[bridge] {:?} -> {:?}", old_state, new_state);
            self.observer.notify(BridgeEvent::ConnectionStateChanged {
                old_state,
                new_state,
            });
        }
    }
}

impl Drop for SessionBridge {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}

/// Foreground lifetime of a presentation surface.
/// Disconnects the bridge when dropped, on every exit path.
pub struct ForegroundScope<'a> {
    bridge: &'a mut SessionBridge,
}

impl Deref for ForegroundScope<'_> {
    type Target = SessionBridge;

    fn deref(&self) -> &SessionBridge {
        self.bridge
    }
}

impl DerefMut for ForegroundScope<'_> {
    fn deref_mut(&mut self) -> &mut SessionBridge {
        self.bridge
    }
}

impl Drop for ForegroundScope<'_> {
    fn drop(&mut self) {
        self.bridge.on_become_hidden();
    }
}
