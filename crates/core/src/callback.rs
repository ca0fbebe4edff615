// Listener registry for bridge events
// Dispatch walks a snapshot of the registry so listeners may add or remove
// registrations from inside a callback without deadlocking or disturbing
// the pass in progress.

use crate::error::ConnectError;
use crate::state::{ConnectionState, PlaybackStatus, Snapshot, TrackMetadata};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Events delivered to the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Connection state changed
    ConnectionStateChanged {
        old_state: ConnectionState,
        new_state: ConnectionState,
    },

    /// Playback state (or speed) changed
    PlaybackStatusChanged { status: PlaybackStatus },

    /// Only the playback position moved
    PositionChanged {
        position_ms: u64,
        duration_ms: Option<u64>,
    },

    /// A new track snapshot replaced the previous one
    MetadataChanged { metadata: Arc<TrackMetadata> },

    /// Current cached snapshot, re-sent on connect and to late registrations
    Resync { snapshot: Snapshot },

    /// A connect attempt failed
    ConnectionFailed { reason: ConnectError },

    /// The provider dropped a live session
    ConnectionLost,
}

/// Bridge listener trait
/// Implementations should be lightweight and non-blocking
pub trait BridgeListener: Send + Sync {
    /// Called on the bridge owner's context for every event
    fn on_event(&self, event: &BridgeEvent);
}

/// Identity of a listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Throttled listener wrapper
/// Limits the rate of position-only updates; everything else passes through
pub struct ThrottledListener {
    inner: Arc<dyn BridgeListener>,
    last_position_update: Mutex<Option<Instant>>,
    position_update_interval: Duration,
}

impl ThrottledListener {
    pub fn new(listener: Arc<dyn BridgeListener>, update_interval_ms: u64) -> Self {
        Self {
            inner: listener,
            last_position_update: Mutex::new(None),
            position_update_interval: Duration::from_millis(update_interval_ms),
        }
    }

    pub fn dispatch(&self, event: &BridgeEvent) {
        match event {
            BridgeEvent::PositionChanged { .. } if !self.position_update_interval.is_zero() => {
                let mut last_update = self.last_position_update.lock();
                let due = last_update.map_or(true, |at| at.elapsed() >= self.position_update_interval);
                if due {
                    *last_update = Some(Instant::now());
                    drop(last_update);
                    self.inner.on_event(event);
                }
            }
            _ => self.inner.on_event(event),
        }
    }
}

struct Registration {
    id: ListenerId,
    listener: Arc<ThrottledListener>,
}

/// Shared listener registry.
/// Cloning yields another handle to the same set of registrations.
#[derive(Clone)]
pub struct ListenerRegistry {
    registrations: Arc<Mutex<Vec<Registration>>>,
    next_id: Arc<AtomicU64>,
    throttle_ms: u64,
}

impl ListenerRegistry {
    pub fn new(throttle_ms: u64) -> Self {
        Self {
            registrations: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            throttle_ms,
        }
    }

    pub(crate) fn add(&self, listener: Arc<dyn BridgeListener>) -> (ListenerId, Arc<ThrottledListener>) {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let throttled = Arc::new(ThrottledListener::new(listener, self.throttle_ms));
        self.registrations.lock().push(Registration {
            id,
            listener: throttled.clone(),
        });
        log::debug!("listener {:?} registered", id);
        (id, throttled)
    }

    /// Remove a registration. Takes effect from the next dispatch pass.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut registrations = self.registrations.lock();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        let removed = registrations.len() != before;
        if removed {
            log::debug!("listener {:?} removed", id);
        }
        removed
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.registrations.lock().iter().any(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.registrations.lock().clear();
    }

    pub fn dispatch(&self, event: &BridgeEvent) {
        let targets: Vec<Arc<ThrottledListener>> = self
            .registrations
            .lock()
            .iter()
            .map(|r| r.listener.clone())
            .collect();
        for listener in targets {
            listener.dispatch(event);
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Listener that records every event, for tests
#[cfg(test)]
pub(crate) struct RecordingListener {
    events: Mutex<Vec<BridgeEvent>>,
}

#[cfg(test)]
impl RecordingListener {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<BridgeEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[cfg(test)]
impl BridgeListener for RecordingListener {
    fn on_event(&self, event: &BridgeEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn position(ms: u64) -> BridgeEvent {
        BridgeEvent::PositionChanged {
            position_ms: ms,
            duration_ms: Some(10_000),
        }
    }

    #[test]
    fn test_throttled_position_updates() {
        let recorder = Arc::new(RecordingListener::new());
        let throttled = ThrottledListener::new(recorder.clone(), 100);

        for i in 0..10 {
            throttled.dispatch(&position(i * 100));
            thread::sleep(Duration::from_millis(10));
        }

        let events = recorder.events();
        assert!(!events.is_empty());
        assert!(events.len() < 10);
        assert_eq!(events[0], position(0));
    }

    #[test]
    fn test_non_position_events_not_throttled() {
        let recorder = Arc::new(RecordingListener::new());
        let throttled = ThrottledListener::new(recorder.clone(), 100);

        throttled.dispatch(&BridgeEvent::ConnectionLost);
        throttled.dispatch(&BridgeEvent::ConnectionLost);
        throttled.dispatch(&BridgeEvent::ConnectionStateChanged {
            old_state: ConnectionState::Connected,
            new_state: ConnectionState::Disconnected,
        });

        assert_eq!(recorder.events().len(), 3);
    }

    #[test]
    fn test_zero_interval_disables_throttling() {
        let recorder = Arc::new(RecordingListener::new());
        let throttled = ThrottledListener::new(recorder.clone(), 0);

        for i in 0..5 {
            throttled.dispatch(&position(i));
        }

        assert_eq!(recorder.events().len(), 5);
    }

    #[test]
    fn test_removed_listener_stops_receiving() {
        let registry = ListenerRegistry::default();
        let first = Arc::new(RecordingListener::new());
        let second = Arc::new(RecordingListener::new());
        let (first_id, _) = registry.add(first.clone());
        registry.add(second.clone());

        registry.dispatch(&BridgeEvent::ConnectionLost);
        assert!(registry.remove(first_id));
        assert!(!registry.remove(first_id));
        registry.dispatch(&BridgeEvent::ConnectionLost);

        assert_eq!(first.events().len(), 1);
        assert_eq!(second.events().len(), 2);
        assert_eq!(registry.len(), 1);
    }

    struct RemoveDuringDispatch {
        registry: ListenerRegistry,
        victim: Mutex<Option<ListenerId>>,
    }

    impl BridgeListener for RemoveDuringDispatch {
        fn on_event(&self, _event: &BridgeEvent) {
            if let Some(id) = self.victim.lock().take() {
                self.registry.remove(id);
            }
        }
    }

    #[test]
    fn test_removal_inside_callback_keeps_current_pass() {
        let registry = ListenerRegistry::default();
        let remover = Arc::new(RemoveDuringDispatch {
            registry: registry.clone(),
            victim: Mutex::new(None),
        });
        registry.add(remover.clone());
        let victim = Arc::new(RecordingListener::new());
        let (victim_id, _) = registry.add(victim.clone());
        *remover.victim.lock() = Some(victim_id);

        registry.dispatch(&BridgeEvent::ConnectionLost);
        registry.dispatch(&BridgeEvent::ConnectionLost);

        assert_eq!(victim.events().len(), 1);
        assert!(!registry.contains(victim_id));
    }
}
