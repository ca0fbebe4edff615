// Playback observer: caches the session's state and metadata and fans
// notifications out to listeners.

use crate::callback::{BridgeEvent, BridgeListener, ListenerId, ListenerRegistry};
use crate::state::{Generation, PlaybackStatus, Snapshot, TrackMetadata};
use std::sync::Arc;

pub struct PlaybackObserver {
    /// Generation of the attached session, `None` while detached
    active: Option<Generation>,
    status: Option<PlaybackStatus>,
    metadata: Option<Arc<TrackMetadata>>,
    listeners: ListenerRegistry,
}

impl PlaybackObserver {
    pub fn new(listeners: ListenerRegistry) -> Self {
        Self {
            active: None,
            status: None,
            metadata: None,
            listeners,
        }
    }

    /// Start accepting notifications for `generation`
    pub fn attach(&mut self, generation: Generation) {
        log::debug!("[observer] attached to generation {}", generation);
        self.active = Some(generation);
    }

    /// Stop accepting notifications. Cached values stay readable.
    pub fn detach(&mut self) {
        if let Some(generation) = self.active.take() {
            log::debug!("[observer] detached from generation {}", generation);
        }
    }

    pub fn active_generation(&self) -> Option<Generation> {
        self.active
    }

    fn accepts(&self, generation: Generation, what: &str) -> bool {
        if self.active == Some(generation) {
            return true;
        }
        log::trace!(
            "[observer] discarding stale {} (generation {}, active {:?})",
            what,
            generation,
            self.active
        );
        false
    }

    /// Apply a state report. Returns whether it was accepted.
    pub fn on_state_changed(&mut self, generation: Generation, status: PlaybackStatus) -> bool {
        if !self.accepts(generation, "state") {
            return false;
        }

        let position_only = self
            .status
            .as_ref()
            .is_some_and(|previous| status.is_position_update_of(previous));
        let event = if position_only {
            BridgeEvent::PositionChanged {
                position_ms: status.position_ms,
                duration_ms: self.metadata.as_ref().and_then(|m| m.duration_ms),
            }
        } else {
            log::debug!("[observer] playback state -> {:?}", status.state);
            BridgeEvent::PlaybackStatusChanged {
                status: status.clone(),
            }
        };
        self.status = Some(status);
        self.listeners.dispatch(&event);
        true
    }

    /// Apply a metadata report. `None` keeps the last known track.
    pub fn on_metadata_changed(
        &mut self,
        generation: Generation,
        metadata: Option<TrackMetadata>,
    ) -> bool {
        if !self.accepts(generation, "metadata") {
            return false;
        }
        let Some(metadata) = metadata else {
            log::debug!("[observer] empty metadata update ignored");
            return true;
        };

        log::debug!("[observer] metadata -> {} ({})", metadata.title, metadata.media_id);
        let metadata = Arc::new(metadata);
        self.metadata = Some(metadata.clone());
        self.listeners.dispatch(&BridgeEvent::MetadataChanged { metadata });
        true
    }

    /// Seed the cache from what the session reported at connect time
    pub fn seed(&mut self, status: Option<PlaybackStatus>, metadata: Option<TrackMetadata>) {
        if let Some(status) = status {
            self.status = Some(status);
        }
        if let Some(metadata) = metadata {
            self.metadata = Some(Arc::new(metadata));
        }
    }

    /// Register a listener. While attached, it immediately gets a resync.
    pub fn add_listener(&mut self, listener: Arc<dyn BridgeListener>) -> ListenerId {
        let (id, registered) = self.listeners.add(listener);
        if self.active.is_some() {
            registered.dispatch(&BridgeEvent::Resync {
                snapshot: self.snapshot(),
            });
        }
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Re-send the cached snapshot to every listener
    pub fn resync_all(&self) {
        self.listeners.dispatch(&BridgeEvent::Resync {
            snapshot: self.snapshot(),
        });
    }

    pub fn notify(&self, event: BridgeEvent) {
        self.listeners.dispatch(&event);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status.clone(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn status(&self) -> Option<&PlaybackStatus> {
        self.status.as_ref()
    }

    pub fn metadata(&self) -> Option<&Arc<TrackMetadata>> {
        self.metadata.as_ref()
    }

    /// Derived from the cached status on every call
    pub fn is_playing(&self) -> bool {
        self.status.as_ref().is_some_and(PlaybackStatus::is_playing)
    }

    /// Forget the cached status and metadata
    pub fn reset(&mut self) {
        self.status = None;
        self.metadata = None;
    }
}
