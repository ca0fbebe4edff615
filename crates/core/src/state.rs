// Connection and playback state shared between the bridge and its listeners

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Monotonic connection generation.
/// Bumped on every accepted connect, failed connect, disconnect and
/// connection loss; notifications tagged with any other value are stale.
pub type Generation = u64;

/// State of the connection to the session provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    /// No connection and none requested
    Disconnected,
    /// Connect requested, waiting for the provider to answer
    Connecting,
    /// A live session is attached
    Connected,
    /// The last connect attempt failed; retry is up to the caller
    Failed,
}

impl ConnectionState {
    /// A connection is either being established or live
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

/// Playback state reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Buffering,
    Stopped,
    Error,
}

/// Playback status snapshot as last reported by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    /// Position at `last_updated_at`, in milliseconds
    pub position_ms: u64,
    /// Playback speed (1.0 = normal speed)
    pub playback_speed: f32,
    /// When the provider sampled `position_ms`
    pub last_updated_at: Instant,
}

impl PlaybackStatus {
    pub fn new(state: PlaybackState, position_ms: u64) -> Self {
        Self {
            state,
            position_ms,
            playback_speed: 1.0,
            last_updated_at: Instant::now(),
        }
    }

    pub fn with_speed(mut self, playback_speed: f32) -> Self {
        self.playback_speed = playback_speed;
        self
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Extrapolated position at `now`.
    /// Only advances while playing; clamped to `duration_ms` when known.
    pub fn estimated_position(&self, now: Instant, duration_ms: Option<u64>) -> u64 {
        let mut position = self.position_ms;
        if self.is_playing() && self.playback_speed > 0.0 {
            let elapsed = now.saturating_duration_since(self.last_updated_at).as_millis() as f64;
            position = position.saturating_add((elapsed * self.playback_speed as f64) as u64);
        }
        match duration_ms {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    /// Same state and speed, only the position moved
    pub(crate) fn is_position_update_of(&self, previous: &PlaybackStatus) -> bool {
        self.state == previous.state
            && self.playback_speed == previous.playback_speed
            && self.position_ms != previous.position_ms
    }
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self::new(PlaybackState::Idle, 0)
    }
}

/// Metadata of the current track.
/// Replaced as a whole; listeners never see a half-updated snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackMetadata {
    pub media_id: String,
    pub title: String,
    pub artist: String,
    /// Opaque artwork reference (URI or resource name) resolved by the presentation layer
    pub artwork_ref: Option<String>,
    pub duration_ms: Option<u64>,
}

impl TrackMetadata {
    pub fn new(
        media_id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
    ) -> Self {
        Self {
            media_id: media_id.into(),
            title: title.into(),
            artist: artist.into(),
            artwork_ref: None,
            duration_ms: None,
        }
    }

    pub fn with_artwork(mut self, artwork_ref: impl Into<String>) -> Self {
        self.artwork_ref = Some(artwork_ref.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Cached view of the session handed to listeners on resync
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub status: Option<PlaybackStatus>,
    pub metadata: Option<Arc<TrackMetadata>>,
}

impl Snapshot {
    pub fn is_playing(&self) -> bool {
        self.status.as_ref().is_some_and(PlaybackStatus::is_playing)
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.metadata.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_estimated_position_advances_only_while_playing() {
        let start = Instant::now();
        let mut status = PlaybackStatus::new(PlaybackState::Playing, 1_000);
        status.last_updated_at = start;

        let later = start + Duration::from_millis(500);
        assert_eq!(status.estimated_position(later, None), 1_500);

        status.state = PlaybackState::Paused;
        assert_eq!(status.estimated_position(later, None), 1_000);
    }

    #[test]
    fn test_estimated_position_uses_speed_and_clamps() {
        let start = Instant::now();
        let mut status = PlaybackStatus::new(PlaybackState::Playing, 0).with_speed(2.0);
        status.last_updated_at = start;

        let later = start + Duration::from_millis(1_000);
        assert_eq!(status.estimated_position(later, None), 2_000);
        assert_eq!(status.estimated_position(later, Some(1_200)), 1_200);
    }

    #[test]
    fn test_position_update_detection() {
        let base = PlaybackStatus::new(PlaybackState::Playing, 100);
        let moved = PlaybackStatus {
            position_ms: 200,
            ..base.clone()
        };
        let paused = PlaybackStatus {
            state: PlaybackState::Paused,
            ..moved.clone()
        };

        assert!(moved.is_position_update_of(&base));
        assert!(!paused.is_position_update_of(&moved));
        assert!(!base.is_position_update_of(&base));
    }

    #[test]
    fn test_connection_state_activity() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
        assert!(!ConnectionState::Failed.is_active());
        assert!(!ConnectionState::Disconnected.is_active());
    }
}
