// Core of the media session bridge: connection lifecycle, playback
// observation and transport control over an external session provider

pub mod bridge;
pub mod callback;
pub mod config;
pub mod connection;
pub mod error;
pub mod observer;
pub mod provider;
pub mod state;
pub mod transport;

// Re-export commonly used types
pub use bridge::{ForegroundScope, SessionBridge};
pub use callback::{BridgeEvent, BridgeListener, ListenerId, ListenerRegistry};
pub use config::{BridgeConfig, PendingCommandPolicy};
pub use connection::SessionConnection;
pub use error::{BridgeError, ConnectError, Result};
pub use observer::PlaybackObserver;
pub use provider::{
    Notification, Notifier, ProviderEvent, ProviderEvents, SessionHandle, SessionProvider,
    TransportCommand,
};
pub use state::{
    ConnectionState, Generation, PlaybackState, PlaybackStatus, Snapshot, TrackMetadata,
};
pub use transport::TransportSink;
