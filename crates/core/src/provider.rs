// Session provider seam: what the bridge asks of the platform media
// framework, and how the framework reports back.

use crate::error::{ConnectError, Result};
use crate::state::{Generation, PlaybackStatus, TrackMetadata};
use crossbeam_channel::Sender;

/// Transport verbs forwarded to a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Play,
    Pause,
    SkipNext,
    SkipPrevious,
    SeekTo(u64),
}

/// Connection-level access to the platform media framework.
///
/// `connect` starts an asynchronous connection; the outcome is reported
/// through the supplied [`ProviderEvents`], possibly from another thread.
pub trait SessionProvider: Send {
    /// Begin connecting. Returning an error means the attempt was refused
    /// up front and no event will follow.
    fn connect(&mut self, events: ProviderEvents) -> std::result::Result<(), ConnectError>;

    /// Tear down any connection, established or pending. Must not block.
    fn disconnect(&mut self);
}

/// A live session handed over by the provider once connected.
/// Dropping it releases the session.
pub trait SessionHandle: Send {
    fn send(&mut self, command: TransportCommand) -> Result<()>;

    /// State and metadata the session already holds at connect time
    fn initial_status(&self) -> Option<PlaybackStatus> {
        None
    }

    fn initial_metadata(&self) -> Option<TrackMetadata> {
        None
    }
}

/// Inbound provider notification
pub enum ProviderEvent {
    Connected(Box<dyn SessionHandle>),
    ConnectionFailed(ConnectError),
    ConnectionLost,
    StateChanged(PlaybackStatus),
    MetadataChanged(Option<TrackMetadata>),
}

impl std::fmt::Debug for ProviderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderEvent::Connected(_) => write!(f, "Connected"),
            ProviderEvent::ConnectionFailed(err) => write!(f, "ConnectionFailed({})", err),
            ProviderEvent::ConnectionLost => write!(f, "ConnectionLost"),
            ProviderEvent::StateChanged(status) => write!(f, "StateChanged({:?})", status.state),
            ProviderEvent::MetadataChanged(Some(meta)) => {
                write!(f, "MetadataChanged({})", meta.media_id)
            }
            ProviderEvent::MetadataChanged(None) => write!(f, "MetadataChanged(None)"),
        }
    }
}

/// A provider event tagged with the generation it belongs to
#[derive(Debug)]
pub struct Notification {
    pub generation: Generation,
    pub event: ProviderEvent,
}

/// Raw, thread-safe sender into a bridge's inbox.
/// Callers pick the generation tag themselves.
#[derive(Clone)]
pub struct Notifier {
    tx: Sender<Notification>,
}

impl Notifier {
    pub(crate) fn new(tx: Sender<Notification>) -> Self {
        Self { tx }
    }

    pub fn post(&self, generation: Generation, event: ProviderEvent) {
        if let Err(err) = self.tx.send(Notification { generation, event }) {
            log::debug!("bridge inbox closed, dropping {:?}", err.into_inner().event);
        }
    }

    /// Events handle for the connect attempt issued under `ticket`
    pub fn for_ticket(&self, ticket: Generation) -> ProviderEvents {
        ProviderEvents {
            notifier: self.clone(),
            ticket,
        }
    }
}

/// Reporting handle for one connect attempt.
///
/// The attempt outcome is tagged with the ticket (the generation current
/// when `connect` was called). Session events are tagged with the
/// generation the bridge moves to when it accepts the connection, so
/// anything sent after the bridge has moved on is discarded.
#[derive(Clone)]
pub struct ProviderEvents {
    notifier: Notifier,
    ticket: Generation,
}

impl ProviderEvents {
    pub fn ticket(&self) -> Generation {
        self.ticket
    }

    pub fn session_generation(&self) -> Generation {
        self.ticket + 1
    }

    pub fn connected(&self, session: Box<dyn SessionHandle>) {
        self.notifier.post(self.ticket, ProviderEvent::Connected(session));
    }

    pub fn connection_failed(&self, reason: ConnectError) {
        self.notifier
            .post(self.ticket, ProviderEvent::ConnectionFailed(reason));
    }

    pub fn connection_lost(&self) {
        self.notifier
            .post(self.session_generation(), ProviderEvent::ConnectionLost);
    }

    pub fn state_changed(&self, status: PlaybackStatus) {
        self.notifier
            .post(self.session_generation(), ProviderEvent::StateChanged(status));
    }

    pub fn metadata_changed(&self, metadata: Option<TrackMetadata>) {
        self.notifier
            .post(self.session_generation(), ProviderEvent::MetadataChanged(metadata));
    }
}
