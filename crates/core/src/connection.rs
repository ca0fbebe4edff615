// Connection lifecycle to the session provider

use crate::error::{BridgeError, ConnectError, Result};
use crate::provider::{Notifier, SessionHandle, SessionProvider};
use crate::state::{ConnectionState, Generation};
use crate::transport::TransportSink;

/// Owns the provider and at most one live session.
///
/// State changes happen only through the methods below, all called from the
/// bridge owner's context. Every transition out of `Connecting` or
/// `Connected` bumps the generation.
pub struct SessionConnection {
    provider: Box<dyn SessionProvider>,
    notifier: Notifier,
    state: ConnectionState,
    generation: Generation,
    session: Option<Box<dyn SessionHandle>>,
}

impl SessionConnection {
    pub fn new(provider: Box<dyn SessionProvider>, notifier: Notifier) -> Self {
        Self {
            provider,
            notifier,
            state: ConnectionState::Disconnected,
            generation: 0,
            session: None,
        }
    }

    pub fn current_state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Start connecting.
    ///
    /// Returns `Ok(false)` without side effects when already connecting or
    /// connected. A synchronous refusal from the provider leaves the
    /// connection in `Failed`.
    pub fn connect(&mut self) -> std::result::Result<bool, ConnectError> {
        if self.state.is_active() {
            log::debug!("[connection] connect ignored, already {:?}", self.state);
            return Ok(false);
        }

        let ticket = self.generation;
        log::info!("[connection] connecting (ticket {})", ticket);
        self.state = ConnectionState::Connecting;

        if let Err(err) = self.provider.connect(self.notifier.for_ticket(ticket)) {
            log::warn!("[connection] provider refused connect: {}", err);
            self.state = ConnectionState::Failed;
            self.generation += 1;
            return Err(err);
        }
        Ok(true)
    }

    /// Drop the connection locally and ask the provider to tear down.
    /// Returns whether the state changed.
    pub fn disconnect(&mut self) -> bool {
        match self.state {
            ConnectionState::Disconnected => false,
            ConnectionState::Failed => {
                self.state = ConnectionState::Disconnected;
                true
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                log::info!("[connection] disconnecting from {:?}", self.state);
                self.session = None;
                self.provider.disconnect();
                self.state = ConnectionState::Disconnected;
                self.generation += 1;
                true
            }
        }
    }

    /// Accept a provider's report that the attempt under `ticket` succeeded.
    /// Returns the new session generation, or `None` if the report is stale
    /// (in which case the session is dropped unused).
    pub fn accept_established(
        &mut self,
        ticket: Generation,
        session: Box<dyn SessionHandle>,
    ) -> Option<Generation> {
        if self.state != ConnectionState::Connecting || ticket != self.generation {
            log::debug!(
                "[connection] stale connect result (ticket {}, current {} {:?})",
                ticket,
                self.generation,
                self.state
            );
            return None;
        }

        self.generation += 1;
        self.session = Some(session);
        self.state = ConnectionState::Connected;
        log::info!("[connection] connected (generation {})", self.generation);
        Some(self.generation)
    }

    /// Accept a provider's report that the attempt under `ticket` failed
    pub fn accept_failure(&mut self, ticket: Generation, reason: &ConnectError) -> bool {
        if self.state != ConnectionState::Connecting || ticket != self.generation {
            log::debug!("[connection] stale connect failure (ticket {}): {}", ticket, reason);
            return false;
        }

        log::warn!("[connection] connect failed: {}", reason);
        self.state = ConnectionState::Failed;
        self.generation += 1;
        true
    }

    /// The provider dropped the live session of `generation`
    pub fn connection_lost(&mut self, generation: Generation) -> bool {
        if self.state != ConnectionState::Connected || generation != self.generation {
            log::debug!("[connection] stale connection loss (generation {})", generation);
            return false;
        }

        log::warn!("[connection] connection lost (generation {})", generation);
        self.session = None;
        self.state = ConnectionState::Disconnected;
        self.generation += 1;
        true
    }

    /// Transport capability for the live session.
    /// Fails with `NotConnected` in every state but `Connected`.
    pub fn transport(&mut self) -> Result<TransportSink<'_>> {
        let generation = self.generation;
        match (self.state, self.session.as_mut()) {
            (ConnectionState::Connected, Some(session)) => Ok(TransportSink::new(session, generation)),
            (state, _) => Err(BridgeError::NotConnected { state }),
        }
    }

    pub(crate) fn session(&self) -> Option<&dyn SessionHandle> {
        self.session.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Notification, ProviderEvents, TransportCommand};
    use crossbeam_channel::Receiver;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Calls {
        connects: Vec<Generation>,
        disconnects: usize,
        commands: Vec<TransportCommand>,
    }

    struct FakeProvider {
        calls: Arc<Mutex<Calls>>,
        refuse: bool,
    }

    impl SessionProvider for FakeProvider {
        fn connect(&mut self, events: ProviderEvents) -> std::result::Result<(), ConnectError> {
            self.calls.lock().connects.push(events.ticket());
            if self.refuse {
                return Err(ConnectError::PermissionDenied("test".into()));
            }
            Ok(())
        }

        fn disconnect(&mut self) {
            self.calls.lock().disconnects += 1;
        }
    }

    struct FakeSession {
        calls: Arc<Mutex<Calls>>,
    }

    impl SessionHandle for FakeSession {
        fn send(&mut self, command: TransportCommand) -> Result<()> {
            self.calls.lock().commands.push(command);
            Ok(())
        }
    }

    fn setup(refuse: bool) -> (SessionConnection, Arc<Mutex<Calls>>, Receiver<Notification>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (tx, rx) = crossbeam_channel::unbounded();
        let provider = FakeProvider {
            calls: calls.clone(),
            refuse,
        };
        (SessionConnection::new(Box::new(provider), Notifier::new(tx)), calls, rx)
    }

    fn session(calls: &Arc<Mutex<Calls>>) -> Box<dyn SessionHandle> {
        Box::new(FakeSession {
            calls: calls.clone(),
        })
    }

    #[test]
    fn test_connect_is_idempotent_while_active() {
        let (mut conn, calls, _rx) = setup(false);

        assert_eq!(conn.connect(), Ok(true));
        assert_eq!(conn.connect(), Ok(false));
        assert_eq!(conn.current_state(), ConnectionState::Connecting);

        assert_eq!(conn.accept_established(0, session(&calls)), Some(1));
        assert_eq!(conn.connect(), Ok(false));
        assert_eq!(calls.lock().connects, vec![0]);
    }

    #[test]
    fn test_disconnect_during_connect_discards_late_success() {
        let (mut conn, calls, _rx) = setup(false);

        conn.connect().unwrap();
        assert!(conn.disconnect());
        assert_eq!(conn.generation(), 1);

        assert_eq!(conn.accept_established(0, session(&calls)), None);
        assert_eq!(conn.current_state(), ConnectionState::Disconnected);
        assert_eq!(calls.lock().disconnects, 1);
    }

    #[test]
    fn test_refused_connect_lands_in_failed() {
        let (mut conn, _calls, _rx) = setup(true);

        let err = conn.connect().unwrap_err();
        assert!(matches!(err, ConnectError::PermissionDenied(_)));
        assert_eq!(conn.current_state(), ConnectionState::Failed);

        // retry is allowed from Failed
        assert!(conn.connect().is_err());
        assert_eq!(conn.generation(), 2);
    }

    #[test]
    fn test_reported_failure_then_disconnect() {
        let (mut conn, _calls, _rx) = setup(false);

        conn.connect().unwrap();
        let reason = ConnectError::ProviderUnavailable("gone".into());
        assert!(conn.accept_failure(0, &reason));
        assert!(!conn.accept_failure(0, &reason));
        assert_eq!(conn.current_state(), ConnectionState::Failed);

        assert!(conn.disconnect());
        assert_eq!(conn.current_state(), ConnectionState::Disconnected);
        assert!(!conn.disconnect());
    }

    #[test]
    fn test_transport_requires_connected() {
        let (mut conn, calls, _rx) = setup(false);

        let err = conn.transport().err().unwrap();
        assert_eq!(
            err,
            BridgeError::NotConnected {
                state: ConnectionState::Disconnected
            }
        );

        conn.connect().unwrap();
        assert!(conn.transport().is_err());

        conn.accept_established(0, session(&calls)).unwrap();
        conn.transport().unwrap().play().unwrap();
        conn.transport().unwrap().seek_to(42).unwrap();

        conn.disconnect();
        assert!(conn.transport().is_err());
        assert_eq!(
            calls.lock().commands,
            vec![TransportCommand::Play, TransportCommand::SeekTo(42)]
        );
    }

    #[test]
    fn test_connection_loss_checks_generation() {
        let (mut conn, calls, _rx) = setup(false);

        conn.connect().unwrap();
        conn.accept_established(0, session(&calls)).unwrap();

        assert!(!conn.connection_lost(0));
        assert!(conn.connection_lost(1));
        assert_eq!(conn.current_state(), ConnectionState::Disconnected);
        assert_eq!(conn.generation(), 2);
    }
}
