// Transport command capability, only obtainable while connected

use crate::error::Result;
use crate::provider::{SessionHandle, TransportCommand};
use crate::state::Generation;

/// Borrowed capability for issuing transport commands to the live session.
///
/// Handed out by [`SessionConnection::transport`](crate::SessionConnection::transport)
/// only in the `Connected` state; the borrow ends before the connection can
/// change, so a sink can never reach a superseded session.
pub struct TransportSink<'a> {
    session: &'a mut Box<dyn SessionHandle>,
    generation: Generation,
}

impl<'a> TransportSink<'a> {
    pub(crate) fn new(session: &'a mut Box<dyn SessionHandle>, generation: Generation) -> Self {
        Self {
            session,
            generation,
        }
    }

    /// Generation of the session this sink talks to
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn send(&mut self, command: TransportCommand) -> Result<()> {
        log::debug!("[transport] gen {} -> {:?}", self.generation, command);
        self.session.send(command)
    }

    pub fn play(&mut self) -> Result<()> {
        self.send(TransportCommand::Play)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.send(TransportCommand::Pause)
    }

    pub fn skip_next(&mut self) -> Result<()> {
        self.send(TransportCommand::SkipNext)
    }

    pub fn skip_previous(&mut self) -> Result<()> {
        self.send(TransportCommand::SkipPrevious)
    }

    pub fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.send(TransportCommand::SeekTo(position_ms))
    }
}
