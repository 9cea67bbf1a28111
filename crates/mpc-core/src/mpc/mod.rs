//! MPC coordination utilities
//!
//! A [`LocalProtocolEngine`] is one party's protocol state machine. The
//! [`Orchestrator`] owns a set of them, feeds each one its inbound messages
//! and collects what they emit through their [`Outbox`].

use crate::{PartyIdentity, PeerContext, ProtocolMessage, Result};
use tokio::sync::mpsc;
use tracing::debug;

mod orchestrator;

pub use orchestrator::{Completion, Orchestrator, RunState};

/// One party's protocol state machine
///
/// The orchestrator calls `start` once and then `update` for every inbound
/// message, always from the same worker, so an engine never sees two calls
/// at the same time. Outgoing messages and the single terminal result are
/// emitted through the outbox; a returned error fails the run.
pub trait LocalProtocolEngine: Send + 'static {
    /// Terminal success payload
    type Output: Send + 'static;

    /// The party this engine acts for
    fn identity(&self) -> &PartyIdentity;

    /// The peer context the engine was constructed against
    fn peer_context(&self) -> &PeerContext;

    /// Begin execution
    fn start(&mut self, outbox: &Outbox<Self::Output>) -> Result<()>;

    /// Feed one inbound message
    fn update(&mut self, message: &ProtocolMessage, outbox: &Outbox<Self::Output>) -> Result<()>;
}

/// Sending half handed to an engine
///
/// Messages are stamped with the owning party as sender. Sends after the run
/// has been torn down are dropped.
pub struct Outbox<O> {
    me: PartyIdentity,
    messages: mpsc::UnboundedSender<ProtocolMessage>,
    completions: mpsc::UnboundedSender<(PartyIdentity, O)>,
}

impl<O> Outbox<O> {
    pub(crate) fn new(
        me: PartyIdentity,
        messages: mpsc::UnboundedSender<ProtocolMessage>,
        completions: mpsc::UnboundedSender<(PartyIdentity, O)>,
    ) -> Self {
        Self {
            me,
            messages,
            completions,
        }
    }

    /// Send a message to every other participant
    pub fn broadcast(&self, round: u32, payload: Vec<u8>) {
        self.emit(ProtocolMessage::Broadcast {
            from: self.me.clone(),
            round,
            payload,
        });
    }

    /// Send a message to one participant
    pub fn send_direct(&self, to: &PartyIdentity, round: u32, payload: Vec<u8>) {
        self.emit(ProtocolMessage::Direct {
            from: self.me.clone(),
            to: to.clone(),
            round,
            payload,
        });
    }

    /// Report the terminal result
    pub fn finish(&self, output: O) {
        if self.completions.send((self.me.clone(), output)).is_err() {
            debug!(party = %self.me, "Run already finished, dropping result");
        }
    }

    fn emit(&self, message: ProtocolMessage) {
        if self.messages.send(message).is_err() {
            debug!(party = %self.me, "Run already finished, dropping message");
        }
    }
}
