//! Event bus boundary: identification events published by the host.

use flume::{Receiver, RecvError, TryRecvError};

use crate::common::PeerId;
use crate::peerstore::ProtocolId;
use crate::Result;

/// Buffer size of the identification events subscription.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 256;

/// Events published on the host's event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A peer finished the identify handshake; its protocols are now in the peerstore.
    PeerIdentificationCompleted { peer: PeerId },
    PeerIdentificationFailed { peer: PeerId, reason: String },
    LocalProtocolsUpdated {
        added: Vec<ProtocolId>,
        removed: Vec<ProtocolId>,
    },
}

/// Host event bus.
pub trait EventBus: Send + Sync {
    /// Subscribe to [Event::PeerIdentificationCompleted] events, buffering up to `buffer` of them.
    fn subscribe(&self, buffer: usize) -> Result<Subscription>;
}

/// A live subscription on an [EventBus].
///
/// The stream ends once the bus drops its sending side. Dropping the
/// subscription unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: Receiver<Event>,
}

impl Subscription {
    pub fn new(receiver: Receiver<Event>) -> Self {
        Subscription { receiver }
    }

    /// Receiving side, for use in a [flume::Selector].
    pub fn receiver(&self) -> &Receiver<Event> {
        &self.receiver
    }

    /// Block until the next event, or return Err once the stream is closed.
    pub fn recv(&self) -> Result<Event, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<Event, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Number of events waiting in the buffer.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Unsubscribe.
    pub fn close(self) {}
}
