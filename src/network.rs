//! Connectivity boundary: what the node's network stack exposes to the maintainer.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::common::PeerId;

/// Connectivity of a peer, as reported by the network stack at the moment of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectedness {
    /// No connection, and no known way to reach this peer.
    NotConnected,
    /// At least one open connection to this peer.
    Connected,
    /// Not connected, but recently reachable.
    CanConnect,
    /// Not connected, and recent dial attempts failed.
    CannotConnect,
}

impl Connectedness {
    pub fn is_connected(&self) -> bool {
        matches!(self, Connectedness::Connected)
    }
}

/// Direction of a connection or stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// A single connection to a remote peer.
///
/// A peer may have several connections at once, closing one of them does
/// not necessarily disconnect the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: u64,
    pub remote_peer: PeerId,
    pub remote_addr: SocketAddr,
    pub direction: Direction,
}

impl Connection {
    pub fn remote_peer(&self) -> &PeerId {
        &self.remote_peer
    }
}

/// A stream multiplexed over a [Connection].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub connection: Connection,
    pub protocol: Option<String>,
}

/// Network stack the maintainer observes.
pub trait Network: Send + Sync {
    /// Point-in-time connectivity of `peer`, may change right after returning.
    fn connectedness(&self, peer: &PeerId) -> Connectedness;

    /// Peers with at least one open connection.
    fn peers(&self) -> Vec<PeerId>;

    /// Register a [Notifee] to receive connection and listener notifications.
    fn notify(&self, notifee: Arc<dyn Notifee>);

    /// Unregister a [Notifee] previously passed to [Network::notify].
    fn stop_notify(&self, notifee: &Arc<dyn Notifee>);
}

/// Callbacks invoked synchronously by the network stack.
///
/// None of them can fail: implementations absorb their own errors.
pub trait Notifee: Send + Sync {
    /// A connection was opened.
    fn connected(&self, connection: &Connection);

    /// A connection was closed. The peer may still have other connections.
    fn disconnected(&self, connection: &Connection);

    fn opened_stream(&self, stream: &StreamInfo);

    fn closed_stream(&self, stream: &StreamInfo);

    /// The network started listening on an address.
    fn listen(&self, address: SocketAddr);

    /// The network stopped listening on an address.
    fn listen_close(&self, address: SocketAddr);
}
