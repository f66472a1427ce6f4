//! Network notifications, only disconnections affect membership.

use std::net::SocketAddr;
use std::thread;

use tracing::{debug, trace};

use super::{Maintainer, Shared};
use crate::common::RoutingTable;
use crate::network::{Connection, Notifee, StreamInfo};

impl Notifee for Shared {
    fn disconnected(&self, connection: &Connection) {
        if self.process.is_closing() {
            return;
        }

        let peer = *connection.remote_peer();

        {
            let mut routing_table = self.lock_routing_table();

            if self.network.connectedness(&peer).is_connected() {
                // Another connection to this peer is still open.
                trace!(%peer, connection = connection.id, "Peer still connected");
                return;
            }

            routing_table.remove(&peer);

            if routing_table.size() < self.config.min_refresh_threshold {
                // TODO: Actively bootstrap. For now, just re-check the currently connected peers.
                self.recover(&mut routing_table);
            }
        }

        let Some(sender) = self.senders.remove(&peer) else {
            return;
        };

        // Invalidation waits for in-flight sends, which can take a while.
        // Nothing observes the outcome of this thread.
        let spawned = thread::Builder::new()
            .name("invalidate-sender".to_string())
            .spawn(move || sender.invalidate());

        if let Err(error) = spawned {
            debug!(%peer, ?error, "Failed to spawn message sender invalidation");
        }
    }

    // Admission waits for identification, see `handle_identified`.
    fn connected(&self, _connection: &Connection) {}

    fn opened_stream(&self, _stream: &StreamInfo) {}

    fn closed_stream(&self, _stream: &StreamInfo) {}

    fn listen(&self, _address: SocketAddr) {}

    fn listen_close(&self, _address: SocketAddr) {}
}

/// Lets a host register a [Maintainer] handle with its network stack directly.
///
/// [Maintainer::start] already registers the maintainer, so registering the
/// handle as well processes every disconnect twice, including the recovery
/// pass. Eviction is idempotent, so membership stays correct. The host owns
/// this registration: it outlives [Maintainer::shutdown] until the host
/// calls `stop_notify`, and keeps the maintainer's state alive until then.
impl Notifee for Maintainer {
    fn disconnected(&self, connection: &Connection) {
        self.0.disconnected(connection)
    }

    fn connected(&self, connection: &Connection) {
        self.0.connected(connection)
    }

    fn opened_stream(&self, stream: &StreamInfo) {
        self.0.opened_stream(stream)
    }

    fn closed_stream(&self, stream: &StreamInfo) {
        self.0.closed_stream(stream)
    }

    fn listen(&self, address: SocketAddr) {
        self.0.listen(address)
    }

    fn listen_close(&self, address: SocketAddr) {
        self.0.listen_close(address)
    }
}

impl Shared {
    /// Re-admit connected peers that support the DHT, without dialing anyone.
    fn recover(&self, routing_table: &mut RoutingTable) {
        let before = routing_table.size();

        for peer in self.network.peers() {
            // Don't bother probing, that happens on identification.
            if self.supports_dht(&peer) {
                self.update(routing_table, peer);
            }
        }

        debug!(
            before,
            after = routing_table.size(),
            "Routing table under threshold, re-checked connected peers"
        );
    }
}
