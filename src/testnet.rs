//! In-memory collaborators, to run a [Maintainer] without a network stack.

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use flume::Sender;
use lru::LruCache;
use tracing::trace;

use crate::common::PeerId;
use crate::events::{Event, EventBus, Subscription};
use crate::maintainer::{Maintainer, MaintainerBuilder};
use crate::network::{Connectedness, Connection, Direction, Network, Notifee, StreamInfo};
use crate::peerstore::{Peerstore, ProtocolId};
use crate::{Error, Result};

/// Maximum number of peer records kept by a [MemoryPeerstore].
pub const DEFAULT_PEERSTORE_CAPACITY: usize = 10_000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// === Network ===

#[derive(Default)]
/// Network where connections are opened and closed by hand.
///
/// Notifications are delivered synchronously on the calling thread, after
/// the connection state changed, like a real network stack does.
pub struct MemoryNetwork {
    connections: Mutex<Connections>,
    notifees: Mutex<Vec<Arc<dyn Notifee>>>,
}

#[derive(Default)]
struct Connections {
    next_id: u64,
    by_peer: HashMap<PeerId, Vec<Connection>>,
    dial_failures: HashSet<PeerId>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection to `peer`.
    pub fn connect(&self, peer: PeerId) -> Connection {
        let connection = {
            let mut connections = lock(&self.connections);

            connections.next_id += 1;
            let id = connections.next_id;

            let connection = Connection {
                id,
                remote_peer: peer,
                remote_addr: SocketAddr::V4(SocketAddrV4::new(
                    Ipv4Addr::LOCALHOST,
                    (4000 + id % 60_000) as u16,
                )),
                direction: Direction::Outbound,
            };

            connections.dial_failures.remove(&peer);
            connections
                .by_peer
                .entry(peer)
                .or_default()
                .push(connection.clone());

            connection
        };

        trace!(%peer, id = connection.id, "Connected");

        for notifee in self.notifees() {
            notifee.connected(&connection);
        }

        connection
    }

    /// Close a single connection. Returns `false` if it was already closed.
    pub fn close(&self, connection: &Connection) -> bool {
        let removed = {
            let mut connections = lock(&self.connections);
            let peer = connection.remote_peer();

            match connections.by_peer.get_mut(peer) {
                Some(open) => {
                    let before = open.len();
                    open.retain(|c| c.id != connection.id);
                    let removed = open.len() < before;

                    if open.is_empty() {
                        connections.by_peer.remove(peer);
                    }

                    removed
                }
                None => false,
            }
        };

        if removed {
            trace!(peer = %connection.remote_peer, id = connection.id, "Disconnected");

            for notifee in self.notifees() {
                notifee.disconnected(connection);
            }
        }

        removed
    }

    /// Close every connection to `peer`, returns how many were closed.
    pub fn disconnect(&self, peer: &PeerId) -> usize {
        let open = lock(&self.connections)
            .by_peer
            .get(peer)
            .cloned()
            .unwrap_or_default();

        open.iter().filter(|connection| self.close(connection)).count()
    }

    /// Mark `peer` as unreachable until the next [MemoryNetwork::connect].
    pub fn fail_dials(&self, peer: PeerId) {
        lock(&self.connections).dial_failures.insert(peer);
    }

    pub fn open_stream(&self, connection: &Connection, protocol: &str) -> StreamInfo {
        let stream = StreamInfo {
            connection: connection.clone(),
            protocol: Some(protocol.to_string()),
        };

        for notifee in self.notifees() {
            notifee.opened_stream(&stream);
        }

        stream
    }

    pub fn close_stream(&self, stream: &StreamInfo) {
        for notifee in self.notifees() {
            notifee.closed_stream(stream);
        }
    }

    pub fn listen(&self, address: SocketAddr) {
        for notifee in self.notifees() {
            notifee.listen(address);
        }
    }

    pub fn listen_close(&self, address: SocketAddr) {
        for notifee in self.notifees() {
            notifee.listen_close(address);
        }
    }

    /// Number of registered notifees.
    pub fn notifee_count(&self) -> usize {
        lock(&self.notifees).len()
    }

    /// Number of open connections to `peer`.
    pub fn connection_count(&self, peer: &PeerId) -> usize {
        lock(&self.connections)
            .by_peer
            .get(peer)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn notifees(&self) -> Vec<Arc<dyn Notifee>> {
        lock(&self.notifees).clone()
    }
}

impl Network for MemoryNetwork {
    fn connectedness(&self, peer: &PeerId) -> Connectedness {
        let connections = lock(&self.connections);

        if connections.by_peer.contains_key(peer) {
            Connectedness::Connected
        } else if connections.dial_failures.contains(peer) {
            Connectedness::CannotConnect
        } else {
            Connectedness::NotConnected
        }
    }

    fn peers(&self) -> Vec<PeerId> {
        lock(&self.connections).by_peer.keys().copied().collect()
    }

    fn notify(&self, notifee: Arc<dyn Notifee>) {
        lock(&self.notifees).push(notifee);
    }

    fn stop_notify(&self, notifee: &Arc<dyn Notifee>) {
        let target = Arc::as_ptr(notifee) as *const ();

        lock(&self.notifees).retain(|n| Arc::as_ptr(n) as *const () != target);
    }
}

// === Peerstore ===

#[derive(Debug, Default, Clone)]
struct PeerRecord {
    protocols: Vec<ProtocolId>,
    lookup_failure: Option<String>,
}

/// Peerstore keeping the announced protocols of up to `capacity` peers,
/// evicting the least recently used records first.
pub struct MemoryPeerstore {
    records: Mutex<LruCache<PeerId, PeerRecord>>,
}

impl MemoryPeerstore {
    pub fn new() -> Self {
        Self::with_capacity(
            NonZeroUsize::new(DEFAULT_PEERSTORE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
        )
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        MemoryPeerstore {
            records: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Record a peer, without any known protocols.
    pub fn add_peer(&self, peer: PeerId) {
        let mut records = lock(&self.records);

        if !records.contains(&peer) {
            records.put(peer, PeerRecord::default());
        }
    }

    /// Replace the protocols `peer` announced, recording it if needed.
    pub fn set_protocols(&self, peer: PeerId, protocols: &[&str]) {
        let mut records = lock(&self.records);

        let record = records.get_or_insert_mut(peer, PeerRecord::default);
        record.protocols = protocols.iter().map(|p| ProtocolId::from(*p)).collect();
    }

    /// Make protocol lookups of `peer` fail with `reason`, or succeed again with `None`.
    pub fn set_lookup_failure(&self, peer: PeerId, reason: Option<&str>) {
        let mut records = lock(&self.records);

        let record = records.get_or_insert_mut(peer, PeerRecord::default);
        record.lookup_failure = reason.map(str::to_string);
    }

    pub fn remove_peer(&self, peer: &PeerId) {
        lock(&self.records).pop(peer);
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }
}

impl Default for MemoryPeerstore {
    fn default() -> Self {
        Self::new()
    }
}

impl Peerstore for MemoryPeerstore {
    fn peers(&self) -> Vec<PeerId> {
        lock(&self.records).iter().map(|(peer, _)| *peer).collect()
    }

    fn supports_protocols(
        &self,
        peer: &PeerId,
        protocols: &[ProtocolId],
    ) -> Result<Vec<ProtocolId>> {
        let mut records = lock(&self.records);

        let record = records.get(peer).ok_or(Error::PeerNotFound(*peer))?;

        if let Some(reason) = &record.lookup_failure {
            return Err(Error::LookupFailed {
                peer: *peer,
                reason: reason.clone(),
            });
        }

        Ok(protocols
            .iter()
            .filter(|protocol| record.protocols.contains(protocol))
            .cloned()
            .collect())
    }
}

// === Event bus ===

#[derive(Default)]
/// Event bus fanning out identification events to every subscriber.
///
/// [MemoryEventBus::emit] blocks while a subscriber's buffer is full.
pub struct MemoryEventBus {
    state: Mutex<BusState>,
}

#[derive(Default)]
struct BusState {
    subscribers: Vec<Sender<Event>>,
    closed: bool,
    subscribe_failure: Option<String>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event to every subscriber.
    ///
    /// Subscriptions only receive [Event::PeerIdentificationCompleted], other
    /// events are not delivered. Returns the number of subscribers reached.
    pub fn emit(&self, event: Event) -> usize {
        match event {
            Event::PeerIdentificationCompleted { .. } => self.inject(event),
            _ => 0,
        }
    }

    /// Deliver any event to every subscriber, even ones they did not subscribe to.
    pub fn inject(&self, event: Event) -> usize {
        let subscribers = lock(&self.state).subscribers.clone();

        let delivered = subscribers
            .iter()
            .filter(|sender| sender.send(event.clone()).is_ok())
            .count();

        lock(&self.state)
            .subscribers
            .retain(|sender| !sender.is_disconnected());

        delivered
    }

    /// Close all subscriptions, and every later one.
    pub fn close(&self) {
        let mut state = lock(&self.state);

        state.closed = true;
        state.subscribers.clear();
    }

    /// Make the next subscriptions fail with `reason`, or succeed again with `None`.
    pub fn set_subscribe_failure(&self, reason: Option<&str>) {
        lock(&self.state).subscribe_failure = reason.map(str::to_string);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut state = lock(&self.state);

        state.subscribers.retain(|sender| !sender.is_disconnected());
        state.subscribers.len()
    }
}

impl EventBus for MemoryEventBus {
    fn subscribe(&self, buffer: usize) -> Result<Subscription> {
        let mut state = lock(&self.state);

        if let Some(reason) = &state.subscribe_failure {
            return Err(Error::SubscriptionFailed(reason.clone()));
        }

        let (sender, receiver) = flume::bounded(buffer);

        // Dropping the sender right away ends the stream of a closed bus.
        if !state.closed {
            state.subscribers.push(sender);
        }

        Ok(Subscription::new(receiver))
    }
}

// === Testnet ===

/// All in-memory collaborators of a [Maintainer], wired together.
#[derive(Clone)]
pub struct Testnet {
    pub network: Arc<MemoryNetwork>,
    pub peerstore: Arc<MemoryPeerstore>,
    pub event_bus: Arc<MemoryEventBus>,
}

impl Testnet {
    pub fn new() -> Self {
        Testnet {
            network: Arc::new(MemoryNetwork::new()),
            peerstore: Arc::new(MemoryPeerstore::new()),
            event_bus: Arc::new(MemoryEventBus::new()),
        }
    }

    /// Build a [Maintainer] observing this testnet.
    pub fn maintainer(&self, builder: &MaintainerBuilder) -> Maintainer {
        builder.build(
            self.network.clone(),
            self.peerstore.clone(),
            self.event_bus.clone(),
        )
    }

    /// Connect to `peer`, record its protocols, then publish its identification.
    pub fn connect_and_identify(&self, peer: PeerId, protocols: &[&str]) -> Connection {
        self.peerstore.set_protocols(peer, protocols);
        let connection = self.network.connect(peer);
        self.event_bus
            .emit(Event::PeerIdentificationCompleted { peer });

        connection
    }
}

impl Default for Testnet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct CountingNotifee {
        events: Mutex<Vec<&'static str>>,
    }

    impl Notifee for CountingNotifee {
        fn connected(&self, _: &Connection) {
            self.events.lock().unwrap().push("connected");
        }
        fn disconnected(&self, _: &Connection) {
            self.events.lock().unwrap().push("disconnected");
        }
        fn opened_stream(&self, _: &StreamInfo) {
            self.events.lock().unwrap().push("opened_stream");
        }
        fn closed_stream(&self, _: &StreamInfo) {
            self.events.lock().unwrap().push("closed_stream");
        }
        fn listen(&self, _: SocketAddr) {
            self.events.lock().unwrap().push("listen");
        }
        fn listen_close(&self, _: SocketAddr) {
            self.events.lock().unwrap().push("listen_close");
        }
    }

    #[test]
    fn connectedness_follows_connections() {
        let network = MemoryNetwork::new();
        let peer = PeerId::random();

        assert_eq!(network.connectedness(&peer), Connectedness::NotConnected);

        let first = network.connect(peer);
        let second = network.connect(peer);
        assert_eq!(network.connection_count(&peer), 2);

        assert!(network.close(&first));
        assert!(!network.close(&first));
        assert_eq!(network.connectedness(&peer), Connectedness::Connected);

        assert!(network.close(&second));
        assert_eq!(network.connectedness(&peer), Connectedness::NotConnected);
        assert!(network.peers().is_empty());

        network.fail_dials(peer);
        assert_eq!(network.connectedness(&peer), Connectedness::CannotConnect);
    }

    #[test]
    fn notifications() {
        let network = MemoryNetwork::new();
        let notifee = Arc::new(CountingNotifee::default());
        let dyn_notifee: Arc<dyn Notifee> = notifee.clone();

        network.notify(dyn_notifee.clone());

        let connection = network.connect(PeerId::random());
        let stream = network.open_stream(&connection, "/ipfs/kad/1.0.0");
        network.close_stream(&stream);
        network.listen("127.0.0.1:4001".parse().unwrap());
        network.listen_close("127.0.0.1:4001".parse().unwrap());
        network.close(&connection);

        network.stop_notify(&dyn_notifee);
        assert_eq!(network.notifee_count(), 0);

        network.connect(PeerId::random());

        assert_eq!(
            *notifee.events.lock().unwrap(),
            vec![
                "connected",
                "opened_stream",
                "closed_stream",
                "listen",
                "listen_close",
                "disconnected"
            ]
        );
    }

    #[test]
    fn peerstore_protocol_lookup() {
        let peerstore = MemoryPeerstore::new();
        let peer = PeerId::random();
        let kad = [ProtocolId::from("/ipfs/kad/1.0.0")];

        assert!(matches!(
            peerstore.supports_protocols(&peer, &kad),
            Err(Error::PeerNotFound(_))
        ));

        peerstore.add_peer(peer);
        assert!(peerstore.supports_protocols(&peer, &kad).unwrap().is_empty());

        peerstore.set_protocols(peer, &["/ipfs/id/1.0.0", "/ipfs/kad/1.0.0"]);
        assert_eq!(peerstore.supports_protocols(&peer, &kad).unwrap(), kad);

        peerstore.set_lookup_failure(peer, Some("datastore closed"));
        assert!(matches!(
            peerstore.supports_protocols(&peer, &kad),
            Err(Error::LookupFailed { .. })
        ));
    }

    #[test]
    fn peerstore_is_bounded() {
        let peerstore = MemoryPeerstore::with_capacity(NonZeroUsize::new(2).unwrap());

        let first = PeerId::random();
        peerstore.add_peer(first);
        peerstore.add_peer(PeerId::random());
        peerstore.add_peer(PeerId::random());

        assert_eq!(peerstore.len(), 2);
        assert!(!peerstore.peers().contains(&first));
    }

    #[test]
    fn event_bus_filters_and_closes() {
        let bus = MemoryEventBus::new();
        let subscription = bus.subscribe(4).unwrap();
        let peer = PeerId::random();

        assert_eq!(bus.emit(Event::PeerIdentificationCompleted { peer }), 1);
        assert_eq!(
            bus.emit(Event::PeerIdentificationFailed {
                peer,
                reason: "timeout".into()
            }),
            0
        );
        assert_eq!(subscription.pending(), 1);

        bus.close();

        assert_eq!(
            subscription.recv().unwrap(),
            Event::PeerIdentificationCompleted { peer }
        );
        assert!(subscription.recv().is_err());

        // Later subscriptions are closed right away.
        assert!(bus.subscribe(4).unwrap().recv().is_err());
    }

    #[test]
    fn event_bus_subscribe_failure() {
        let bus = MemoryEventBus::new();

        bus.set_subscribe_failure(Some("bus full"));
        assert!(matches!(bus.subscribe(1), Err(Error::SubscriptionFailed(_))));

        bus.set_subscribe_failure(None);
        let subscription = bus.subscribe(1).unwrap();
        assert_eq!(bus.subscriber_count(), 1);

        subscription.close();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
