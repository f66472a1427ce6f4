//! Routing table membership maintenance.
//!
//! The [Maintainer] admits peers into the routing table when they finish
//! identification and support one of the DHT protocols, and evicts them
//! when their last connection closes. Every membership decision is made
//! while holding the lock that owns the [RoutingTable], so admission and
//! eviction of the same peer are totally ordered.

mod notifee;
mod subscriber;

use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::common::{PeerId, RoutingTable};
use crate::config::Config;
use crate::events::EventBus;
use crate::network::Network;
use crate::peerstore::{Peerstore, ProtocolId};
use crate::process::Process;
use crate::refresh::{refresh_trigger, RefreshRequests, RefreshTrigger};
use crate::sender::{MessageSender, MessageSenders};
use crate::{Error, Result};

/// Name of the maintenance loop thread.
pub const THREAD_NAME: &str = "dht-membership";

/// Why the maintenance loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The node started shutting down.
    Shutdown,
    /// The event bus closed the subscription, no more events will arrive.
    SubscriptionClosed,
    /// The subscription delivered an event it was not subscribed to.
    UnexpectedEvent,
}

/// Handle to a routing table membership maintainer.
///
/// Cheap to clone, all clones share the same routing table.
#[derive(Clone)]
pub struct Maintainer(Arc<Shared>);

/// State shared between the maintenance loop, the network notifications and the handles.
pub(crate) struct Shared {
    config: Config,
    local_id: PeerId,

    network: Arc<dyn Network>,
    peerstore: Arc<dyn Peerstore>,
    event_bus: Arc<dyn EventBus>,

    /// Membership lock, held for every read of connectivity and protocol
    /// support that leads to a routing table mutation.
    routing_table: Mutex<RoutingTable>,
    /// Never held at the same time as `routing_table`.
    senders: MessageSenders,

    refresh_trigger: RefreshTrigger,
    refresh_requests: RefreshRequests,

    process: Process,
    handle: Mutex<Option<JoinHandle<LoopExit>>>,
}

impl Maintainer {
    /// Returns a builder to edit settings before creating a [Maintainer].
    pub fn builder() -> MaintainerBuilder {
        MaintainerBuilder::default()
    }

    /// Create a new maintainer. Nothing happens until [Maintainer::start] is called.
    pub fn new(
        config: Config,
        network: Arc<dyn Network>,
        peerstore: Arc<dyn Peerstore>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        let local_id = config.local_id.unwrap_or_else(PeerId::random);
        let (refresh_trigger, refresh_requests) = refresh_trigger();

        let routing_table = RoutingTable::new(local_id).with_bucket_size(config.bucket_size);

        Maintainer(Arc::new(Shared {
            config,
            local_id,
            network,
            peerstore,
            event_bus,
            routing_table: Mutex::new(routing_table),
            senders: MessageSenders::new(),
            refresh_trigger,
            refresh_requests,
            process: Process::new(),
            handle: Mutex::new(None),
        }))
    }

    // === Getters ===

    /// Returns the local node's id.
    pub fn local_id(&self) -> &PeerId {
        &self.0.local_id
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Returns a snapshot of the routing table.
    pub fn routing_table(&self) -> RoutingTable {
        self.0.lock_routing_table().clone()
    }

    /// Returns the current number of peers in the routing table.
    pub fn routing_table_size(&self) -> usize {
        self.0.lock_routing_table().size()
    }

    /// Returns `true` if `peer` is currently a member of the routing table.
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.0.lock_routing_table().contains(peer)
    }

    /// Returns the receiving side of the refresh trigger, for the node's refresh routine.
    pub fn refresh_requests(&self) -> RefreshRequests {
        self.0.refresh_requests.clone()
    }

    /// Returns `true` once [Maintainer::shutdown] was called.
    pub fn is_closing(&self) -> bool {
        self.0.process.is_closing()
    }

    /// Returns `true` while the maintenance loop thread is alive.
    pub fn is_running(&self) -> bool {
        self.0
            .lock_handle()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    // === Public Methods ===

    /// Spawn the maintenance loop.
    ///
    /// Returns once the loop has subscribed to identification events and
    /// admitted the peers that were already connected.
    pub fn start(&self) -> Result<()> {
        if self.0.process.is_closing() {
            return Err(Error::Shutdown);
        }

        let mut handle = self.0.lock_handle();

        if handle.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let (ready_sender, ready_receiver) = flume::bounded::<()>(1);
        let shared = self.0.clone();

        let join_handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || shared.run(ready_sender))
            .map_err(Error::SpawnFailed)?;

        *handle = Some(join_handle);
        drop(handle);

        // Err means the loop thread exited before getting ready.
        let _ = ready_receiver.recv();

        info!(local_id = %self.0.local_id, "Routing table maintainer started");

        Ok(())
    }

    /// Stop the maintenance loop and wait for it to return.
    ///
    /// Returns why the loop returned, or `None` if it was never started, was
    /// already joined, or panicked.
    pub fn shutdown(&self) -> Option<LoopExit> {
        if self.0.process.close() {
            debug!(local_id = %self.0.local_id, "Shutting down routing table maintainer");
        }

        let handle = self.0.lock_handle().take()?;

        handle.join().ok()
    }

    /// Returns the message sender for `peer`, creating it on first use.
    ///
    /// The sender stays in use until the peer disconnects, at which point it
    /// is removed and invalidated.
    pub fn message_sender(&self, peer: PeerId) -> Result<Arc<MessageSender>> {
        if self.0.process.is_closing() {
            return Err(Error::Shutdown);
        }

        Ok(self.0.senders.get_or_create(peer))
    }
}

impl Debug for Maintainer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Maintainer")
            .field("local_id", &self.0.local_id)
            .field("config", &self.0.config)
            .field("closing", &self.0.process.is_closing())
            .finish()
    }
}

impl Shared {
    fn lock_routing_table(&self) -> MutexGuard<'_, RoutingTable> {
        self.routing_table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<JoinHandle<LoopExit>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn protocols(&self) -> &[ProtocolId] {
        &self.config.protocols
    }

    /// Ask the peerstore whether `peer` speaks any of the DHT protocols.
    ///
    /// Lookup errors count as no support, the next event for this peer asks again.
    fn supports_dht(&self, peer: &PeerId) -> bool {
        match self.peerstore.supports_protocols(peer, self.protocols()) {
            Ok(protocols) => !protocols.is_empty(),
            Err(error) => {
                debug!(%peer, ?error, "Protocol support lookup failed");
                false
            }
        }
    }

    /// Insert or refresh `peer`, logging rejections from full buckets.
    fn update(&self, routing_table: &mut RoutingTable, peer: PeerId) {
        if !routing_table.update(peer) {
            debug!(%peer, "Routing table rejected peer");
        }
    }
}

#[derive(Debug, Default, Clone)]
/// Create a [Maintainer] with custom settings.
pub struct MaintainerBuilder(Config);

impl MaintainerBuilder {
    /// Set the local node id, instead of a random one.
    pub fn local_id(&mut self, local_id: PeerId) -> &mut Self {
        self.0.local_id = Some(local_id);

        self
    }

    /// Set the minimum usable routing table size.
    pub fn min_refresh_threshold(&mut self, threshold: usize) -> &mut Self {
        self.0.min_refresh_threshold = threshold;

        self
    }

    /// Enable or disable refresh requests when admitting into a small routing table.
    pub fn auto_refresh(&mut self, auto_refresh: bool) -> &mut Self {
        self.0.auto_refresh = auto_refresh;

        self
    }

    /// Set the DHT protocol identifiers.
    pub fn protocols(&mut self, protocols: &[&str]) -> &mut Self {
        self.0.protocols = protocols.iter().map(|p| ProtocolId::from(*p)).collect();

        self
    }

    /// Set the capacity of the identification events subscription.
    pub fn subscription_buffer(&mut self, buffer: usize) -> &mut Self {
        self.0.subscription_buffer = buffer;

        self
    }

    /// Set the maximum number of peers per k-bucket.
    pub fn bucket_size(&mut self, bucket_size: usize) -> &mut Self {
        self.0.bucket_size = bucket_size;

        self
    }

    /// Create a [Maintainer] observing these collaborators.
    pub fn build(
        &self,
        network: Arc<dyn Network>,
        peerstore: Arc<dyn Peerstore>,
        event_bus: Arc<dyn EventBus>,
    ) -> Maintainer {
        Maintainer::new(self.0.clone(), network, peerstore, event_bus)
    }
}
