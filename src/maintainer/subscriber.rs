//! The maintenance loop, admitting peers as they finish identification.

use std::sync::Arc;

use flume::{RecvError, Sender};
use tracing::{debug, error, trace};

use super::{LoopExit, Shared};
use crate::common::PeerId;
use crate::events::{Event, Subscription};
use crate::network::{Network, Notifee};

enum Next {
    Event(Result<Event, RecvError>),
    Closing,
}

/// Unregisters the notifee when the loop returns, whatever the exit path.
struct StopNotify<'a> {
    network: &'a dyn Network,
    notifee: Arc<dyn Notifee>,
}

impl Drop for StopNotify<'_> {
    fn drop(&mut self) {
        self.network.stop_notify(&self.notifee);
    }
}

impl Shared {
    /// Body of the maintenance thread.
    ///
    /// `ready` is signaled once subscribed and bootstrapped.
    pub(super) fn run(self: Arc<Self>, ready: Sender<()>) -> LoopExit {
        let notifee: Arc<dyn Notifee> = self.clone();
        self.network.notify(notifee.clone());
        let _stop_notify = StopNotify {
            network: self.network.as_ref(),
            notifee,
        };

        let subscription = match self.event_bus.subscribe(self.config.subscription_buffer) {
            Ok(subscription) => Some(subscription),
            Err(error) => {
                error!(
                    ?error,
                    "Not subscribed to peer identification events; routing table will undercount peers"
                );
                None
            }
        };

        // Scan after subscribing, so peers identified during the scan are not missed.
        self.bootstrap_scan();

        let _ = ready.send(());
        drop(ready);

        let exit = self.event_loop(subscription.as_ref());

        debug!(?exit, "Routing table maintenance loop returned");

        exit
    }

    /// Admit every connected peer the peerstore knows that supports the DHT.
    fn bootstrap_scan(&self) {
        let mut routing_table = self.lock_routing_table();

        for peer in self.peerstore.peers() {
            if !self.network.connectedness(&peer).is_connected() {
                continue;
            }

            if self.supports_dht(&peer) {
                self.update(&mut routing_table, peer);
            }
        }

        debug!(size = routing_table.size(), "Admitted already connected peers");
    }

    fn event_loop(&self, subscription: Option<&Subscription>) -> LoopExit {
        let closing = self.process.closing();

        loop {
            if self.process.is_closing() {
                return LoopExit::Shutdown;
            }

            let next = match subscription {
                Some(subscription) => flume::Selector::new()
                    .recv(subscription.receiver(), Next::Event)
                    .recv(&closing, |_| Next::Closing)
                    .wait(),
                None => {
                    // Degraded mode, nothing to do but wait for shutdown.
                    let _ = closing.recv();
                    Next::Closing
                }
            };

            match next {
                Next::Closing => return LoopExit::Shutdown,
                Next::Event(Err(RecvError::Disconnected)) => return LoopExit::SubscriptionClosed,
                Next::Event(Ok(Event::PeerIdentificationCompleted { peer })) => {
                    self.handle_identified(peer)
                }
                Next::Event(Ok(event)) => {
                    // A subscription delivering events it was not asked for can't be trusted.
                    error!(?event, "Got wrong event type from subscription");
                    return LoopExit::UnexpectedEvent;
                }
            }
        }
    }

    /// Admit `peer` if it is still connected and supports the DHT.
    fn handle_identified(&self, peer: PeerId) {
        let mut routing_table = self.lock_routing_table();

        if !self.network.connectedness(&peer).is_connected() {
            trace!(%peer, "Peer disconnected before its identification was processed");
            return;
        }

        if !self.supports_dht(&peer) {
            trace!(%peer, "Identified peer does not support the DHT protocols");
            return;
        }

        let refresh = routing_table.size() <= self.config.min_refresh_threshold;

        self.update(&mut routing_table, peer);

        if refresh && self.config.auto_refresh && self.refresh_trigger.request() {
            debug!(
                size = routing_table.size(),
                "Requested a routing table refresh"
            );
        }
    }
}
