//! Simplified Kademlia routing table of peer ids.

use std::collections::BTreeMap;
use std::slice::Iter;

use crate::common::PeerId;

/// K = the default maximum size of a k-bucket.
pub const MAX_BUCKET_SIZE_K: usize = 20;

#[derive(Debug, Clone)]
/// Simplified Kademlia routing table
pub struct RoutingTable {
    id: PeerId,
    bucket_size: usize,
    buckets: BTreeMap<u8, KBucket>,
}

impl RoutingTable {
    /// Create a new [RoutingTable] with a given local id.
    pub fn new(id: PeerId) -> Self {
        RoutingTable {
            id,
            bucket_size: MAX_BUCKET_SIZE_K,
            buckets: BTreeMap::new(),
        }
    }

    /// Set the maximum number of peers per bucket, defaults to [MAX_BUCKET_SIZE_K].
    pub fn with_bucket_size(mut self, bucket_size: usize) -> Self {
        self.bucket_size = bucket_size.max(1);
        self
    }

    /// Returns the [PeerId] of this node, where the distance is measured from.
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    // === Public Methods ===

    /// Insert a peer, or refresh it if it is already a member.
    ///
    /// Refreshing moves the peer to the most recently seen end of its bucket.
    /// Returns `true` if the peer is a member after this call.
    pub fn update(&mut self, peer: PeerId) -> bool {
        let distance = self.id.distance(&peer);

        if distance == 0 {
            // Do not add self to the routing_table
            return false;
        }

        let bucket_size = self.bucket_size;
        let bucket = self.buckets.entry(distance).or_default();

        bucket.update(peer, bucket_size)
    }

    /// Remove a peer from this routing table. Removing an absent peer is a no-op.
    pub fn remove(&mut self, peer: &PeerId) {
        let distance = self.id.distance(peer);

        if let Some(bucket) = self.buckets.get_mut(&distance) {
            bucket.remove(peer);

            if bucket.is_empty() {
                self.buckets.remove(&distance);
            }
        }
    }

    /// Returns `true` if the peer is a member of this routing table.
    pub fn contains(&self, peer: &PeerId) -> bool {
        let distance = self.id.distance(peer);

        self.buckets
            .get(&distance)
            .map(|bucket| bucket.contains(peer))
            .unwrap_or(false)
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|bucket| bucket.is_empty())
    }

    /// Return the number of peers in this routing table.
    pub fn size(&self) -> usize {
        self.buckets
            .values()
            .fold(0, |acc, bucket| acc + bucket.peers.len())
    }

    /// Returns an iterator over the peers in this routing table,
    /// closest buckets first.
    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.buckets.values().flat_map(|bucket| bucket.iter())
    }
}

/// Kbuckets are similar to LRU caches, ordered from least to most recently seen.
#[derive(Debug, Clone, Default)]
pub struct KBucket {
    peers: Vec<PeerId>,
}

impl KBucket {
    pub fn new() -> Self {
        KBucket { peers: Vec::new() }
    }

    // === Public Methods ===

    pub fn update(&mut self, incoming: PeerId, capacity: usize) -> bool {
        if let Some(index) = self.peers.iter().position(|peer| peer == &incoming) {
            self.peers.remove(index);
            self.peers.push(incoming);

            true
        } else if self.peers.len() < capacity {
            self.peers.push(incoming);

            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, peer: &PeerId) {
        self.peers.retain(|p| p != peer);
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains(peer)
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn iter(&self) -> Iter<'_, PeerId> {
        self.peers.iter()
    }
}
