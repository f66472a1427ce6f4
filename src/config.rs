use crate::common::PeerId;
use crate::events::DEFAULT_SUBSCRIPTION_BUFFER;
use crate::peerstore::ProtocolId;

/// Routing table size at or under which an admission requests a refresh,
/// and under which a disconnect runs a recovery pass.
pub const DEFAULT_MIN_REFRESH_THRESHOLD: usize = 4;

/// Protocol identifiers of the DHT, a peer must support one of them to be routable.
pub const DEFAULT_PROTOCOLS: [&str; 1] = ["/ipfs/kad/1.0.0"];

#[derive(Debug, Clone)]
/// Maintainer configurations
pub struct Config {
    /// Id of the local node, where routing table distances are measured from.
    ///
    /// Defaults to a random [PeerId]
    pub local_id: Option<PeerId>,
    /// Minimum usable routing table size.
    ///
    /// Defaults to [DEFAULT_MIN_REFRESH_THRESHOLD]
    pub min_refresh_threshold: usize,
    /// Whether admitting a peer into a small routing table should trigger a refresh.
    ///
    /// Defaults to `true`
    pub auto_refresh: bool,
    /// DHT protocols checked against each peer's announced protocols.
    ///
    /// Defaults to [DEFAULT_PROTOCOLS]
    pub protocols: Vec<ProtocolId>,
    /// Capacity of the identification events subscription.
    ///
    /// Defaults to [DEFAULT_SUBSCRIPTION_BUFFER]
    pub subscription_buffer: usize,
    /// Maximum number of peers per k-bucket.
    ///
    /// Defaults to [crate::MAX_BUCKET_SIZE_K]
    pub bucket_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_id: None,
            min_refresh_threshold: DEFAULT_MIN_REFRESH_THRESHOLD,
            auto_refresh: true,
            protocols: DEFAULT_PROTOCOLS.iter().map(|p| ProtocolId::from(*p)).collect(),
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
            bucket_size: crate::common::MAX_BUCKET_SIZE_K,
        }
    }
}
