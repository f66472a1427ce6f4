//! Address book boundary: which peers are known, and which protocols they speak.

use std::fmt::{self, Display, Formatter};

use crate::common::PeerId;
use crate::Result;

/// Protocol identifier announced by peers during identification, ex: `/ipfs/kad/1.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolId(String);

impl ProtocolId {
    pub fn new(protocol: impl Into<String>) -> Self {
        ProtocolId(protocol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProtocolId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProtocolId {
    fn from(protocol: &str) -> Self {
        ProtocolId::new(protocol)
    }
}

/// Peer metadata store acting as the protocol support oracle.
pub trait Peerstore: Send + Sync {
    /// All peers this node has a record for, connected or not.
    fn peers(&self) -> Vec<PeerId>;

    /// Returns the subset of `protocols` that `peer` announced support for.
    ///
    /// An empty result means the peer is known but speaks none of them,
    /// an error means the lookup itself failed.
    fn supports_protocols(
        &self,
        peer: &PeerId,
        protocols: &[ProtocolId],
    ) -> Result<Vec<ProtocolId>>;
}
