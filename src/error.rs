//! Main Crate Error

use crate::common::PeerId;

#[derive(thiserror::Error, Debug)]
/// dht-membership crate error enum.
pub enum Error {
    /// The event bus refused to create a subscription.
    #[error("Failed to subscribe to peer identification events: {0}")]
    SubscriptionFailed(String),

    /// The peerstore has no record of this peer.
    #[error("Unknown peer: {0}")]
    PeerNotFound(PeerId),

    /// The peerstore knows the peer but could not answer the lookup.
    #[error("Protocol lookup for {peer} failed: {reason}")]
    LookupFailed { peer: PeerId, reason: String },

    /// The message sender was invalidated after its peer disconnected.
    #[error("Message sender for {0} was invalidated")]
    SenderInvalid(PeerId),

    /// [crate::Maintainer::start] was called more than once.
    #[error("Maintainer was already started")]
    AlreadyStarted,

    /// The node is shutting down.
    #[error("Maintainer is shutting down")]
    Shutdown,

    /// Could not spawn the maintenance thread.
    #[error("Failed to spawn thread: {0}")]
    SpawnFailed(std::io::Error),

    #[error(transparent)]
    /// Transparent [std::io::Error]
    Io(#[from] std::io::Error),
}

/// Alias for `Result<T, Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
