#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

// Public modules
mod common;
mod config;
mod error;
pub mod events;
mod maintainer;
pub mod network;
pub mod peerstore;
mod process;
mod refresh;
mod sender;
pub mod testnet;

pub use crate::common::{InvalidPeerId, KBucket, PeerId, RoutingTable, ID_SIZE, MAX_BUCKET_SIZE_K};
pub use config::{Config, DEFAULT_MIN_REFRESH_THRESHOLD, DEFAULT_PROTOCOLS};
pub use error::{Error, Result};
pub use maintainer::{LoopExit, Maintainer, MaintainerBuilder, THREAD_NAME};
pub use process::Process;
pub use refresh::{refresh_trigger, RefreshRequests, RefreshTrigger};
pub use sender::{MessageSender, MessageSenders};

pub use bytes::Bytes;
pub use ed25519_dalek::{SigningKey, VerifyingKey};
