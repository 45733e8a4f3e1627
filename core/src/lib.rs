//! Ringchat Core Library
//!
//! Coordination logic for a small multicast chat group that demonstrates
//! token-based mutual exclusion, replicated storage with eventual consistency
//! and checkpoint-based crash recovery.

pub mod message;
pub mod network;
pub mod node;
pub mod replication;
pub mod smoothtest;
pub mod state;
pub mod storage;
pub mod token;
pub mod types;
pub mod version;

pub use message::{Message, MessageKey, MessageKind, Route};
pub use node::{Node, NodeConfig, NodeEvent, NodeStatus};
pub use replication::{DelayPolicy, ReconcileReport, ReplicationEngine};
pub use state::{MessageLog, NodeState, RequestQueue};
pub use storage::{BlobStore, Checkpoint, CheckpointEngine, FsBlobStore, MemoryBlobStore, ReplicaSet};
pub use types::*;
pub use version::{version_string, PROTOCOL_VERSION};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Network operation failed: {0}")]
    Network(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Malformed datagram: {0}")]
    Malformed(String),

    #[error("Incompatible protocol version: expected {expected}, got {actual}")]
    IncompatibleProtocol { expected: u32, actual: u32 },

    #[error("Node {0} does not hold the token; type 'token' to request it")]
    NotTokenHolder(NodeId),

    #[error("Checkpoint belongs to node {found}, expected {expected}")]
    CheckpointMismatch { expected: NodeId, found: NodeId },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
