//! Storage module
//!
//! Durable state of a node lives in a data directory holding:
//! - `replica_<i>.json`: k independent replica stores of the message log
//! - `checkpoint.json`: the latest snapshot of the node state
//!
//! Both are written through the [`BlobStore`] boundary: whole-blob reads and
//! writes by name, last write wins, no atomicity beyond that.

pub mod blob;
pub mod checkpoint;
pub mod replica;

pub use blob::{FsBlobStore, MemoryBlobStore};
pub use checkpoint::{Checkpoint, CheckpointEngine, RestoreOutcome, CHECKPOINT_NAME};
pub use replica::{replica_name, ReplicaSet};

use crate::Result;

/// Named blob storage
pub trait BlobStore: Send + Sync {
    /// Whether a blob with this name has been written
    fn exists(&self, name: &str) -> bool;

    /// Read a whole blob
    fn read_all(&self, name: &str) -> Result<Vec<u8>>;

    /// Replace a whole blob
    fn write_all(&self, name: &str, data: &[u8]) -> Result<()>;
}
