//! Replica stores
//!
//! A node keeps `k` copies of its message log, each a JSON array in its own
//! blob. Copies are written independently and may lag, duplicate or reorder
//! messages until reconciliation rewrites them all.

use super::BlobStore;
use crate::message::Message;
use crate::{Error, Result};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Blob name of replica `index`
pub fn replica_name(index: usize) -> String {
    format!("replica_{}.json", index)
}

/// The `k` replica stores of one node
pub struct ReplicaSet {
    store: Arc<dyn BlobStore>,
    /// Serializes read-modify-write cycles per replica
    locks: Vec<Mutex<()>>,
}

impl ReplicaSet {
    pub fn new(store: Arc<dyn BlobStore>, count: usize) -> Self {
        Self {
            store,
            locks: (0..count).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Number of replicas (k)
    pub fn count(&self) -> usize {
        self.locks.len()
    }

    /// Read replica `index`. A replica that was never written is empty.
    pub fn load(&self, index: usize) -> Result<Vec<Message>> {
        let _guard = self.lock(index)?;
        self.read_unlocked(index)
    }

    /// Replace the contents of replica `index`
    pub fn write(&self, index: usize, messages: &[Message]) -> Result<()> {
        let _guard = self.lock(index)?;
        self.write_unlocked(index, messages)
    }

    /// Append one message to replica `index`.
    ///
    /// An unreadable replica is logged and restarted from empty; the next
    /// reconciliation refills it from the other copies.
    pub fn append(&self, index: usize, message: &Message) -> Result<()> {
        let _guard = self.lock(index)?;

        let mut messages = match self.read_unlocked(index) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(replica = index, error = %e, "Unreadable replica, appending to an empty copy");
                Vec::new()
            }
        };
        messages.push(message.clone());
        self.write_unlocked(index, &messages)
    }

    fn lock(&self, index: usize) -> Result<std::sync::MutexGuard<'_, ()>> {
        let lock = self
            .locks
            .get(index)
            .ok_or_else(|| Error::Storage(format!("No replica {} (have {})", index, self.count())))?;
        Ok(lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn read_unlocked(&self, index: usize) -> Result<Vec<Message>> {
        let name = replica_name(index);
        if !self.store.exists(&name) {
            return Ok(Vec::new());
        }
        let data = self.store.read_all(&name)?;
        serde_json::from_slice(&data)
            .map_err(|e| Error::Serialization(format!("Corrupt {}: {}", name, e)))
    }

    fn write_unlocked(&self, index: usize, messages: &[Message]) -> Result<()> {
        let data = serde_json::to_vec_pretty(messages)
            .map_err(|e| Error::Serialization(format!("Failed to encode replica {}: {}", index, e)))?;
        self.store.write_all(&replica_name(index), &data)
    }
}
