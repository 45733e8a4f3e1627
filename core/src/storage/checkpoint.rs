//! Checkpoint engine
//!
//! Snapshots the durable part of [`NodeState`] into `checkpoint.json` and
//! restores it once at start-up. Checkpointing is purely local: it never
//! touches the replicas or the network.

use super::BlobStore;
use crate::message::Message;
use crate::state::{MessageLog, NodeState, RequestQueue};
use crate::types::{now_millis, NodeId, Timestamp, TokenState};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Blob name of the checkpoint
pub const CHECKPOINT_NAME: &str = "checkpoint.json";

/// Number of restored messages reported back for context
pub const RESTORE_TAIL: usize = 5;

/// Serialized snapshot of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub node_id: NodeId,
    #[serde(alias = "timestamp")]
    pub created_at: Timestamp,
    #[serde(default)]
    pub has_token: bool,
    #[serde(default)]
    pub request_queue: Vec<NodeId>,
    #[serde(default)]
    pub message_log: Vec<Message>,
}

impl Checkpoint {
    /// Snapshot `state` as of `created_at`
    pub fn capture(state: &NodeState, created_at: Timestamp) -> Self {
        Self {
            node_id: state.node_id().clone(),
            created_at,
            has_token: state.has_token(),
            request_queue: state.queue().to_vec(),
            message_log: state.log().to_vec(),
        }
    }

    /// Overwrite the durable fields of `state` with this snapshot
    pub fn apply(&self, state: &mut NodeState) {
        let own = state.node_id().clone();

        state.log = MessageLog::from(self.message_log.clone());
        let own_latest = self
            .message_log
            .iter()
            .filter(|m| *m.sender_id() == own)
            .map(Message::timestamp)
            .max();
        if let Some(ts) = own_latest {
            state.advance_timestamp(ts);
        }
        state.token = if self.has_token {
            TokenState::Holding
        } else {
            TokenState::Waiting
        };
        state.queue = self
            .request_queue
            .iter()
            .filter(|id| **id != own)
            .cloned()
            .collect::<RequestQueue>();
        state.last_checkpoint = Some(self.created_at);
    }
}

/// What start-up restore found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// State was loaded from a checkpoint
    Restored {
        messages: usize,
        has_token: bool,
        taken_at: Timestamp,
        /// The last few restored messages, oldest first
        recent: Vec<Message>,
    },
    /// No checkpoint, fresh state
    Fresh,
    /// A checkpoint existed but was unusable; fresh state
    Discarded(String),
}

/// Writes and reads `checkpoint.json`
pub struct CheckpointEngine {
    store: Arc<dyn BlobStore>,
}

impl CheckpointEngine {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Write a checkpoint of `state`, replacing the previous one.
    ///
    /// On failure `state` is left exactly as it was.
    pub fn create(&self, state: &mut NodeState) -> Result<Checkpoint> {
        let checkpoint = Checkpoint::capture(state, now_millis());
        let data = serde_json::to_vec_pretty(&checkpoint)
            .map_err(|e| Error::Serialization(format!("Failed to encode checkpoint: {}", e)))?;

        self.store.write_all(CHECKPOINT_NAME, &data)?;
        state.last_checkpoint = Some(checkpoint.created_at);

        debug!(
            node_id = %checkpoint.node_id,
            messages = checkpoint.message_log.len(),
            has_token = checkpoint.has_token,
            "Checkpoint written"
        );
        Ok(checkpoint)
    }

    /// Read the stored checkpoint for `node_id`.
    ///
    /// `Ok(None)` when none exists; an error when it cannot be parsed or was
    /// written by another node.
    pub fn load(&self, node_id: &NodeId) -> Result<Option<Checkpoint>> {
        if !self.store.exists(CHECKPOINT_NAME) {
            return Ok(None);
        }

        let data = self.store.read_all(CHECKPOINT_NAME)?;
        let checkpoint: Checkpoint = serde_json::from_slice(&data)
            .map_err(|e| Error::Serialization(format!("Corrupt checkpoint: {}", e)))?;

        if &checkpoint.node_id != node_id {
            return Err(Error::CheckpointMismatch {
                expected: node_id.clone(),
                found: checkpoint.node_id,
            });
        }
        Ok(Some(checkpoint))
    }

    /// Populate `state` from the stored checkpoint, if there is a usable one
    pub fn restore(&self, state: &mut NodeState) -> RestoreOutcome {
        match self.load(state.node_id()) {
            Ok(Some(checkpoint)) => {
                checkpoint.apply(state);
                info!(
                    node_id = %state.node_id(),
                    messages = state.log().len(),
                    has_token = state.has_token(),
                    "Restored from checkpoint"
                );
                RestoreOutcome::Restored {
                    messages: state.log().len(),
                    has_token: state.has_token(),
                    taken_at: checkpoint.created_at,
                    recent: state.log().recent(RESTORE_TAIL),
                }
            }
            Ok(None) => {
                info!(node_id = %state.node_id(), "No checkpoint found, starting fresh");
                RestoreOutcome::Fresh
            }
            Err(e) => {
                warn!(node_id = %state.node_id(), error = %e, "Ignoring unusable checkpoint");
                RestoreOutcome::Discarded(e.to_string())
            }
        }
    }
}
