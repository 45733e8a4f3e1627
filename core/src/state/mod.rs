//! Per-process node state
//!
//! [`NodeState`] is the single aggregate every engine works on. The runtime
//! keeps it behind one async mutex; engines receive `&mut NodeState` and
//! never hold state of their own.

pub mod log;
pub mod queue;

pub use log::MessageLog;
pub use queue::RequestQueue;

use crate::types::{now_millis, NodeId, Timestamp, TokenState};

/// Identity, token position, pending requests and message log of one node
#[derive(Debug, Clone)]
pub struct NodeState {
    node_id: NodeId,
    pub(crate) token: TokenState,
    pub(crate) queue: RequestQueue,
    pub(crate) log: MessageLog,
    last_timestamp: Timestamp,
    pub(crate) last_checkpoint: Option<Timestamp>,
}

impl NodeState {
    /// Fresh state. `initial_token` marks the designated first holder.
    pub fn new(node_id: NodeId, initial_token: bool) -> Self {
        let token = if initial_token {
            TokenState::Holding
        } else {
            TokenState::Waiting
        };

        Self {
            node_id,
            token,
            queue: RequestQueue::new(),
            log: MessageLog::new(),
            last_timestamp: 0,
            last_checkpoint: None,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn token(&self) -> TokenState {
        self.token
    }

    pub fn has_token(&self) -> bool {
        self.token.is_holding()
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// When the last checkpoint was written successfully
    pub fn last_checkpoint(&self) -> Option<Timestamp> {
        self.last_checkpoint
    }

    /// Wall-clock timestamp for a new outgoing message, strictly greater
    /// than any this node issued before so `(sender, timestamp)` stays unique.
    pub fn next_timestamp(&mut self) -> Timestamp {
        let ts = now_millis().max(self.last_timestamp + 1);
        self.last_timestamp = ts;
        ts
    }

    /// Never issue a timestamp at or below `ts` again
    pub(crate) fn advance_timestamp(&mut self, ts: Timestamp) {
        self.last_timestamp = self.last_timestamp.max(ts);
    }
}
