//! Replication engine
//!
//! Incoming chat is stored in the in-memory log right away and copied into
//! each of the `k` replica stores after independent random delays, so the
//! replicas drift apart. [`ReplicationEngine::reconcile`] brings them back
//! to one identical, de-duplicated and ordered set.

mod delay;

#[cfg(test)]
mod convergence_tests;

pub use delay::DelayPolicy;

use crate::message::Message;
use crate::state::{MessageLog, NodeState};
use crate::storage::ReplicaSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Summary of one reconciliation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Replicas that loaded cleanly (missing counts as an empty, clean load)
    pub replicas_read: usize,
    /// Replicas that could not be read and were treated as empty
    pub unreadable: usize,
    /// Distinct messages after the merge
    pub unique: usize,
    /// Replicas whose rewrite failed
    pub failed_writes: usize,
}

pub struct ReplicationEngine {
    replicas: Arc<ReplicaSet>,
    delay: DelayPolicy,
}

impl ReplicationEngine {
    pub fn new(replicas: Arc<ReplicaSet>, delay: DelayPolicy) -> Self {
        Self { replicas, delay }
    }

    pub fn replicas(&self) -> &Arc<ReplicaSet> {
        &self.replicas
    }

    pub fn delay(&self) -> DelayPolicy {
        self.delay
    }

    /// Schedule storage of a received message.
    ///
    /// Only CHAT and JOIN are replicated; anything else returns `None`.
    pub fn handle_incoming(
        self: &Arc<Self>,
        state: Arc<Mutex<NodeState>>,
        message: Message,
    ) -> Option<JoinHandle<()>> {
        if !message.is_replicated() {
            return None;
        }

        let engine = Arc::clone(self);
        let wait = self.delay.sample();
        Some(tokio::spawn(async move {
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            let mut state = state.lock().await;
            engine.store_message(&mut state, message);
        }))
    }

    /// Insert `message` into the log and schedule one append per replica.
    ///
    /// The returned handles finish when the corresponding replica write has
    /// been attempted. Dropping them does not cancel the writes.
    pub fn store_message(&self, state: &mut NodeState, message: Message) -> Vec<JoinHandle<()>> {
        let fresh = state.log.insert(message.clone());
        debug!(
            node_id = %state.node_id(),
            sender = %message.sender_id(),
            timestamp = message.timestamp(),
            fresh,
            "Storing message"
        );

        (0..self.replicas.count())
            .map(|index| {
                let replicas = Arc::clone(&self.replicas);
                let message = message.clone();
                let wait = self.delay.sample();
                tokio::spawn(async move {
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    if let Err(e) = replicas.append(index, &message) {
                        warn!(replica = index, error = %e, "Replica append failed");
                    }
                })
            })
            .collect()
    }

    /// Merge every replica with the in-memory log and write the result back
    /// everywhere. Running it twice without new messages changes nothing.
    pub fn reconcile(&self, state: &mut NodeState) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut merged: MessageLog = state.log.clone();

        for index in 0..self.replicas.count() {
            match self.replicas.load(index) {
                Ok(messages) => {
                    report.replicas_read += 1;
                    merged.merge(messages);
                }
                Err(e) => {
                    report.unreadable += 1;
                    warn!(replica = index, error = %e, "Treating unreadable replica as empty");
                }
            }
        }

        let ordered = merged.to_vec();
        for index in 0..self.replicas.count() {
            if let Err(e) = self.replicas.write(index, &ordered) {
                report.failed_writes += 1;
                warn!(replica = index, error = %e, "Replica rewrite failed");
            }
        }

        report.unique = ordered.len();
        state.log = merged;

        info!(
            node_id = %state.node_id(),
            unique = report.unique,
            unreadable = report.unreadable,
            failed_writes = report.failed_writes,
            "Reconciliation complete"
        );
        report
    }
}
