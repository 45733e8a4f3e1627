/// Protocol traffic metrics
///
/// Tracks per-message-type traffic and rejected datagrams

use crate::message::MessageKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Counters for one message type
#[derive(Debug, Clone)]
pub struct KindMetrics {
    /// Message type
    pub kind: MessageKind,

    /// Number of messages broadcast by this node
    pub sent: u64,

    /// Number of messages received from the group (own loopback included)
    pub received: u64,

    /// Received messages whose key was already in the log
    pub duplicates: u64,

    /// Last activity timestamp
    pub last_activity: Instant,
}

impl KindMetrics {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            sent: 0,
            received: 0,
            duplicates: 0,
            last_activity: Instant::now(),
        }
    }
}

/// Traffic statistics shared between the node's tasks
#[derive(Debug, Clone, Default)]
pub struct ProtocolMetrics {
    metrics: Arc<RwLock<HashMap<MessageKind, KindMetrics>>>,
    malformed: Arc<AtomicU64>,
}

impl ProtocolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message broadcast
    pub async fn record_send(&self, kind: MessageKind) {
        let mut metrics = self.metrics.write().await;
        let entry = metrics.entry(kind).or_insert_with(|| KindMetrics::new(kind));
        entry.sent += 1;
        entry.last_activity = Instant::now();
    }

    /// Record a message received
    pub async fn record_receive(&self, kind: MessageKind, is_duplicate: bool) {
        let mut metrics = self.metrics.write().await;
        let entry = metrics.entry(kind).or_insert_with(|| KindMetrics::new(kind));
        entry.received += 1;
        if is_duplicate {
            entry.duplicates += 1;
        }
        entry.last_activity = Instant::now();
    }

    /// Record a datagram that failed to decode
    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Get metrics for one message type
    pub async fn get(&self, kind: MessageKind) -> Option<KindMetrics> {
        self.metrics.read().await.get(&kind).cloned()
    }

    /// All message types seen so far, in tag order
    pub async fn all(&self) -> Vec<KindMetrics> {
        let metrics = self.metrics.read().await;
        let mut all: Vec<_> = metrics.values().cloned().collect();
        all.sort_by_key(|m| m.kind);
        all
    }
}
