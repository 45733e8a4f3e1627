//! Property-based tests for replica reconciliation
//!
//! - Convergence: after one run every replica and the log hold the same set
//! - Ordering: the result is sorted by (timestamp, sender) without duplicate keys
//! - Idempotence: a second run rewrites byte-identical replicas

use super::{DelayPolicy, ReplicationEngine};
use crate::message::Message;
use crate::state::NodeState;
use crate::storage::{replica_name, BlobStore, MemoryBlobStore, ReplicaSet};
use crate::types::NodeId;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Small key space so that duplicates and same-key conflicts are common
fn arb_message() -> impl Strategy<Value = Message> {
    (0u8..4, 0u64..8, "[a-c]{0,3}", any::<bool>()).prop_map(|(sender, ts, content, join)| {
        let sender = NodeId::new(format!("n{}", sender));
        if join {
            Message::join(sender, ts)
        } else {
            Message::chat(sender, content, ts)
        }
    })
}

fn arb_replicas() -> impl Strategy<Value = Vec<Vec<Message>>> {
    prop::collection::vec(prop::collection::vec(arb_message(), 0..12), 1..5)
}

fn seeded(contents: &[Vec<Message>]) -> (Arc<MemoryBlobStore>, ReplicationEngine) {
    let store = Arc::new(MemoryBlobStore::new());
    let replicas = Arc::new(ReplicaSet::new(store.clone(), contents.len()));
    for (index, messages) in contents.iter().enumerate() {
        replicas.write(index, messages).unwrap();
    }
    (store, ReplicationEngine::new(replicas, DelayPolicy::none()))
}

proptest! {
    #[test]
    fn test_all_replicas_converge(contents in arb_replicas(), local in prop::collection::vec(arb_message(), 0..5)) {
        let (_store, engine) = seeded(&contents);
        let mut state = NodeState::new(NodeId::new("local"), false);
        for message in local.iter().cloned() {
            state.log.insert(message);
        }

        engine.reconcile(&mut state);

        let expected = state.log().to_vec();
        for index in 0..contents.len() {
            prop_assert_eq!(engine.replicas().load(index).unwrap(), expected.clone());
        }

        let all_keys: BTreeSet<_> = contents.iter().flatten().chain(local.iter()).map(Message::key).collect();
        let merged_keys: Vec<_> = expected.iter().map(Message::key).collect();
        prop_assert_eq!(merged_keys, all_keys.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_reconcile_idempotent(contents in arb_replicas()) {
        let (store, engine) = seeded(&contents);
        let mut state = NodeState::new(NodeId::new("local"), false);

        engine.reconcile(&mut state);
        let first: Vec<_> = (0..contents.len()).map(|i| store.read_all(&replica_name(i)).unwrap()).collect();
        let log_after_first = state.log().clone();

        engine.reconcile(&mut state);
        let second: Vec<_> = (0..contents.len()).map(|i| store.read_all(&replica_name(i)).unwrap()).collect();

        prop_assert_eq!(first, second);
        prop_assert_eq!(&log_after_first, state.log());
    }

    #[test]
    fn test_merge_order_does_not_matter(contents in arb_replicas()) {
        let mut reversed = contents.clone();
        reversed.reverse();
        for replica in reversed.iter_mut() {
            replica.reverse();
        }

        let (_a, forward) = seeded(&contents);
        let (_b, backward) = seeded(&reversed);
        let mut left = NodeState::new(NodeId::new("local"), false);
        let mut right = NodeState::new(NodeId::new("local"), false);

        forward.reconcile(&mut left);
        backward.reconcile(&mut right);

        prop_assert_eq!(left.log(), right.log());
    }
}
