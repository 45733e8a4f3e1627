//! Pending token requests

use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// FIFO of requester ids without duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestQueue(VecDeque<NodeId>);

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` unless it is already waiting. Returns `true` if added.
    pub fn push(&mut self, id: NodeId) -> bool {
        if self.0.contains(&id) {
            return false;
        }
        self.0.push_back(id);
        true
    }

    pub fn pop_front(&mut self) -> Option<NodeId> {
        self.0.pop_front()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.0.iter()
    }

    /// Empty the queue, returning its entries in order
    pub fn take(&mut self) -> Vec<NodeId> {
        self.0.drain(..).collect()
    }

    pub fn to_vec(&self) -> Vec<NodeId> {
        self.0.iter().cloned().collect()
    }
}

impl FromIterator<NodeId> for RequestQueue {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        let mut queue = Self::new();
        for id in iter {
            queue.push(id);
        }
        queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_without_duplicates() {
        let mut queue = RequestQueue::new();
        assert!(queue.push("b".into()));
        assert!(queue.push("c".into()));
        assert!(!queue.push("b".into()));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_front(), Some(NodeId::new("b")));
        assert_eq!(queue.pop_front(), Some(NodeId::new("c")));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn test_collect_drops_repeats() {
        let queue: RequestQueue = ["a", "b", "a"].into_iter().map(NodeId::from).collect();
        assert_eq!(queue.to_vec(), vec![NodeId::new("a"), NodeId::new("b")]);
    }
}
