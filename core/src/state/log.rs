//! In-memory message log
//!
//! A map from [`MessageKey`] to message, iterated in canonical order
//! (timestamp, then sender id). Inserting a key twice keeps one entry; when
//! the copies disagree the one with the lexicographically larger content
//! survives, so the outcome does not depend on arrival order.

use crate::message::{Message, MessageKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// De-duplicated, canonically ordered set of messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Message>", into = "Vec<Message>")]
pub struct MessageLog {
    entries: BTreeMap<MessageKey, Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message. Returns `true` if its key was not present before.
    pub fn insert(&mut self, message: Message) -> bool {
        let key = message.key();
        match self.entries.get_mut(&key) {
            Some(existing) => {
                if message.content() > existing.content() {
                    *existing = message;
                }
                false
            }
            None => {
                self.entries.insert(key, message);
                true
            }
        }
    }

    /// Insert every message from `messages`
    pub fn merge<I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = Message>,
    {
        for message in messages {
            self.insert(message);
        }
    }

    pub fn contains(&self, key: &MessageKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &MessageKey) -> Option<&Message> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Messages in canonical order
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.values()
    }

    /// The `n` most recent messages, oldest first
    pub fn recent(&self, n: usize) -> Vec<Message> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.values().skip(skip).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.entries.values().cloned().collect()
    }
}

impl From<Vec<Message>> for MessageLog {
    fn from(messages: Vec<Message>) -> Self {
        messages.into_iter().collect()
    }
}

impl From<MessageLog> for Vec<Message> {
    fn from(log: MessageLog) -> Self {
        log.entries.into_values().collect()
    }
}

impl FromIterator<Message> for MessageLog {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        let mut log = Self::new();
        log.merge(iter);
        log
    }
}
