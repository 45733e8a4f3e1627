//! Group messages exchanged over the transport
//!
//! Every message carries a `type` tag, the sender and a sender-local timestamp.
//! The JSON shape of these records is also the persisted replica format:
//!
//! ```json
//! { "type": "CHAT", "senderId": "n1", "content": "hi", "timestamp": 1700000000000 }
//! ```

use crate::types::{NodeId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A message broadcast to the group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Announces a node entering the group
    #[serde(rename = "JOIN", rename_all = "camelCase")]
    Join {
        sender_id: NodeId,
        content: String,
        timestamp: Timestamp,
    },

    /// Chat text, only emitted by the token holder
    #[serde(rename = "CHAT", rename_all = "camelCase")]
    Chat {
        sender_id: NodeId,
        content: String,
        timestamp: Timestamp,
    },

    /// Asks the current holder for the token
    #[serde(rename = "TOKEN_REQUEST", rename_all = "camelCase")]
    TokenRequest {
        sender_id: NodeId,
        timestamp: Timestamp,
    },

    /// Hands the token to `recipient_id` together with the requests still waiting
    #[serde(rename = "TOKEN_GRANT", rename_all = "camelCase")]
    TokenGrant {
        sender_id: NodeId,
        recipient_id: NodeId,
        timestamp: Timestamp,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        queue: Vec<NodeId>,
    },
}

/// Deduplication identity of a message
///
/// Field order gives the canonical log order: timestamp first, sender id
/// as the tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageKey {
    pub timestamp: Timestamp,
    pub sender_id: NodeId,
}

/// Message type tag without the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    Join,
    Chat,
    TokenRequest,
    TokenGrant,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Join => "JOIN",
            Self::Chat => "CHAT",
            Self::TokenRequest => "TOKEN_REQUEST",
            Self::TokenGrant => "TOKEN_GRANT",
        };
        f.write_str(tag)
    }
}

/// Which engine handles an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Replication,
    MutualExclusion,
}

impl Message {
    pub fn join(sender_id: NodeId, timestamp: Timestamp) -> Self {
        let content = format!("Node {} joined the chat", sender_id);
        Self::Join {
            sender_id,
            content,
            timestamp,
        }
    }

    pub fn chat(sender_id: NodeId, content: impl Into<String>, timestamp: Timestamp) -> Self {
        Self::Chat {
            sender_id,
            content: content.into(),
            timestamp,
        }
    }

    pub fn token_request(sender_id: NodeId, timestamp: Timestamp) -> Self {
        Self::TokenRequest {
            sender_id,
            timestamp,
        }
    }

    pub fn token_grant(
        sender_id: NodeId,
        recipient_id: NodeId,
        queue: Vec<NodeId>,
        timestamp: Timestamp,
    ) -> Self {
        Self::TokenGrant {
            sender_id,
            recipient_id,
            timestamp,
            queue,
        }
    }

    pub fn sender_id(&self) -> &NodeId {
        match self {
            Self::Join { sender_id, .. }
            | Self::Chat { sender_id, .. }
            | Self::TokenRequest { sender_id, .. }
            | Self::TokenGrant { sender_id, .. } => sender_id,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Join { timestamp, .. }
            | Self::Chat { timestamp, .. }
            | Self::TokenRequest { timestamp, .. }
            | Self::TokenGrant { timestamp, .. } => *timestamp,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Join { content, .. } | Self::Chat { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Join { .. } => MessageKind::Join,
            Self::Chat { .. } => MessageKind::Chat,
            Self::TokenRequest { .. } => MessageKind::TokenRequest,
            Self::TokenGrant { .. } => MessageKind::TokenGrant,
        }
    }

    pub fn key(&self) -> MessageKey {
        MessageKey {
            timestamp: self.timestamp(),
            sender_id: self.sender_id().clone(),
        }
    }

    /// Dispatch on the type tag
    pub fn route(&self) -> Route {
        match self.kind() {
            MessageKind::Join | MessageKind::Chat => Route::Replication,
            MessageKind::TokenRequest | MessageKind::TokenGrant => Route::MutualExclusion,
        }
    }

    /// CHAT and JOIN end up in the message log; token traffic never does
    pub fn is_replicated(&self) -> bool {
        self.route() == Route::Replication
    }
}
