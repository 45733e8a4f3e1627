//! Networking module
//!
//! Best-effort group broadcast. A transport takes opaque datagrams from the
//! node and hands every datagram seen on the group back as a [`NetworkEvent`],
//! including the node's own (multicast loopback). Nothing is ordered,
//! acknowledged or deduplicated.

pub mod codec;
pub mod memory;
pub mod metrics;
pub mod multicast;

pub use codec::{decode_frame, encode_frame, WireFrame};
pub use memory::{MemoryHub, MemoryTransport};
pub use metrics::{KindMetrics, ProtocolMetrics};
pub use multicast::{MulticastConfig, MulticastTransport};

use crate::Result;
use bytes::Bytes;

/// Event delivered by a transport's receive side
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A datagram arrived from the group
    Datagram { data: Bytes, source: String },
}

/// Send side of a group transport
pub trait Transport: Send + Sync {
    /// Queue a datagram for every group member. Fire-and-forget: never waits
    /// for the wire and gives no delivery guarantee.
    fn send(&self, data: Bytes) -> Result<()>;

    /// Leave the group. Later sends fail.
    fn close(&self);
}
