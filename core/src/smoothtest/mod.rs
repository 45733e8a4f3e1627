//! SmoothTest - in-process test harness for ringchat groups
//!
//! Runs several real [`Node`](crate::Node)s in one process, wired through a
//! [`MemoryHub`](crate::network::MemoryHub) instead of UDP multicast, with
//! in-memory storage and no replication delay.
//!
//! # Architecture
//!
//! - `SmoothNode`: one node plus its event stream and its own blob store
//! - `SmoothCluster`: nodes `n1..nN` on a shared hub, `n1` holding the token
//! - `await_*` helpers that poll until the group reaches a condition
//!
//! # Example
//!
//! ```no_run
//! use ringchat_core::smoothtest::*;
//! use std::time::Duration;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let cluster = SmoothCluster::new(3).await?;
//! cluster[0].node().send_chat("hello").await?;
//! await_message_count(Duration::from_secs(2), cluster.nodes(), 4).await?;
//! # Ok(())
//! # }
//! ```

mod consistency;
mod smooth_cluster;
mod smooth_node;

pub use consistency::{await_condition, await_converged, await_message_count, await_token_holder};
pub use smooth_cluster::SmoothCluster;
pub use smooth_node::SmoothNode;
