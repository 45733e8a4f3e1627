//! Single test node with in-memory storage

use crate::network::MemoryHub;
use crate::node::{Node, NodeConfig, NodeEvent};
use crate::replication::DelayPolicy;
use crate::storage::MemoryBlobStore;
use crate::types::NodeId;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// A started node on a [`MemoryHub`]
///
/// The blob store outlives the node, so [`SmoothNode::restart`] simulates a
/// crash-and-restart over the same storage.
pub struct SmoothNode {
    node: Node,
    events: Mutex<mpsc::UnboundedReceiver<NodeEvent>>,
    store: Arc<MemoryBlobStore>,
    hub: MemoryHub,
    config: NodeConfig,
}

impl SmoothNode {
    /// Zero-delay configuration for `id`
    pub fn test_config(id: &str, initial_token: bool) -> NodeConfig {
        NodeConfig {
            replication_delay: DelayPolicy::none(),
            initial_token,
            ..NodeConfig::for_node(id)
        }
    }

    /// Join `hub` as `id` and start
    pub async fn start(hub: &MemoryHub, id: &str, initial_token: bool) -> Result<Self> {
        Self::with_config(hub, Self::test_config(id, initial_token)).await
    }

    pub async fn with_config(hub: &MemoryHub, config: NodeConfig) -> Result<Self> {
        let node = Self::prepare(hub, config)?;
        node.launch().await?;
        Ok(node)
    }

    /// Join `hub` without starting, so a whole group can be wired up before
    /// anyone announces itself
    pub fn prepare(hub: &MemoryHub, config: NodeConfig) -> Result<Self> {
        Self::assemble(hub.clone(), config, Arc::new(MemoryBlobStore::new()))
    }

    /// Start a prepared node
    pub async fn launch(&self) -> Result<()> {
        self.node.start().await?;
        Ok(())
    }

    fn assemble(hub: MemoryHub, config: NodeConfig, store: Arc<MemoryBlobStore>) -> Result<Self> {
        let (transport, network_rx) = hub.join(config.node_id.as_str());
        let (node, events) = Node::with_store(config.clone(), store.clone(), Arc::new(transport), network_rx)?;

        Ok(Self {
            node,
            events: Mutex::new(events),
            store,
            hub,
            config,
        })
    }

    async fn boot(hub: MemoryHub, config: NodeConfig, store: Arc<MemoryBlobStore>) -> Result<Self> {
        let node = Self::assemble(hub, config, store)?;
        node.launch().await?;
        Ok(node)
    }

    /// Stop the node gracefully and boot a new one over the same storage.
    /// The new node never starts with the token unless its checkpoint says so.
    pub async fn restart(self) -> Result<Self> {
        self.node.shutdown().await;
        let config = NodeConfig {
            initial_token: false,
            ..self.config
        };
        Self::boot(self.hub, config, self.store).await
    }

    /// Stop without the final checkpoint, as a crash would
    pub async fn crash_and_restart(self) -> Result<Self> {
        self.store.set_fail_writes(true);
        self.node.shutdown().await;
        self.store.set_fail_writes(false);
        let config = NodeConfig {
            initial_token: false,
            ..self.config
        };
        Self::boot(self.hub, config, self.store).await
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn id(&self) -> &NodeId {
        self.node.node_id()
    }

    pub fn store(&self) -> &Arc<MemoryBlobStore> {
        &self.store
    }

    /// Everything emitted so far, without waiting
    pub async fn drain_events(&self) -> Vec<NodeEvent> {
        let mut events = self.events.lock().await;
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub async fn shutdown(&self) {
        self.node.shutdown().await;
    }
}
