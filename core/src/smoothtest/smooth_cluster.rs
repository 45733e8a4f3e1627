//! A group of test nodes sharing one in-process hub

use super::SmoothNode;
use crate::network::MemoryHub;
use crate::node::NodeConfig;
use anyhow::Result;
use std::ops::{Index, IndexMut};

/// Nodes `n1..=nN` on a shared [`MemoryHub`]; `n1` starts with the token
pub struct SmoothCluster {
    hub: MemoryHub,
    nodes: Vec<SmoothNode>,
}

impl SmoothCluster {
    pub async fn new(count: usize) -> Result<Self> {
        Self::with_config(count, |_| {}).await
    }

    /// Build a cluster, adjusting each node's configuration before it starts
    pub async fn with_config<F>(count: usize, mut adjust: F) -> Result<Self>
    where
        F: FnMut(&mut NodeConfig),
    {
        let hub = MemoryHub::new();
        let mut nodes = Vec::with_capacity(count);
        for i in 1..=count {
            let mut config = SmoothNode::test_config(&format!("n{}", i), i == 1);
            adjust(&mut config);
            nodes.push(SmoothNode::prepare(&hub, config)?);
        }
        for node in &nodes {
            node.launch().await?;
        }
        Ok(Self { hub, nodes })
    }

    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }

    pub fn nodes(&self) -> &[SmoothNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SmoothNode> {
        self.nodes.iter()
    }

    /// How many nodes currently believe they hold the token
    pub async fn holder_count(&self) -> usize {
        let mut holders = 0;
        for node in &self.nodes {
            if node.node().has_token().await {
                holders += 1;
            }
        }
        holders
    }

    /// Restart node `index` over its own storage
    pub async fn restart(&mut self, index: usize) -> Result<()> {
        let node = self.nodes.remove(index);
        let node = node.restart().await?;
        self.nodes.insert(index, node);
        Ok(())
    }

    /// Restart node `index` without letting it write a final checkpoint
    pub async fn crash_and_restart(&mut self, index: usize) -> Result<()> {
        let node = self.nodes.remove(index);
        let node = node.crash_and_restart().await?;
        self.nodes.insert(index, node);
        Ok(())
    }

    pub async fn shutdown(&self) {
        for node in &self.nodes {
            node.shutdown().await;
        }
    }
}

impl Index<usize> for SmoothCluster {
    type Output = SmoothNode;

    fn index(&self, index: usize) -> &Self::Output {
        &self.nodes[index]
    }
}

impl IndexMut<usize> for SmoothCluster {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.nodes[index]
    }
}
