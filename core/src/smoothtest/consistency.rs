//! Utilities for waiting until a group settles

use super::SmoothNode;
use crate::types::NodeId;
use anyhow::{bail, Result};
use std::future::Future;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Poll `check` until it returns `true` or `timeout` passes
pub async fn await_condition<F, Fut>(timeout: Duration, what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if check().await {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            bail!("Timed out after {:?} waiting for {}", timeout, what);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Wait until every node's log holds exactly `expected` messages
pub async fn await_message_count(timeout: Duration, nodes: &[SmoothNode], expected: usize) -> Result<()> {
    await_condition(timeout, &format!("{} messages on every node", expected), || async move {
        for node in nodes {
            if node.node().messages().await.len() != expected {
                return false;
            }
        }
        true
    })
    .await
}

/// Wait until `holder` holds the token
pub async fn await_token_holder(timeout: Duration, nodes: &[SmoothNode], holder: &NodeId) -> Result<()> {
    let node = nodes
        .iter()
        .find(|n| n.id() == holder)
        .ok_or_else(|| anyhow::anyhow!("no node {}", holder))?;
    await_condition(timeout, &format!("{} to hold the token", holder), || async move {
        node.node().has_token().await
    })
    .await
}

/// Wait until all nodes hold identical logs
pub async fn await_converged(timeout: Duration, nodes: &[SmoothNode]) -> Result<()> {
    await_condition(timeout, "identical logs", || async move {
        let mut logs = Vec::with_capacity(nodes.len());
        for node in nodes {
            logs.push(node.node().messages().await);
        }
        logs.windows(2).all(|pair| pair[0] == pair[1])
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smoothtest::SmoothCluster;

    #[tokio::test]
    async fn test_condition_timeout() {
        let result = await_condition(Duration::from_millis(50), "never", || async { false }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_joins_are_replicated_everywhere() {
        let cluster = SmoothCluster::new(3).await.unwrap();
        await_message_count(Duration::from_secs(2), cluster.nodes(), 3)
            .await
            .unwrap();
        await_converged(Duration::from_secs(2), cluster.nodes()).await.unwrap();
        cluster.shutdown().await;
    }
}
