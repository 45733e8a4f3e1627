//! Replication and reconciliation through running nodes

use ringchat_core::smoothtest::*;
use ringchat_core::storage::{replica_name, BlobStore, ReplicaSet};
use ringchat_core::{DelayPolicy, Message, NodeEvent, NodeId};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(3);

fn replica_contents(node: &SmoothNode) -> Vec<Vec<Message>> {
    let replicas = ReplicaSet::new(node.store().clone(), node.node().config().replica_count);
    (0..replicas.count()).map(|i| replicas.load(i).unwrap()).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_lands_in_every_log_and_replica() -> anyhow::Result<()> {
    let cluster = SmoothCluster::new(3).await?;
    cluster[0].node().send_chat("replicate me").await?;

    await_message_count(TIMEOUT, cluster.nodes(), 4).await?;
    await_converged(TIMEOUT, cluster.nodes()).await?;

    for node in cluster.iter() {
        let log = node.node().messages().await;
        await_condition(TIMEOUT, "replica appends", || {
            let log = log.clone();
            async move {
                replica_contents(node)
                    .iter()
                    .all(|replica| log.iter().all(|m| replica.contains(m)))
            }
        })
        .await?;
    }

    cluster.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_divergent_replicas_converge_after_reconcile() -> anyhow::Result<()> {
    let cluster = SmoothCluster::new(1).await?;
    let node = &cluster[0];
    await_message_count(TIMEOUT, cluster.nodes(), 1).await?;
    await_condition(TIMEOUT, "join appended", || async {
        replica_contents(node).iter().all(|replica| replica.len() == 1)
    })
    .await?;

    let n1 = Message::chat(NodeId::new("n1"), "one", 1);
    let n2 = Message::chat(NodeId::new("n2"), "two", 2);
    let replicas = ReplicaSet::new(node.store().clone(), 3);
    replicas.write(0, &[n1.clone()])?;
    replicas.write(1, &[n1.clone(), n2.clone(), n1.clone()])?;
    replicas.write(2, &[])?;

    let report = node.node().reconcile().await;
    assert_eq!(report.unique, 3);
    assert_eq!(report.failed_writes, 0);

    let contents = replica_contents(node);
    assert_eq!(contents[0], contents[1]);
    assert_eq!(contents[1], contents[2]);
    assert_eq!(contents[0], node.node().messages().await);
    assert_eq!(&contents[0][..2], &[n1, n2]);

    // A second run changes nothing
    let before: Vec<_> = (0..3).map(|i| node.store().read_all(&replica_name(i)).unwrap()).collect();
    node.node().reconcile().await;
    let after: Vec<_> = (0..3).map(|i| node.store().read_all(&replica_name(i)).unwrap()).collect();
    assert_eq!(before, after);

    assert!(node
        .drain_events()
        .await
        .iter()
        .any(|e| matches!(e, NodeEvent::Reconciled(_))));
    cluster.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delayed_replication_eventually_stores() -> anyhow::Result<()> {
    let cluster = SmoothCluster::with_config(2, |config| {
        config.replication_delay = DelayPolicy::from_millis(10, 60);
    })
    .await?;

    cluster[0].node().send_chat("slow").await?;
    await_message_count(TIMEOUT, cluster.nodes(), 3).await?;
    await_converged(TIMEOUT, cluster.nodes()).await?;
    cluster.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_periodic_reconcile_runs() -> anyhow::Result<()> {
    let cluster = SmoothCluster::with_config(1, |config| {
        config.reconcile_interval = Duration::from_millis(50);
    })
    .await?;
    let node = &cluster[0];

    let stray = Message::chat(NodeId::new("n9"), "found on disk", 5);
    let replicas = ReplicaSet::new(Arc::clone(node.store()) as Arc<dyn BlobStore>, 3);
    replicas.write(2, &[stray.clone()])?;

    await_condition(TIMEOUT, "timer-driven reconcile", || async {
        node.node().messages().await.contains(&stray)
    })
    .await?;
    cluster.shutdown().await;
    Ok(())
}
