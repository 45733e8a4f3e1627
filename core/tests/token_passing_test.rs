//! Token passing across a simulated group

use ringchat_core::smoothtest::*;
use ringchat_core::{Error, NodeEvent, NodeId, TokenState};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(3);

async fn await_queue_len(node: &SmoothNode, len: usize) -> anyhow::Result<()> {
    await_condition(TIMEOUT, &format!("queue of {} on {}", len, node.id()), || async move {
        node.node().status().await.queue.len() == len
    })
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_grant_goes_to_b_then_c() -> anyhow::Result<()> {
    let cluster = SmoothCluster::new(3).await?;
    let (a, b, c) = (&cluster[0], &cluster[1], &cluster[2]);

    b.node().request_token().await?;
    await_queue_len(a, 1).await?;
    c.node().request_token().await?;
    await_queue_len(a, 2).await?;
    assert_eq!(
        a.node().status().await.queue,
        vec![NodeId::new("n2"), NodeId::new("n3")]
    );

    // A sends, then releases to B as part of the send
    a.node().send_chat("hello from A").await?;
    await_token_holder(TIMEOUT, cluster.nodes(), b.id()).await?;
    assert!(!a.node().has_token().await);
    assert_eq!(b.node().status().await.queue, vec![NodeId::new("n3")]);
    assert_eq!(cluster.holder_count().await, 1);

    // C's request only ever reached A, yet B hands the token on to C
    b.node().send_chat("hello from B").await?;
    await_token_holder(TIMEOUT, cluster.nodes(), c.id()).await?;
    assert_eq!(cluster.holder_count().await, 1);
    assert_eq!(c.node().status().await.token, TokenState::Holding);

    // C has nobody waiting and keeps the token after sending
    c.node().send_chat("hello from C").await?;
    assert!(c.node().has_token().await);

    cluster.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_requests_are_served_in_arrival_order() -> anyhow::Result<()> {
    let cluster = SmoothCluster::new(4).await?;

    for (i, requester) in cluster.iter().enumerate().skip(1) {
        requester.node().request_token().await?;
        await_queue_len(&cluster[0], i).await?;
    }

    assert_eq!(cluster[0].node().release_token().await?, Some(NodeId::new("n2")));
    for next in 1..4 {
        await_token_holder(TIMEOUT, cluster.nodes(), cluster[next].id()).await?;
        assert_eq!(cluster.holder_count().await, 1);
        cluster[next].node().send_chat(&format!("turn {}", next)).await?;
    }

    // Grants were observed in order n2, n3, n4
    let mut acquired = Vec::new();
    for node in cluster.iter().skip(1) {
        for event in node.drain_events().await {
            if let NodeEvent::TokenAcquired { from } = event {
                acquired.push((node.id().clone(), from));
            }
        }
    }
    assert_eq!(
        acquired,
        vec![
            (NodeId::new("n2"), NodeId::new("n1")),
            (NodeId::new("n3"), NodeId::new("n2")),
            (NodeId::new("n4"), NodeId::new("n3")),
        ]
    );

    cluster.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_single_holder_through_many_rounds() -> anyhow::Result<()> {
    let cluster = SmoothCluster::new(3).await?;
    let mut holder = 0;

    for round in 0..9 {
        let next = (holder + 1) % cluster.len();
        cluster[next].node().request_token().await?;
        await_queue_len(&cluster[holder], 1).await?;

        cluster[holder].node().send_chat(&format!("round {}", round)).await?;
        await_token_holder(TIMEOUT, cluster.nodes(), cluster[next].id()).await?;
        assert_eq!(cluster.holder_count().await, 1, "round {}", round);
        holder = next;
    }

    await_message_count(TIMEOUT, cluster.nodes(), 3 + 9).await?;
    await_converged(TIMEOUT, cluster.nodes()).await?;
    cluster.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_without_token_never_reaches_the_group() -> anyhow::Result<()> {
    let cluster = SmoothCluster::new(2).await?;
    await_message_count(TIMEOUT, cluster.nodes(), 2).await?;

    let refused = cluster[1].node().send_chat("sneaky").await;
    assert!(matches!(refused, Err(Error::NotTokenHolder(_))));

    tokio::time::sleep(Duration::from_millis(100)).await;
    for node in cluster.iter() {
        assert!(node
            .node()
            .messages()
            .await
            .iter()
            .all(|m| m.content() != Some("sneaky")));
    }

    cluster.shutdown().await;
    Ok(())
}
