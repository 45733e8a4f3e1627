//! Node runtime
//!
//! Ties the engines to a transport and to durable storage. One [`Node`] runs
//! per process: a receive loop decodes datagrams and routes them to the
//! mutual exclusion or replication engine, two timers drive reconciliation
//! and checkpoints, and user commands call the public methods. All of them
//! share one [`NodeState`] behind a single async mutex.

use crate::message::{Message, Route};
use crate::network::{decode_frame, encode_frame, NetworkEvent, ProtocolMetrics, Transport};
use crate::replication::{DelayPolicy, ReconcileReport, ReplicationEngine};
use crate::state::NodeState;
use crate::storage::{BlobStore, Checkpoint, CheckpointEngine, FsBlobStore, ReplicaSet, RestoreOutcome};
use crate::token::{self, RequestOutcome, TokenEvent};
use crate::types::{NodeId, Timestamp, TokenState};
use crate::{Error, Result};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: NodeId,

    /// Holds `checkpoint.json` and the replica files
    pub data_dir: PathBuf,

    /// Number of replica stores (k)
    pub replica_count: usize,

    pub replication_delay: DelayPolicy,

    pub reconcile_interval: Duration,

    pub checkpoint_interval: Duration,

    /// Start as the token holder when no checkpoint says otherwise
    pub initial_token: bool,

    /// Pass the token on right after each chat message
    pub release_after_send: bool,
}

impl NodeConfig {
    /// Defaults for `node_id`, with data in `node_<id>_data`
    pub fn for_node(node_id: impl Into<NodeId>) -> Self {
        let node_id = node_id.into();
        Self {
            data_dir: PathBuf::from(format!("node_{}_data", node_id)),
            node_id,
            replica_count: 3,
            replication_delay: DelayPolicy::default(),
            reconcile_interval: Duration::from_secs(15),
            checkpoint_interval: Duration::from_secs(10),
            initial_token: false,
            release_after_send: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_id.as_str().trim().is_empty() {
            return Err(Error::Config("node id must not be empty".into()));
        }
        if self.replica_count == 0 {
            return Err(Error::Config("at least one replica is required".into()));
        }
        if self.reconcile_interval.is_zero() || self.checkpoint_interval.is_zero() {
            return Err(Error::Config("timer intervals must be non-zero".into()));
        }
        if self.replication_delay.min > self.replication_delay.max {
            return Err(Error::Config(format!(
                "replication delay min ({:?}) exceeds max ({:?})",
                self.replication_delay.min, self.replication_delay.max
            )));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::for_node(NodeId::generate())
    }
}

/// Things the operator should hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// Result of the start-up restore
    Restored(RestoreOutcome),
    /// Another node announced itself
    PeerJoined(NodeId),
    /// Chat text seen on the group (our own included)
    ChatReceived(Message),
    /// We hold the token and queued a request
    RequestQueued { from: NodeId, position: usize },
    TokenAcquired { from: NodeId },
    TokenPassed { to: NodeId },
    Reconciled(ReconcileReport),
    CheckpointCreated { at: Timestamp },
    CheckpointFailed(String),
    /// A datagram that was not a valid frame
    Dropped { source: String, reason: String },
}

/// Snapshot for the `status` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub token: TokenState,
    pub queue: Vec<NodeId>,
    pub messages: usize,
    pub last_checkpoint: Option<Timestamp>,
    pub replicas: usize,
}

struct NodeInner {
    config: NodeConfig,
    state: Arc<Mutex<NodeState>>,
    transport: Arc<dyn Transport>,
    replication: Arc<ReplicationEngine>,
    checkpoints: CheckpointEngine,
    metrics: ProtocolMetrics,
    events: mpsc::UnboundedSender<NodeEvent>,
}

/// A running group member
pub struct Node {
    inner: Arc<NodeInner>,
    network_rx: Mutex<Option<mpsc::UnboundedReceiver<NetworkEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Create a node storing its data in `config.data_dir`
    pub fn new(
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        network_rx: mpsc::UnboundedReceiver<NetworkEvent>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NodeEvent>)> {
        config.validate()?;
        let store = Arc::new(FsBlobStore::open(&config.data_dir)?);
        Self::with_store(config, store, transport, network_rx)
    }

    /// Create a node over an arbitrary blob store.
    ///
    /// Restores the checkpoint found in `store`, if any; the outcome is the
    /// first event on the returned channel.
    pub fn with_store(
        config: NodeConfig,
        store: Arc<dyn BlobStore>,
        transport: Arc<dyn Transport>,
        network_rx: mpsc::UnboundedReceiver<NetworkEvent>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NodeEvent>)> {
        config.validate()?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let checkpoints = CheckpointEngine::new(Arc::clone(&store));
        let mut state = NodeState::new(config.node_id.clone(), config.initial_token);
        let outcome = checkpoints.restore(&mut state);
        let _ = event_tx.send(NodeEvent::Restored(outcome));

        let replicas = Arc::new(ReplicaSet::new(store, config.replica_count));
        let replication = Arc::new(ReplicationEngine::new(replicas, config.replication_delay));

        let inner = Arc::new(NodeInner {
            config,
            state: Arc::new(Mutex::new(state)),
            transport,
            replication,
            checkpoints,
            metrics: ProtocolMetrics::new(),
            events: event_tx,
        });

        let node = Self {
            inner,
            network_rx: Mutex::new(Some(network_rx)),
            tasks: Mutex::new(Vec::new()),
        };
        Ok((node, event_rx))
    }

    /// Announce ourselves and start the receive loop and the timers
    pub async fn start(&self) -> Result<()> {
        let network_rx = self
            .network_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Network("node already started".into()))?;

        {
            let mut state = self.inner.state.lock().await;
            let join = Message::join(state.node_id().clone(), state.next_timestamp());
            self.inner.broadcast(&join).await?;
        }

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(receive_loop(Arc::clone(&self.inner), network_rx)));

        let inner = Arc::clone(&self.inner);
        tasks.push(spawn_periodic(self.inner.config.reconcile_interval, move || {
            let inner = Arc::clone(&inner);
            async move {
                inner.reconcile().await;
            }
        }));

        let inner = Arc::clone(&self.inner);
        tasks.push(spawn_periodic(self.inner.config.checkpoint_interval, move || {
            let inner = Arc::clone(&inner);
            async move {
                let _ = inner.checkpoint().await;
            }
        }));

        info!(node_id = %self.inner.config.node_id, "Node started");
        Ok(())
    }

    pub fn node_id(&self) -> &NodeId {
        &self.inner.config.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &ProtocolMetrics {
        &self.inner.metrics
    }

    /// Ask the group for the token
    pub async fn request_token(&self) -> Result<RequestOutcome> {
        let mut state = self.inner.state.lock().await;
        let outcome = token::request_token(&mut state);
        if let RequestOutcome::Broadcast(request) = &outcome {
            self.inner.broadcast(request).await?;
        }
        Ok(outcome)
    }

    /// Broadcast a chat message. Refused with [`Error::NotTokenHolder`]
    /// unless we hold the token.
    pub async fn send_chat(&self, content: &str) -> Result<Message> {
        let mut state = self.inner.state.lock().await;
        token::ensure_holding(&state)?;

        let chat = Message::chat(state.node_id().clone(), content, state.next_timestamp());
        self.inner.broadcast(&chat).await?;

        if self.inner.config.release_after_send {
            self.inner.pass_token(&mut state).await?;
        }
        Ok(chat)
    }

    /// Hand the token to the next requester, if any. Returns the recipient.
    pub async fn release_token(&self) -> Result<Option<NodeId>> {
        let mut state = self.inner.state.lock().await;
        self.inner.pass_token(&mut state).await
    }

    pub async fn reconcile(&self) -> ReconcileReport {
        self.inner.reconcile().await
    }

    pub async fn checkpoint(&self) -> Result<Checkpoint> {
        self.inner.checkpoint().await
    }

    pub async fn status(&self) -> NodeStatus {
        let state = self.inner.state.lock().await;
        NodeStatus {
            node_id: state.node_id().clone(),
            token: state.token(),
            queue: state.queue().to_vec(),
            messages: state.log().len(),
            last_checkpoint: state.last_checkpoint(),
            replicas: self.inner.replication.replicas().count(),
        }
    }

    pub async fn has_token(&self) -> bool {
        self.inner.state.lock().await.has_token()
    }

    /// The whole message log in canonical order
    pub async fn messages(&self) -> Vec<Message> {
        self.inner.state.lock().await.log().to_vec()
    }

    /// The `n` most recent messages
    pub async fn history(&self, n: usize) -> Vec<Message> {
        self.inner.state.lock().await.log().recent(n)
    }

    /// Stop background work, write a final checkpoint and leave the group
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        if let Err(e) = self.inner.checkpoint().await {
            warn!(error = %e, "Final checkpoint failed");
        }
        self.inner.transport.close();
        info!(node_id = %self.inner.config.node_id, "Node stopped");
    }
}

impl NodeInner {
    fn emit(&self, event: NodeEvent) {
        let _ = self.events.send(event);
    }

    async fn broadcast(&self, message: &Message) -> Result<()> {
        let frame = encode_frame(message)?;
        self.transport.send(frame)?;
        self.metrics.record_send(message.kind()).await;
        Ok(())
    }

    async fn pass_token(&self, state: &mut NodeState) -> Result<Option<NodeId>> {
        let (held, queued) = (state.token, state.queue.clone());
        let grant = match token::release_token(state) {
            Some(grant) => grant,
            None => return Ok(None),
        };
        let recipient = match &grant {
            Message::TokenGrant { recipient_id, .. } => recipient_id.clone(),
            _ => return Ok(None),
        };

        if let Err(e) = self.broadcast(&grant).await {
            // The grant never left, so the token is still ours
            state.token = held;
            state.queue = queued;
            warn!(node_id = %state.node_id(), to = %recipient, error = %e, "Token grant not sent");
            return Err(e);
        }
        info!(node_id = %state.node_id(), to = %recipient, "Token passed");
        self.emit(NodeEvent::TokenPassed { to: recipient.clone() });
        Ok(Some(recipient))
    }

    async fn reconcile(&self) -> ReconcileReport {
        let mut state = self.state.lock().await;
        let report = self.replication.reconcile(&mut state);
        self.emit(NodeEvent::Reconciled(report));
        report
    }

    async fn checkpoint(&self) -> Result<Checkpoint> {
        let mut state = self.state.lock().await;
        match self.checkpoints.create(&mut state) {
            Ok(checkpoint) => {
                self.emit(NodeEvent::CheckpointCreated { at: checkpoint.created_at });
                Ok(checkpoint)
            }
            Err(e) => {
                warn!(node_id = %state.node_id(), error = %e, "Checkpoint failed");
                self.emit(NodeEvent::CheckpointFailed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn handle_datagram(&self, data: &[u8], source: String) {
        let message = match decode_frame(data) {
            Ok(message) => message,
            Err(e) => {
                self.metrics.record_malformed();
                warn!(%source, error = %e, "Dropping datagram");
                self.emit(NodeEvent::Dropped {
                    source,
                    reason: e.to_string(),
                });
                return;
            }
        };

        debug!(%source, kind = %message.kind(), sender = %message.sender_id(), "Received");
        match message.route() {
            Route::MutualExclusion => self.handle_token_message(message).await,
            Route::Replication => self.handle_group_message(message).await,
        }
    }

    async fn handle_token_message(&self, message: Message) {
        self.metrics.record_receive(message.kind(), false).await;

        let mut state = self.state.lock().await;
        match token::handle_message(&mut state, &message) {
            TokenEvent::Queued { from, position } => {
                info!(node_id = %state.node_id(), %from, position, "Token request queued");
                self.emit(NodeEvent::RequestQueued { from, position });
            }
            TokenEvent::Acquired { from } => {
                info!(node_id = %state.node_id(), %from, queued = state.queue().len(), "Token acquired");
                self.emit(NodeEvent::TokenAcquired { from });
            }
            TokenEvent::Ignored => {}
        }
    }

    async fn handle_group_message(&self, message: Message) {
        let duplicate = self.state.lock().await.log().contains(&message.key());
        self.metrics.record_receive(message.kind(), duplicate).await;
        if duplicate {
            debug!(sender = %message.sender_id(), "Duplicate delivery");
        }

        match &message {
            Message::Join { sender_id, .. } if sender_id != &self.config.node_id => {
                self.emit(NodeEvent::PeerJoined(sender_id.clone()));
            }
            Message::Chat { .. } => self.emit(NodeEvent::ChatReceived(message.clone())),
            _ => {}
        }

        self.replication.handle_incoming(Arc::clone(&self.state), message);
    }
}

async fn receive_loop(inner: Arc<NodeInner>, mut network_rx: mpsc::UnboundedReceiver<NetworkEvent>) {
    while let Some(event) = network_rx.recv().await {
        match event {
            NetworkEvent::Datagram { data, source } => inner.handle_datagram(&data, source).await,
        }
    }
    debug!(node_id = %inner.config.node_id, "Transport closed, receive loop finished");
}

/// Run `job` every `period`, first after one full period
fn spawn_periodic<F, Fut>(period: Duration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            job().await;
        }
    })
}
