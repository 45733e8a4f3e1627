//! Ringchat CLI - interactive multicast chat node
//!
//! Usage:
//!   ringchat --id 1 --token
//!   ringchat --id 2 --replicas 5 --data-dir /tmp/node2

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use ringchat_core::network::{MulticastConfig, MulticastTransport};
use ringchat_core::{DelayPolicy, Node, NodeConfig, NodeId};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod commands;
mod session;
mod ui;

use commands::CommandHandler;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Node id (random when omitted)
    #[arg(short, long)]
    id: Option<String>,

    /// Data directory (default: node_<id>_data)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Start as the token holder
    #[arg(short, long)]
    token: bool,

    /// Keep the token after sending instead of passing it on
    #[arg(long)]
    keep_token: bool,

    /// Multicast group address
    #[arg(short, long, default_value = "224.1.1.1")]
    group: Ipv4Addr,

    /// Multicast port
    #[arg(short, long, default_value_t = 5007)]
    port: u16,

    /// Local interface to join the group on
    #[arg(long, default_value = "0.0.0.0")]
    interface: Ipv4Addr,

    /// Multicast TTL
    #[arg(long, default_value_t = 128)]
    ttl: u32,

    /// Number of replica stores
    #[arg(short, long, default_value_t = 3)]
    replicas: usize,

    /// Smallest artificial replication delay (ms)
    #[arg(long, default_value_t = 0)]
    min_delay_ms: u64,

    /// Largest artificial replication delay (ms)
    #[arg(long, default_value_t = 500)]
    max_delay_ms: u64,

    /// Seconds between checkpoints
    #[arg(long, default_value_t = 10)]
    checkpoint_secs: u64,

    /// Seconds between reconciliations
    #[arg(long, default_value_t = 15)]
    reconcile_secs: u64,
}

impl Args {
    fn node_config(&self) -> NodeConfig {
        let node_id = self.id.clone().map(NodeId::from).unwrap_or_else(NodeId::generate);
        let defaults = NodeConfig::for_node(node_id);
        NodeConfig {
            data_dir: self.data_dir.clone().unwrap_or(defaults.data_dir.clone()),
            replica_count: self.replicas,
            replication_delay: DelayPolicy::from_millis(self.min_delay_ms, self.max_delay_ms),
            reconcile_interval: Duration::from_secs(self.reconcile_secs),
            checkpoint_interval: Duration::from_secs(self.checkpoint_secs),
            initial_token: self.token,
            release_after_send: !self.keep_token,
            ..defaults
        }
    }

    fn multicast_config(&self) -> MulticastConfig {
        MulticastConfig {
            group: self.group,
            port: self.port,
            interface: self.interface,
            ttl: self.ttl,
            ..MulticastConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ringchat_core=info,ringchat=info")),
        )
        .init();

    let args = Args::parse();
    let config = args.node_config();
    config.validate().context("Invalid node configuration")?;

    ui::print_banner(config.node_id.as_str());

    let multicast = args.multicast_config();
    let (transport, network_rx) = MulticastTransport::join(multicast.clone())
        .with_context(|| format!("Failed to join multicast group {}", multicast.group_addr()))?;

    info!(data_dir = %config.data_dir.display(), "Opening node storage");
    let (node, mut events) = Node::new(config, Arc::new(transport), network_rx)
        .context("Failed to create node")?;
    let node = Arc::new(node);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            ui::print_event(&event);
        }
    });

    node.start().await.context("Failed to start node")?;

    let handler = CommandHandler::new(Arc::clone(&node));

    println!("{}", "Type 'help' for available commands, 'exit' to leave".bright_yellow());
    println!();

    let prompt = format!("{}> ", node.node_id().as_str().bright_cyan());
    let (mut input, ack) = session::spawn_reader(prompt);
    let exit = session::run(&handler, &mut input, &ack, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for interrupts");
            std::future::pending::<()>().await;
        }
    })
    .await;
    info!(?exit, "Session ended");

    node.shutdown().await;
    printer.abort();
    println!("{}", "Goodbye!".bright_green());

    Ok(())
}
