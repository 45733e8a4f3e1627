//! Command handler for CLI

use crate::ui;
use anyhow::{bail, Result};
use colored::Colorize;
use ringchat_core::token::RequestOutcome;
use ringchat_core::{Error, Node};
use std::sync::Arc;

/// Default number of messages shown by `history`
const DEFAULT_HISTORY: usize = 10;

/// One line of operator input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Token,
    Checkpoint,
    Reconcile,
    Status,
    History(usize),
    Stats,
    Help,
    Version,
    Exit,
}

impl Command {
    /// Parse a line. Blank input yields `None`; anything that is not a
    /// command word is chat text.
    pub fn parse(input: &str) -> Result<Option<Self>> {
        let line = input.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let mut parts = line.split_whitespace();
        let word = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();

        let command = match (word, rest.as_slice()) {
            ("token", []) => Self::Token,
            ("checkpoint", []) => Self::Checkpoint,
            ("reconcile", []) => Self::Reconcile,
            ("status", []) => Self::Status,
            ("stats", []) => Self::Stats,
            ("help", []) => Self::Help,
            ("version", []) => Self::Version,
            ("exit" | "quit", []) => Self::Exit,
            ("history", []) => Self::History(DEFAULT_HISTORY),
            ("history", [n]) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Self::History(n),
                _ => bail!("history expects a positive number, got '{}'", n),
            },
            _ => Self::Send(line.to_string()),
        };
        Ok(Some(command))
    }
}

pub struct CommandHandler {
    node: Arc<Node>,
}

impl CommandHandler {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    /// Run one command. Returns `false` when the operator asked to leave.
    pub async fn handle(&self, command: Command) -> Result<bool> {
        match command {
            Command::Send(text) => self.cmd_send(&text).await?,
            Command::Token => self.cmd_token().await?,
            Command::Checkpoint => self.cmd_checkpoint().await?,
            Command::Reconcile => self.cmd_reconcile().await,
            Command::Status => ui::print_status(&self.node.status().await),
            Command::History(n) => self.cmd_history(n).await,
            Command::Stats => {
                let metrics = self.node.metrics();
                ui::print_stats(&metrics.all().await, metrics.malformed_count());
            }
            Command::Help => ui::print_help(),
            Command::Version => self.cmd_version(),
            Command::Exit => return Ok(false),
        }
        Ok(true)
    }

    async fn cmd_send(&self, text: &str) -> Result<()> {
        match self.node.send_chat(text).await {
            Ok(_) => Ok(()),
            Err(e @ Error::NotTokenHolder(_)) => {
                ui::print_warning(&e.to_string());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cmd_token(&self) -> Result<()> {
        match self.node.request_token().await? {
            RequestOutcome::Broadcast(_) => ui::print_info("Token requested, waiting for the holder"),
            RequestOutcome::AlreadyHolding => ui::print_info("You already hold the token"),
        }
        Ok(())
    }

    async fn cmd_checkpoint(&self) -> Result<()> {
        let checkpoint = self.node.checkpoint().await?;
        ui::print_success(&format!(
            "Checkpoint created at {} ({} messages)",
            ui::format_time(checkpoint.created_at),
            checkpoint.message_log.len()
        ));
        Ok(())
    }

    async fn cmd_reconcile(&self) {
        let report = self.node.reconcile().await;
        ui::print_success(&format!(
            "Reconciled {} replicas: {} unique messages",
            report.replicas_read + report.unreadable,
            report.unique
        ));
    }

    async fn cmd_history(&self, n: usize) {
        let messages = self.node.history(n).await;
        if messages.is_empty() {
            ui::print_info("No messages yet");
            return;
        }
        println!();
        for message in &messages {
            println!("  {}", ui::format_message(message));
        }
        println!();
    }

    fn cmd_version(&self) {
        println!();
        println!("{}", format!("  {}", ringchat_core::version_string()).bright_cyan().bold());
        println!("{} {}", "Protocol Version:".bright_green(), ringchat_core::PROTOCOL_VERSION);
        println!("{} {}", "Build:".bright_green(), ringchat_core::version::BUILD_PROFILE);
        println!();
    }
}
