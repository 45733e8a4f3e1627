//! UI utilities for pretty printing

use chrono::{Local, TimeZone};
use colored::Colorize;
use ringchat_core::network::KindMetrics;
use ringchat_core::storage::RestoreOutcome;
use ringchat_core::{Message, NodeEvent, NodeStatus, Timestamp, TokenState};

pub fn print_banner(node_id: &str) {
    println!("{}", "=".repeat(60).bright_blue());
    println!("{}", format!("  {}", ringchat_core::version_string()).bright_cyan().bold());
    println!("{}", "  Token-ordered multicast group chat".bright_white());
    println!("{}", "=".repeat(60).bright_blue());
    println!("{} {}", "Node:".bright_green(), node_id);
    println!();
}

pub fn print_help() {
    println!();
    println!("{}", "Available Commands:".bright_cyan().bold());
    println!();
    println!("  {:<20} {}", "<text>".bright_green(), "Send a chat message (requires the token)");
    println!("  {:<20} {}", "token".bright_green(), "Request the token");
    println!("  {:<20} {}", "checkpoint".bright_green(), "Write a checkpoint now");
    println!("  {:<20} {}", "reconcile".bright_green(), "Reconcile the replicas now");
    println!("  {:<20} {}", "status".bright_green(), "Show token state, queue and log size");
    println!("  {:<20} {}", "history [n]".bright_green(), "Show the last n messages (default 10)");
    println!("  {:<20} {}", "stats".bright_green(), "Show per-message-type traffic");
    println!("  {:<20} {}", "help".bright_green(), "Show this help message");
    println!("  {:<20} {}", "exit".bright_green(), "Checkpoint and leave the group");
    println!();
}

pub fn print_error(msg: &str) {
    println!("{} {}", "✗".bright_red(), msg.red());
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".bright_green(), msg.bright_green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".bright_blue(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".bright_yellow(), msg.yellow());
}

/// Local wall-clock time of a millisecond timestamp
pub fn format_time(timestamp: Timestamp) -> String {
    Local
        .timestamp_millis_opt(timestamp as i64)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

pub fn format_message(message: &Message) -> String {
    let time = format_time(message.timestamp()).dimmed();
    let sender = message.sender_id().to_string();
    match message {
        Message::Chat { content, .. } => format!("[{}] {}: {}", time, sender.bright_cyan(), content),
        Message::Join { content, .. } => format!("[{}] {}", time, content.italic()),
        other => format!("[{}] {} from {}", time, other.kind(), sender),
    }
}

fn token_label(token: TokenState) -> colored::ColoredString {
    match token {
        TokenState::Holding => token.to_string().bright_green().bold(),
        TokenState::Requesting => token.to_string().bright_yellow(),
        TokenState::Waiting => token.to_string().normal(),
    }
}

pub fn print_status(status: &NodeStatus) {
    println!();
    println!("{} {}", "Node:".bright_green(), status.node_id);
    println!("{} {}", "Token:".bright_green(), token_label(status.token));
    let queue: Vec<_> = status.queue.iter().map(|id| id.to_string()).collect();
    let queue = if queue.is_empty() {
        "(empty)".to_string()
    } else {
        queue.join(" -> ")
    };
    println!("{} {}", "Queue:".bright_green(), queue);
    println!("{} {}", "Messages:".bright_green(), status.messages);
    println!("{} {}", "Replicas:".bright_green(), status.replicas);
    let checkpoint = status
        .last_checkpoint
        .map(format_time)
        .unwrap_or_else(|| "never".to_string());
    println!("{} {}", "Last checkpoint:".bright_green(), checkpoint);
    println!();
}

pub fn print_stats(stats: &[KindMetrics], malformed: u64) {
    println!();
    println!(
        "  {:<15} {:>8} {:>10} {:>11}",
        "TYPE".bright_cyan(),
        "SENT".bright_cyan(),
        "RECEIVED".bright_cyan(),
        "DUPLICATES".bright_cyan()
    );
    for entry in stats {
        println!(
            "  {:<15} {:>8} {:>10} {:>11}",
            entry.kind.to_string(),
            entry.sent,
            entry.received,
            entry.duplicates
        );
    }
    println!("  {:<15} {:>8}", "MALFORMED", malformed);
    println!();
}

/// Print a node event as it happens
pub fn print_event(event: &NodeEvent) {
    match event {
        NodeEvent::Restored(RestoreOutcome::Restored {
            messages,
            has_token,
            taken_at,
            recent,
        }) => {
            print_success(&format!(
                "Restored {} messages from checkpoint taken at {}{}",
                messages,
                format_time(*taken_at),
                if *has_token { " (holding the token)" } else { "" }
            ));
            for message in recent {
                println!("  {}", format_message(message));
            }
        }
        NodeEvent::Restored(RestoreOutcome::Fresh) => print_info("No checkpoint found, starting fresh"),
        NodeEvent::Restored(RestoreOutcome::Discarded(reason)) => {
            print_warning(&format!("Checkpoint ignored ({}), starting fresh", reason))
        }
        NodeEvent::PeerJoined(id) => print_info(&format!("{} joined the chat", id)),
        NodeEvent::ChatReceived(message) => println!("{}", format_message(message)),
        NodeEvent::RequestQueued { from, position } => {
            print_info(&format!("{} asked for the token (position {})", from, position))
        }
        NodeEvent::TokenAcquired { from } => {
            print_success(&format!("Token received from {}, you may send messages", from))
        }
        NodeEvent::TokenPassed { to } => print_info(&format!("Token passed to {}", to)),
        NodeEvent::Reconciled(report) => {
            tracing::debug!(unique = report.unique, "Reconciled");
            if report.unreadable > 0 || report.failed_writes > 0 {
                print_warning(&format!(
                    "Reconciliation: {} unreadable replicas, {} failed writes",
                    report.unreadable, report.failed_writes
                ));
            }
        }
        NodeEvent::CheckpointCreated { at } => {
            tracing::debug!(at = %format_time(*at), "Checkpoint created");
        }
        NodeEvent::CheckpointFailed(reason) => print_warning(&format!("Checkpoint failed: {}", reason)),
        NodeEvent::Dropped { source, reason } => {
            print_warning(&format!("Ignored malformed datagram from {}: {}", source, reason))
        }
    }
}
