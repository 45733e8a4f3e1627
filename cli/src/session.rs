//! Interactive session loop
//!
//! Line editing blocks, so it runs on its own thread and hands lines over a
//! channel. The async side races that channel against the shutdown signal,
//! which lets an interrupt end the session even when no terminal is attached.

use crate::commands::{Command, CommandHandler};
use crate::ui;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::future::Future;
use std::sync::mpsc as std_mpsc;
use tokio::sync::mpsc;
use tracing::info;

/// What the reader thread produced
#[derive(Debug)]
pub enum Input {
    Line(String),
    /// EOF or a Ctrl-C typed at the prompt
    Closed,
    Failed(String),
}

/// Why the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The operator typed `exit`
    Requested,
    InputClosed,
    /// Interrupt signal
    Interrupted,
}

/// Start the line reader. It prints `prompt`, sends the line and waits for an
/// acknowledgement before prompting again, so command output is not
/// interleaved with the next prompt.
pub fn spawn_reader(prompt: String) -> (mpsc::UnboundedReceiver<Input>, std_mpsc::Sender<()>) {
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    let (ack_tx, ack_rx) = std_mpsc::channel::<()>();

    // Detached: a thread parked in readline must not hold up process exit
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                let _ = line_tx.send(Input::Failed(e.to_string()));
                return;
            }
        };
        loop {
            let input = match rl.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.trim());
                    }
                    Input::Line(line)
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Input::Closed,
                Err(e) => Input::Failed(e.to_string()),
            };
            let done = !matches!(input, Input::Line(_));
            if line_tx.send(input).is_err() || done || ack_rx.recv().is_err() {
                break;
            }
        }
    });

    (line_rx, ack_tx)
}

/// Run commands until the operator leaves, input ends or `shutdown` fires
pub async fn run<S>(
    handler: &CommandHandler,
    input: &mut mpsc::UnboundedReceiver<Input>,
    ack: &std_mpsc::Sender<()>,
    shutdown: S,
) -> Exit
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            next = input.recv() => match next {
                Some(Input::Line(line)) => line,
                Some(Input::Closed) | None => return Exit::InputClosed,
                Some(Input::Failed(e)) => {
                    ui::print_error(&format!("Input error: {}", e));
                    return Exit::InputClosed;
                }
            },
            _ = &mut shutdown => {
                info!("Received interrupt, shutting down");
                return Exit::Interrupted;
            }
        };

        let keep_going = match Command::parse(&line) {
            Ok(Some(command)) => match handler.handle(command).await {
                Ok(keep_going) => keep_going,
                Err(e) => {
                    ui::print_error(&format!("{:#}", e));
                    true
                }
            },
            Ok(None) => true,
            Err(e) => {
                ui::print_error(&e.to_string());
                true
            }
        };
        if !keep_going {
            return Exit::Requested;
        }
        let _ = ack.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringchat_core::network::MemoryHub;
    use ringchat_core::storage::{BlobStore, MemoryBlobStore, CHECKPOINT_NAME};
    use ringchat_core::{DelayPolicy, Node, NodeConfig};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    fn session_node(store: Arc<MemoryBlobStore>) -> Arc<Node> {
        let hub = MemoryHub::new();
        let (transport, rx) = hub.join("n1");
        let config = NodeConfig {
            replication_delay: DelayPolicy::none(),
            initial_token: true,
            ..NodeConfig::for_node("n1")
        };
        let (node, _events) = Node::with_store(config, store, Arc::new(transport), rx).unwrap();
        Arc::new(node)
    }

    #[tokio::test]
    async fn test_interrupt_ends_session_and_checkpoints() {
        let store = Arc::new(MemoryBlobStore::new());
        let node = session_node(store.clone());
        node.start().await.unwrap();
        let handler = CommandHandler::new(Arc::clone(&node));

        // Input stays open with nothing typed, like a pipe nobody writes to
        let (_line_tx, mut lines) = mpsc::unbounded_channel();
        let (ack, _ack_rx) = std_mpsc::channel();
        let (signal_tx, signal_rx) = oneshot::channel::<()>();
        signal_tx.send(()).unwrap();

        let exit = run(&handler, &mut lines, &ack, async {
            let _ = signal_rx.await;
        })
        .await;
        assert_eq!(exit, Exit::Interrupted);

        node.shutdown().await;
        assert!(store.exists(CHECKPOINT_NAME));
    }

    #[tokio::test]
    async fn test_exit_command_and_closed_input() {
        let node = session_node(Arc::new(MemoryBlobStore::new()));
        let handler = CommandHandler::new(Arc::clone(&node));
        let (ack, ack_rx) = std_mpsc::channel();

        let (line_tx, mut lines) = mpsc::unbounded_channel();
        line_tx.send(Input::Line("   ".to_string())).unwrap();
        line_tx.send(Input::Line("exit".to_string())).unwrap();
        let exit = run(&handler, &mut lines, &ack, std::future::pending()).await;
        assert_eq!(exit, Exit::Requested);
        // Only the blank line was acknowledged
        assert_eq!(ack_rx.try_iter().count(), 1);

        drop(line_tx);
        let exit = run(&handler, &mut lines, &ack, std::future::pending()).await;
        assert_eq!(exit, Exit::InputClosed);
    }
}
