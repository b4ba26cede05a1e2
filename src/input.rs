//! Asynchronous user input: console channel and inbox side-channel.
//!
//! Both sources feed the controller only at defined safe points (start
//! of idle handling, start of each iteration), never mid-agent-call.
//! The console reader is a blocking stdin thread producing into a
//! channel; the inbox is a plain file consumed whole and deleted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::Workspace;

/// Console input channel fed by a background stdin reader.
///
/// EOF or a read error sets the quit flag, observed by the controller
/// at the next poll. Messages queue until drained at a safe point.
#[derive(Debug)]
pub struct ConsoleInput {
    rx: mpsc::UnboundedReceiver<String>,
    quit: Arc<AtomicBool>,
}

impl ConsoleInput {
    /// Spawn the reader thread and return the consumer handle.
    pub fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let quit = Arc::new(AtomicBool::new(false));
        let reader_quit = Arc::clone(&quit);

        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => {
                        println!("Console closed. Shutting down...");
                        reader_quit.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            println!("{} {}", "[queued]".green(), trimmed);
                            if tx.send(trimmed.to_string()).is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });

        println!("Console input enabled. Type messages at the prompt.");
        Self { rx, quit }
    }

    /// Drain all queued messages, joined with newlines.
    pub fn drain(&mut self) -> Option<String> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            messages.push(msg);
        }
        if messages.is_empty() {
            None
        } else {
            Some(messages.join("\n"))
        }
    }

    /// Whether the console has requested shutdown.
    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// Handle to the quit flag, shared with the interrupt handler.
    pub fn quit_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.quit)
    }

    #[cfg(test)]
    fn for_test() -> (mpsc::UnboundedSender<String>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                rx,
                quit: Arc::new(AtomicBool::new(false)),
            },
        )
    }
}

/// Read and clear the inbox file. The whole content is one message.
pub fn read_inbox(workspace: &Workspace) -> Option<String> {
    let path = workspace.inbox_file();
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let content = content.trim().to_string();
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Error clearing inbox: {e}");
            }
            if content.is_empty() {
                None
            } else {
                Some(content)
            }
        }
        Err(e) => {
            warn!("Error reading inbox: {e}");
            None
        }
    }
}

/// Collect pending user input from the inbox and the console,
/// inbox first, concatenated when both are present.
pub fn gather(workspace: &Workspace, console: Option<&mut ConsoleInput>) -> Option<String> {
    let inbox = read_inbox(workspace);
    let queued = console.and_then(ConsoleInput::drain);
    match (inbox, queued) {
        (Some(a), Some(b)) => Some(format!("{a}\n\n{b}")),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (Workspace, TempDir) {
        let temp = TempDir::new().expect("temp dir");
        let ws = Workspace::new(temp.path());
        std::fs::create_dir_all(ws.dir()).expect("create dir");
        (ws, temp)
    }

    #[test]
    fn test_read_inbox_missing_file() {
        let (ws, _temp) = workspace();
        assert!(read_inbox(&ws).is_none());
    }

    #[test]
    fn test_read_inbox_consumes_file() {
        let (ws, _temp) = workspace();
        std::fs::write(ws.inbox_file(), "add dark mode\n").expect("write");

        assert_eq!(read_inbox(&ws).as_deref(), Some("add dark mode"));
        assert!(!ws.inbox_file().exists());
        assert!(read_inbox(&ws).is_none());
    }

    #[test]
    fn test_read_inbox_empty_file_is_none() {
        let (ws, _temp) = workspace();
        std::fs::write(ws.inbox_file(), "  \n").expect("write");
        assert!(read_inbox(&ws).is_none());
    }

    #[test]
    fn test_console_drain_joins_queued_messages() {
        let (tx, mut console) = ConsoleInput::for_test();
        tx.send("first".to_string()).expect("send");
        tx.send("second".to_string()).expect("send");

        assert_eq!(console.drain().as_deref(), Some("first\nsecond"));
        assert!(console.drain().is_none());
    }

    #[test]
    fn test_gather_concatenates_inbox_first() {
        let (ws, _temp) = workspace();
        std::fs::write(ws.inbox_file(), "from inbox").expect("write");

        let (tx, mut console) = ConsoleInput::for_test();
        tx.send("from console".to_string()).expect("send");

        let combined = gather(&ws, Some(&mut console)).expect("input");
        assert_eq!(combined, "from inbox\n\nfrom console");
    }

    #[test]
    fn test_gather_without_console() {
        let (ws, _temp) = workspace();
        assert!(gather(&ws, None).is_none());

        std::fs::write(ws.inbox_file(), "hello").expect("write");
        assert_eq!(gather(&ws, None).as_deref(), Some("hello"));
    }
}
