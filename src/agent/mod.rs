//! Agent invocation: subprocess launch, observation, and retry policy.
//!
//! The coding agent is an opaque subprocess. It consumes a prompt,
//! mutates the working tree, and reports through its exit code and
//! stderr. Progress is surfaced by tailing its session transcript;
//! failures are classified from stderr and fed to a fixed retry
//! policy. A hard wall-clock ceiling bounds every invocation.

pub mod classify;
pub mod transcript;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use classify::{classify, AgentErrorKind};

use crate::config::Settings;
use crate::error::{ForemanError, Result};

/// Grace window between the graceful signal and the forced kill.
const KILL_GRACE: Duration = Duration::from_secs(10);

/// Characters of diagnostic text included in log lines.
const MESSAGE_LOG_CHARS: usize = 100;

/// Result of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub exit_code: i32,
    pub error: AgentErrorKind,
    pub message: String,
}

impl AgentOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Launches the agent subprocess and applies the retry policy.
#[derive(Debug, Clone)]
pub struct AgentRunner {
    command: String,
    project_root: PathBuf,
    timeout: Duration,
    retry_delays: Vec<Duration>,
    rate_limit_wait: Duration,
}

impl AgentRunner {
    pub fn new(settings: &Settings, project_root: impl Into<PathBuf>) -> Self {
        Self {
            command: settings.agent_command.clone(),
            project_root: project_root.into(),
            timeout: settings.agent_timeout(),
            retry_delays: settings.retry_delays(),
            rate_limit_wait: settings.rate_limit_wait(),
        }
    }

    /// Whether the agent command resolves on PATH.
    pub fn installed(&self) -> bool {
        which::which(&self.command).is_ok()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Run the agent once with the given prompt.
    ///
    /// Streams transcript events while the process runs when a session
    /// file appears; otherwise blocks until exit or the ceiling.
    pub async fn run(&self, prompt: &str) -> Result<AgentOutcome> {
        let session_dir = transcript::session_dir(&self.project_root);
        let existing = session_dir
            .as_deref()
            .map(transcript::list_sessions)
            .unwrap_or_default();
        if let Some(dir) = &session_dir {
            // The agent creates this itself, but we need to watch it.
            let _ = std::fs::create_dir_all(dir);
        }

        debug!("Launching agent: {} -p <prompt>", self.command);
        let mut child = Command::new(&self.command)
            .arg("-p")
            .arg(prompt)
            .arg("--dangerously-skip-permissions")
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ForemanError::agent(format!("failed to launch '{}': {e}", self.command))
            })?;

        // Drain stderr in the background for later classification.
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text).await;
            }
            text
        });

        let deadline = Instant::now() + self.timeout;

        let mut tailer = match &session_dir {
            Some(dir) => transcript::wait_for_new_session(dir, &existing)
                .await
                .map(transcript::TranscriptTailer::new),
            None => None,
        };
        if tailer.is_none() {
            info!("(transcript unavailable, waiting for agent...)");
        }

        let status = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    "Agent exceeded {}s ceiling, terminating",
                    self.timeout.as_secs()
                );
                self.terminate(&mut child).await;
                stderr_task.abort();
                return Ok(AgentOutcome {
                    exit_code: 1,
                    error: AgentErrorKind::Timeout,
                    message: "agent timed out".to_string(),
                });
            }

            tokio::select! {
                status = child.wait() => break status?,
                () = tokio::time::sleep(transcript::TAIL_INTERVAL.min(remaining)) => {
                    if let Some(tailer) = tailer.as_mut() {
                        for line in tailer.poll() {
                            println!("{line}");
                        }
                    }
                }
            }
        };

        // Final read to catch anything written at the end.
        if let Some(tailer) = tailer.as_mut() {
            for line in tailer.poll() {
                println!("{line}");
            }
            println!();
        }

        let stderr_text = stderr_task.await.unwrap_or_default();
        let (error, message) = classify(&stderr_text);
        Ok(AgentOutcome {
            exit_code: status.code().unwrap_or(1),
            error,
            message,
        })
    }

    /// Run the agent with the retry policy applied.
    pub async fn run_with_retry(&self, prompt: &str) -> Result<AgentOutcome> {
        run_with_policy(
            || self.run(prompt),
            &self.retry_delays,
            self.rate_limit_wait,
        )
        .await
    }

    /// Graceful signal, grace window, then forced kill.
    async fn terminate(&self, child: &mut Child) {
        if let Some(pid) = child.id() {
            let _ = std::process::Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .status();
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
            let _ = child.kill().await;
        }
    }
}

/// The retry policy over an injectable invocation:
/// - rate limit: sleep the cooldown and retry, indefinitely;
/// - token limit: surface immediately, fatal for the loop;
/// - timeout: surface immediately, a stuck agent is not re-run blindly;
/// - api error / unknown: bounded backoff across the fixed schedule,
///   then surface.
pub(crate) async fn run_with_policy<F, Fut>(
    mut invoke: F,
    delays: &[Duration],
    cooldown: Duration,
) -> Result<AgentOutcome>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<AgentOutcome>>,
{
    let mut schedule = delays.iter();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let outcome = invoke().await?;
        if outcome.success() {
            return Ok(outcome);
        }

        match outcome.error {
            AgentErrorKind::RateLimit => {
                warn!(
                    "Rate limited. Waiting {}s before retry...",
                    cooldown.as_secs()
                );
                tokio::time::sleep(cooldown).await;
            }
            AgentErrorKind::TokenLimit => {
                warn!(
                    "Token/credit limit reached: {}",
                    log_excerpt(&outcome.message)
                );
                return Ok(outcome);
            }
            AgentErrorKind::Timeout => {
                warn!("Agent timed out; not retrying");
                return Ok(outcome);
            }
            AgentErrorKind::ApiError | AgentErrorKind::Unknown | AgentErrorKind::None => {
                match schedule.next() {
                    Some(delay) => {
                        warn!(
                            "Agent error on attempt {} ({}): {}. Retrying in {}s...",
                            attempt,
                            outcome.error,
                            log_excerpt(&outcome.message),
                            delay.as_secs()
                        );
                        tokio::time::sleep(*delay).await;
                    }
                    None => {
                        warn!("Agent error persists after {} retries", delays.len());
                        return Ok(outcome);
                    }
                }
            }
        }
    }
}

fn log_excerpt(message: &str) -> String {
    message.chars().take(MESSAGE_LOG_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    fn outcome(exit_code: i32, error: AgentErrorKind) -> AgentOutcome {
        AgentOutcome {
            exit_code,
            error,
            message: format!("{error}"),
        }
    }

    /// Build an invoke closure that pops scripted outcomes in order.
    fn scripted(
        outcomes: Vec<AgentOutcome>,
    ) -> (
        RefCell<VecDeque<AgentOutcome>>,
        impl Fn(&RefCell<VecDeque<AgentOutcome>>) -> AgentOutcome,
    ) {
        let queue = RefCell::new(VecDeque::from(outcomes));
        let pop = |q: &RefCell<VecDeque<AgentOutcome>>| {
            q.borrow_mut().pop_front().expect("script exhausted")
        };
        (queue, pop)
    }

    const NO_DELAYS: &[Duration] = &[Duration::ZERO, Duration::ZERO];

    #[tokio::test]
    async fn test_success_returns_immediately() {
        let (queue, pop) = scripted(vec![outcome(0, AgentErrorKind::None)]);
        let result = run_with_policy(|| async { Ok(pop(&queue)) }, NO_DELAYS, Duration::ZERO)
            .await
            .expect("policy");
        assert!(result.success());
        assert!(queue.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_retries_until_success() {
        // Two rate limits exceed the backoff schedule length; the
        // cooldown loop must not consume schedule slots.
        let (queue, pop) = scripted(vec![
            outcome(1, AgentErrorKind::RateLimit),
            outcome(1, AgentErrorKind::RateLimit),
            outcome(1, AgentErrorKind::RateLimit),
            outcome(0, AgentErrorKind::None),
        ]);
        let result = run_with_policy(|| async { Ok(pop(&queue)) }, &[], Duration::ZERO)
            .await
            .expect("policy");
        assert!(result.success());
        assert!(queue.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_token_limit_never_retried() {
        let (queue, pop) = scripted(vec![
            outcome(1, AgentErrorKind::TokenLimit),
            outcome(0, AgentErrorKind::None),
        ]);
        let result = run_with_policy(|| async { Ok(pop(&queue)) }, NO_DELAYS, Duration::ZERO)
            .await
            .expect("policy");
        assert_eq!(result.error, AgentErrorKind::TokenLimit);
        // The success outcome was never requested.
        assert_eq!(queue.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_never_retried() {
        let (queue, pop) = scripted(vec![
            outcome(1, AgentErrorKind::Timeout),
            outcome(0, AgentErrorKind::None),
        ]);
        let result = run_with_policy(|| async { Ok(pop(&queue)) }, NO_DELAYS, Duration::ZERO)
            .await
            .expect("policy");
        assert_eq!(result.error, AgentErrorKind::Timeout);
        assert_eq!(queue.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_api_error_bounded_by_schedule() {
        // Schedule of 2 delays allows 3 attempts total.
        let (queue, pop) = scripted(vec![
            outcome(1, AgentErrorKind::ApiError),
            outcome(1, AgentErrorKind::ApiError),
            outcome(1, AgentErrorKind::ApiError),
        ]);
        let result = run_with_policy(|| async { Ok(pop(&queue)) }, NO_DELAYS, Duration::ZERO)
            .await
            .expect("policy");
        assert_eq!(result.error, AgentErrorKind::ApiError);
        assert!(queue.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_recovers_within_schedule() {
        let (queue, pop) = scripted(vec![
            outcome(1, AgentErrorKind::Unknown),
            outcome(0, AgentErrorKind::None),
        ]);
        let result = run_with_policy(|| async { Ok(pop(&queue)) }, NO_DELAYS, Duration::ZERO)
            .await
            .expect("policy");
        assert!(result.success());
    }

    #[test]
    fn test_log_excerpt_truncates() {
        let long = "e".repeat(500);
        assert_eq!(log_excerpt(&long).len(), MESSAGE_LOG_CHARS);
        assert_eq!(log_excerpt("short"), "short");
    }
}
