//! Workspace layout and tunable settings.
//!
//! All foreman state lives under a `.foreman/` directory in the project
//! root, except the inbox file and the stop sentinel which stay at the
//! root for easy access. Tunables come from an optional
//! `.foreman/config.toml`; every field has a default matching the
//! built-in constants.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ForemanError, Result};

/// Directory holding all foreman project state.
pub const WORKSPACE_DIR: &str = ".foreman";

/// Map of the files foreman reads and writes for one project.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project root (the directory containing `.foreman/`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `.foreman/` state directory.
    pub fn dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    /// Live task list, one JSON record per line.
    pub fn tasks_file(&self) -> PathBuf {
        self.dir().join("tasks.jsonl")
    }

    /// Archive of completed work.
    pub fn archive_file(&self) -> PathBuf {
        self.dir().join("tasks-done.jsonl")
    }

    /// Persistent log file.
    pub fn log_file(&self) -> PathBuf {
        self.dir().join("foreman.log")
    }

    /// Goal document describing what to build.
    pub fn idea_file(&self) -> PathBuf {
        self.dir().join("idea.md")
    }

    /// Working-convention document the agent reads first.
    pub fn working_file(&self) -> PathBuf {
        self.dir().join("working.md")
    }

    /// Optional settings override file.
    pub fn config_file(&self) -> PathBuf {
        self.dir().join("config.toml")
    }

    /// Inbox side-channel; stays at the project root for easy access.
    pub fn inbox_file(&self) -> PathBuf {
        self.root.join("inbox.txt")
    }

    /// Stop sentinel; presence triggers shutdown at the next poll.
    pub fn stop_file(&self) -> PathBuf {
        self.root.join(".stop")
    }

    /// Whether the project has been initialized.
    pub fn exists(&self) -> bool {
        self.dir().exists()
    }

    /// Check if the goal document is still the unfilled template.
    ///
    /// Returns true when stripping HTML comments and markdown headers
    /// leaves nothing but whitespace.
    pub fn is_idea_template(&self) -> bool {
        let Ok(content) = std::fs::read_to_string(self.idea_file()) else {
            return true;
        };
        let mut stripped = content;
        if let Ok(comments) = Regex::new(r"(?s)<!--.*?-->") {
            stripped = comments.replace_all(&stripped, "").into_owned();
        }
        if let Ok(headers) = Regex::new(r"(?m)^#.*$") {
            stripped = headers.replace_all(&stripped, "").into_owned();
        }
        stripped.trim().is_empty()
    }

    /// Check if the project was defined but never started: goal filled
    /// in, yet no live tasks and no completed history.
    pub fn is_never_started(&self) -> bool {
        if self.is_idea_template() {
            return false;
        }
        if file_has_content(&self.archive_file()) {
            return false;
        }
        if file_has_content(&self.tasks_file()) {
            return false;
        }
        true
    }
}

fn file_has_content(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Tunable settings, overridable via `.foreman/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Command used to invoke the coding agent.
    #[serde(default = "default_agent_command")]
    pub agent_command: String,

    /// Max iterations per task before giving up.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Seconds between polls in daemon mode.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Max seconds to wait for a single agent invocation.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_secs: u64,

    /// Backoff schedule for transient agent errors, in seconds.
    #[serde(default = "default_retry_delays")]
    pub retry_delays_secs: Vec<u64>,

    /// Cooldown before retrying after a rate limit, in seconds.
    #[serde(default = "default_rate_limit_wait")]
    pub rate_limit_wait_secs: u64,

    /// Pause between iterations on the same task, in seconds.
    #[serde(default = "default_iteration_pause")]
    pub iteration_pause_secs: u64,
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_max_iterations() -> u32 {
    20
}

fn default_poll_interval() -> u64 {
    5
}

fn default_agent_timeout() -> u64 {
    3600
}

fn default_retry_delays() -> Vec<u64> {
    vec![5, 15, 30, 60]
}

fn default_rate_limit_wait() -> u64 {
    300
}

fn default_iteration_pause() -> u64 {
    2
}

impl Default for Settings {
    fn default() -> Self {
        toml::from_str("").expect("empty settings parse")
    }
}

impl Settings {
    /// Load settings, applying `.foreman/config.toml` overrides when
    /// the file exists.
    pub fn load(workspace: &Workspace) -> Result<Self> {
        let path = workspace.config_file();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| ForemanError::config_with_path(e.to_string(), path))
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn rate_limit_wait(&self) -> Duration {
        Duration::from_secs(self.rate_limit_wait_secs)
    }

    pub fn iteration_pause(&self) -> Duration {
        Duration::from_secs(self.iteration_pause_secs)
    }

    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect()
    }
}
