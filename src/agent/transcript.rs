//! Session transcript discovery, tailing, and live rendering.
//!
//! The agent appends line-delimited JSON events to a per-project
//! session file while it runs. Tailing that file is the only live
//! progress signal; it is strictly an observer and never affects
//! control flow. When no transcript appears the runner falls back to a
//! plain wait.

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;
use serde::Deserialize;
use serde_json::Value;

/// How long to wait for a new session file to appear after spawn.
pub const SESSION_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between checks for the session file.
pub const SESSION_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Interval between tail reads while the agent runs.
pub const TAIL_INTERVAL: Duration = Duration::from_millis(300);

/// Lines shown from each tool result.
const PREVIEW_LINES: usize = 3;

/// Characters shown from bash commands.
const COMMAND_PREVIEW_CHARS: usize = 60;

/// Hard cap on any rendered line.
const LINE_TRUNCATE_CHARS: usize = 200;

/// The agent's session directory for a project: the project path with
/// slashes mangled to dashes, under `~/.claude/projects/`.
pub fn session_dir(project_root: &Path) -> Option<PathBuf> {
    let mangled = project_root.to_string_lossy().replace('/', "-");
    dirs::home_dir().map(|home| home.join(".claude").join("projects").join(mangled))
}

/// Snapshot the transcript files currently present.
pub fn list_sessions(dir: &Path) -> HashSet<PathBuf> {
    let mut sessions = HashSet::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return sessions;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "jsonl") {
            sessions.insert(path);
        }
    }
    sessions
}

/// Wait for a transcript file that was not in `existing`, up to
/// [`SESSION_WAIT_TIMEOUT`]. Picks the most recently modified when
/// several appear at once.
pub async fn wait_for_new_session(dir: &Path, existing: &HashSet<PathBuf>) -> Option<PathBuf> {
    let attempts = SESSION_WAIT_TIMEOUT.as_millis() / SESSION_CHECK_INTERVAL.as_millis();
    for _ in 0..attempts {
        let new_files: Vec<PathBuf> = list_sessions(dir)
            .into_iter()
            .filter(|p| !existing.contains(p))
            .collect();
        if !new_files.is_empty() {
            return new_files.into_iter().max_by_key(|p| {
                fs::metadata(p)
                    .and_then(|m| m.modified())
                    .ok()
            });
        }
        tokio::time::sleep(SESSION_CHECK_INTERVAL).await;
    }
    None
}

/// Incremental reader over a growing transcript file.
#[derive(Debug)]
pub struct TranscriptTailer {
    path: PathBuf,
    offset: u64,
    carry: String,
}

impl TranscriptTailer {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            carry: String::new(),
        }
    }

    /// Read any new content and return rendered display lines.
    /// Transient read errors yield nothing; the next poll retries.
    pub fn poll(&mut self) -> Vec<String> {
        let Ok(mut file) = fs::File::open(&self.path) else {
            return Vec::new();
        };
        if file.seek(SeekFrom::Start(self.offset)).is_err() {
            return Vec::new();
        }
        let mut new_content = String::new();
        let Ok(read) = file.read_to_string(&mut new_content) else {
            return Vec::new();
        };
        self.offset += read as u64;

        let mut buffer = std::mem::take(&mut self.carry);
        buffer.push_str(&new_content);

        let mut rendered = Vec::new();
        let mut rest = buffer.as_str();
        while let Some(pos) = rest.find('\n') {
            let (line, tail) = rest.split_at(pos);
            rendered.extend(render_event(line));
            rest = &tail[1..];
        }
        self.carry = rest.to_string();
        rendered
    }
}

#[derive(Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    message: Option<EventMessage>,
}

#[derive(Deserialize)]
struct EventMessage {
    #[serde(default)]
    content: Value,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Block {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        content: Value,
    },
    #[serde(other)]
    Other,
}

/// Render one transcript line into zero or more display lines.
/// Unparseable lines render nothing.
pub fn render_event(line: &str) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    let Ok(event) = serde_json::from_str::<Event>(line) else {
        return Vec::new();
    };
    let Some(kind) = event.kind.as_deref() else {
        return Vec::new();
    };
    let blocks = event
        .message
        .map(|m| parse_blocks(&m.content))
        .unwrap_or_default();

    let mut out = Vec::new();
    match kind {
        "assistant" => {
            for block in blocks {
                match block {
                    Block::Text { text } if !text.is_empty() => {
                        out.push(text.cyan().to_string());
                    }
                    Block::ToolUse { name, input } => {
                        out.push(format_tool_use(&name, &input));
                    }
                    _ => {}
                }
            }
        }
        "user" => {
            for block in blocks {
                if let Block::ToolResult { content } = block {
                    if let Some(preview) = format_tool_result(&content) {
                        out.push(preview.dimmed().to_string());
                    }
                }
            }
        }
        _ => {}
    }
    out
}

fn parse_blocks(content: &Value) -> Vec<Block> {
    let Value::Array(items) = content else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

/// One-line summary of a tool invocation: the tool name plus its most
/// interesting argument.
fn format_tool_use(name: &str, input: &Value) -> String {
    let arg = match name {
        "Read" | "Write" | "Edit" => input.get("file_path").and_then(Value::as_str).map(String::from),
        "Bash" => input
            .get("command")
            .and_then(Value::as_str)
            .map(|c| c.chars().take(COMMAND_PREVIEW_CHARS).collect()),
        "Glob" | "Grep" => input.get("pattern").and_then(Value::as_str).map(String::from),
        _ => None,
    };
    match arg {
        Some(arg) => format!("  -> {} {}", name.yellow(), arg.dimmed()),
        None => format!("  -> {}", name.yellow()),
    }
}

/// Indented preview of a tool result: first lines only, long lines
/// truncated, with a marker for what was elided.
fn format_tool_result(content: &Value) -> Option<String> {
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let texts: Vec<&str> = items
                .iter()
                .filter(|i| i.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|i| i.get("text").and_then(Value::as_str))
                .collect();
            if texts.is_empty() {
                content.to_string()
            } else {
                texts.join("\n")
            }
        }
        Value::Null => return None,
        other => other.to_string(),
    };
    if text.trim().is_empty() {
        return None;
    }

    let lines: Vec<String> = text
        .lines()
        .map(|l| {
            if l.chars().count() > LINE_TRUNCATE_CHARS {
                let truncated: String = l.chars().take(LINE_TRUNCATE_CHARS).collect();
                format!("{truncated}...")
            } else {
                l.to_string()
            }
        })
        .collect();

    let shown: Vec<String> = lines
        .iter()
        .take(PREVIEW_LINES)
        .filter(|l| !l.trim().is_empty())
        .map(|l| format!("    {l}"))
        .collect();
    if shown.is_empty() {
        return None;
    }

    if lines.len() > PREVIEW_LINES {
        let elided = lines.len() - PREVIEW_LINES;
        Some(format!("{}\n    ... ({elided} more lines)", shown.join("\n")))
    } else {
        Some(shown.join("\n"))
    }
}
