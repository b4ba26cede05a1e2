//! Task records and the dotted-id hierarchy.
//!
//! A task id is a dotted path: `"3"` is a root task, `"3.1"` and
//! `"3.1.2"` are descendants. Depth equals the number of dots. Direct
//! children share the parent id as a prefix plus exactly one more
//! segment.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task. Any other value in the store is a
/// validation error and the record is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting to be picked up.
    Pending,
    /// Claimed by the controller; survives a crash and is resumed.
    Active,
    /// Work finished and verified by the agent.
    Complete,
    /// Decomposed into child tasks instead of completed directly.
    Split,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Complete => "complete",
            TaskStatus::Split => "split",
        };
        write!(f, "{s}")
    }
}

/// One unit of work, serialized as a single JSON line in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    /// Short hash of the squash commit, attached once work lands on
    /// the base branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: TaskStatus::Pending,
            commit: None,
        }
    }

    /// Depth in the tree: number of dots in the id.
    pub fn depth(&self) -> usize {
        depth(&self.id)
    }

    /// Root tasks own archival for their whole subtree.
    pub fn is_root(&self) -> bool {
        is_root(&self.id)
    }
}

/// Archive record: the task's fields plus completion metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedTask {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub completed: NaiveDate,
    pub commit: String,
}

impl ArchivedTask {
    pub fn from_task(task: &Task, completed: NaiveDate, commit: impl Into<String>) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status,
            completed,
            commit: commit.into(),
        }
    }
}

/// Number of dots in an id.
pub fn depth(id: &str) -> usize {
    id.matches('.').count()
}

/// A root id contains no dot.
pub fn is_root(id: &str) -> bool {
    !id.contains('.')
}

/// Find a task by id.
pub fn find<'a>(tasks: &'a [Task], id: &str) -> Option<&'a Task> {
    tasks.iter().find(|t| t.id == id)
}

/// Direct children of a task: `A` -> `A.1`, `A.2`, but not `A.1.1`.
pub fn direct_children<'a>(tasks: &'a [Task], parent_id: &str) -> Vec<&'a Task> {
    let prefix = format!("{parent_id}.");
    let child_depth = depth(parent_id) + 1;
    tasks
        .iter()
        .filter(|t| t.id.starts_with(&prefix) && depth(&t.id) == child_depth)
        .collect()
}

/// All descendants of a task at any depth.
pub fn descendants<'a>(tasks: &'a [Task], parent_id: &str) -> Vec<&'a Task> {
    let prefix = format!("{parent_id}.");
    tasks.iter().filter(|t| t.id.starts_with(&prefix)).collect()
}
