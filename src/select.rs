//! Task selection: a pure function over a store snapshot.

use crate::task::{self, Task, TaskStatus};

/// What the agent is asked to do with the selected task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Complete the task or split it into subtasks.
    Work,
    /// Confirm a split task's goal is met by its completed children.
    Verify,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Work => write!(f, "work"),
            Mode::Verify => write!(f, "verify"),
        }
    }
}

/// Choose the next task and mode from a snapshot.
///
/// Priority, first match wins:
/// 1. Any `active` task — resume interrupted work before anything new.
/// 2. First `pending` task in file order.
/// 3. First `split` task whose direct children are non-empty and all
///    `complete` — ready for verification. Deeper descendants are not
///    consulted.
///
/// Returns `None` when nothing is selectable, signaling idle handling.
pub fn select(tasks: &[Task]) -> Option<(&Task, Mode)> {
    if let Some(active) = tasks.iter().find(|t| t.status == TaskStatus::Active) {
        return Some((active, Mode::Work));
    }

    if let Some(pending) = tasks.iter().find(|t| t.status == TaskStatus::Pending) {
        return Some((pending, Mode::Work));
    }

    for candidate in tasks.iter().filter(|t| t.status == TaskStatus::Split) {
        let children = task::direct_children(tasks, &candidate.id);
        if !children.is_empty()
            && children.iter().all(|c| c.status == TaskStatus::Complete)
        {
            return Some((candidate, Mode::Verify));
        }
    }

    None
}
