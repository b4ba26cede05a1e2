//! Prompt assembly: pure string construction, no I/O.
//!
//! Every agent invocation gets a deterministic prompt built from the
//! task, the mode, an optional role directive, and any queued user
//! input. The same configuration always yields the same text.

use crate::select::Mode;
use crate::task::Task;

/// Relative path of the working-convention document the agent reads
/// before anything else.
pub const WORKING_DOC: &str = ".foreman/working.md";

/// Relative path of the goal document.
pub const IDEA_DOC: &str = ".foreman/idea.md";

/// Relative path of the live task list.
pub const TASKS_DOC: &str = ".foreman/tasks.jsonl";

/// Marker the agent emits when it judges the project complete.
pub const COMPLETION_MARKER: &str = "PROJECT_COMPLETE";

/// Specialized perspective layered onto a task prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Fresh eyes after many iterations on the same task.
    Reviewer,
    /// Design-integrity check during verification.
    Architect,
}

impl Role {
    pub fn directive(&self) -> &'static str {
        match self {
            Role::Reviewer => "Code Reviewer - provide fresh perspective on approach",
            Role::Architect => "Architect - verify design meets original goals",
        }
    }
}

/// Number of work iterations on one task after which a reviewer role
/// is layered in.
const REVIEWER_ITERATION_THRESHOLD: u32 = 5;

/// Decide which role, if any, applies to this iteration.
pub fn role_for(iteration: u32, mode: Mode) -> Option<Role> {
    if mode == Mode::Verify {
        return Some(Role::Architect);
    }
    if iteration >= REVIEWER_ITERATION_THRESHOLD && mode == Mode::Work {
        return Some(Role::Reviewer);
    }
    None
}

/// Configuration for one task prompt: mode, optional role, optional
/// user input. Consumed by [`TaskPrompt::render`].
#[derive(Debug, Clone)]
pub struct TaskPrompt<'a> {
    pub task: &'a Task,
    pub mode: Mode,
    pub role: Option<Role>,
    pub user_input: Option<&'a str>,
}

impl<'a> TaskPrompt<'a> {
    pub fn new(task: &'a Task, mode: Mode) -> Self {
        Self {
            task,
            mode,
            role: None,
            user_input: None,
        }
    }

    pub fn with_role(mut self, role: Option<Role>) -> Self {
        self.role = role;
        self
    }

    pub fn with_user_input(mut self, user_input: Option<&'a str>) -> Self {
        self.user_input = user_input;
        self
    }

    /// Assemble the prompt text.
    pub fn render(&self) -> String {
        let mut parts = vec![format!("Read {WORKING_DOC} and execute."), String::new()];

        if let Some(input) = self.user_input {
            parts.push("USER INPUT (address this first):".to_string());
            parts.push(input.to_string());
            parts.push(String::new());
        }

        parts.push(format!("TASK: [{}] {}", self.task.id, self.task.title));

        match self.mode {
            Mode::Verify => {
                parts.push("MODE: VERIFY".to_string());
                parts.push("All subtasks are complete. Verify the original goal is met.".to_string());
                parts.push(format!("- If done -> mark [{}] as complete", self.task.id));
                parts.push("- If gaps remain -> add more subtasks".to_string());
            }
            Mode::Work => {
                parts.push("MODE: WORK".to_string());
                parts.push("- If doable -> complete the task".to_string());
                parts.push("- If too big -> split into subtasks".to_string());
            }
        }

        if let Some(role) = self.role {
            parts.push(String::new());
            parts.push(format!("ROLE: {}", role.directive()));
        }

        parts.join("\n")
    }
}

/// Prompt used when the goal document was never filled in: interview
/// the user and write it.
pub fn setup_prompt() -> String {
    format!(
        "The project was initialized but {IDEA_DOC} was never filled in.\n\
         \n\
         Read {WORKING_DOC} to understand how we work, then help define {IDEA_DOC}.\n\
         \n\
         Use the AskUserQuestion tool to ask questions one at a time until you're 99% sure about what they want to build.\n\
         \n\
         Cover these topics:\n\
         - Goals: What are they building? What problem does it solve?\n\
         - Tech stack: Languages, frameworks, key dependencies\n\
         - Development workflow: TDD? Testing requirements? Code style?\n\
         - Constraints: Any rules, limitations, or standards\n\
         - Success criteria: How do we know when it's done?\n\
         \n\
         After gathering all answers, write the complete {IDEA_DOC} file.\n\
         \n\
         Then create an initial task in {TASKS_DOC} based on the project goals.\n\
         Use the Write tool (NOT bash/echo) to write the task:\n\
         {{\"id\": \"1\", \"title\": \"Set up project structure\", \"status\": \"pending\"}}"
    )
}

/// Prompt used when the task list is empty: verify every success
/// criterion or append new tasks.
pub fn completion_check_prompt() -> String {
    let lines: Vec<String> = vec![
        "The task list is empty. Verify the project is complete.".to_string(),
        String::new(),
        "## Context Files (read in order)".to_string(),
        format!("1. {WORKING_DOC} - understand how we work"),
        format!("2. {IDEA_DOC} - project vision and success criteria"),
        String::new(),
        "## Instructions".to_string(),
        "1. Review the codebase to assess what has been built".to_string(),
        format!("2. Compare against ALL goals and success criteria in {IDEA_DOC}"),
        "3. Test or verify that success criteria are actually met, not just implemented"
            .to_string(),
        String::new(),
        "## Decision".to_string(),
        format!("- If ALL success criteria are met -> respond with: {COMPLETION_MARKER}"),
        "- If ANY gaps remain -> add new tasks using the Write tool (NOT bash/echo)".to_string(),
        String::new(),
        "## Adding Tasks (IMPORTANT)".to_string(),
        format!("1. First READ {TASKS_DOC} (required before writing)"),
        "2. Then use the Write tool to write tasks - do NOT use bash or echo".to_string(),
        "Each line must be valid JSON with id, title, and status:".to_string(),
        r#"{"id": "1", "title": "Short task description", "status": "pending"}"#.to_string(),
        "Do NOT escape special characters - write plain JSON.".to_string(),
        String::new(),
        "Be thorough and critical. A project is only complete when ALL criteria are verified."
            .to_string(),
    ];
    lines.join("\n")
}

/// Prompt wrapping free-form user input when no task is selectable.
pub fn interpretation_prompt(user_input: &str) -> String {
    format!(
        "No active tasks. User says:\n\
         \n\
         {user_input}\n\
         \n\
         If this is a task request, add it to {TASKS_DOC}.\n\
         If it's a question, answer it briefly.\n\
         If it's feedback about the project, incorporate it appropriately."
    )
}

/// Prompt used by `foreman edit` for an interactive goal-definition
/// session.
pub fn edit_prompt() -> String {
    format!(
        "Read {WORKING_DOC} and help me define {IDEA_DOC} with my project idea. \
         Ask me questions until you're 99% sure about what I want to build. \
         Cover: goals, constraints, tech stack, and success criteria."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    fn task(id: &str, title: &str) -> Task {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            status: TaskStatus::Pending,
            commit: None,
        }
    }

    #[test]
    fn test_work_prompt_shape() {
        let t = task("3.1", "Add EXIF parser");
        let prompt = TaskPrompt::new(&t, Mode::Work).render();

        assert!(prompt.starts_with("Read .foreman/working.md and execute."));
        assert!(prompt.contains("TASK: [3.1] Add EXIF parser"));
        assert!(prompt.contains("MODE: WORK"));
        assert!(prompt.contains("split into subtasks"));
        assert!(!prompt.contains("ROLE:"));
        assert!(!prompt.contains("USER INPUT"));
    }

    #[test]
    fn test_verify_prompt_shape() {
        let t = task("3", "Photo pipeline");
        let prompt = TaskPrompt::new(&t, Mode::Verify).render();

        assert!(prompt.contains("MODE: VERIFY"));
        assert!(prompt.contains("mark [3] as complete"));
        assert!(prompt.contains("add more subtasks"));
    }

    #[test]
    fn test_user_input_comes_before_task() {
        let t = task("1", "Setup");
        let prompt = TaskPrompt::new(&t, Mode::Work)
            .with_user_input(Some("switch to sqlite"))
            .render();

        let input_pos = prompt.find("USER INPUT").expect("input header");
        let task_pos = prompt.find("TASK:").expect("task header");
        assert!(input_pos < task_pos);
        assert!(prompt.contains("switch to sqlite"));
    }

    #[test]
    fn test_role_appended_last() {
        let t = task("1", "Setup");
        let prompt = TaskPrompt::new(&t, Mode::Work)
            .with_role(Some(Role::Reviewer))
            .render();
        assert!(prompt.trim_end().ends_with(Role::Reviewer.directive()));
    }

    #[test]
    fn test_render_is_deterministic() {
        let t = task("1", "Setup");
        let a = TaskPrompt::new(&t, Mode::Work).render();
        let b = TaskPrompt::new(&t, Mode::Work).render();
        assert_eq!(a, b);
    }

    #[test]
    fn test_role_triggers() {
        assert_eq!(role_for(1, Mode::Work), None);
        assert_eq!(role_for(4, Mode::Work), None);
        assert_eq!(role_for(5, Mode::Work), Some(Role::Reviewer));
        assert_eq!(role_for(12, Mode::Work), Some(Role::Reviewer));
        assert_eq!(role_for(1, Mode::Verify), Some(Role::Architect));
    }

    #[test]
    fn test_completion_check_mentions_marker_and_tasks_file() {
        let prompt = completion_check_prompt();
        assert!(prompt.contains(COMPLETION_MARKER));
        assert!(prompt.contains(TASKS_DOC));
    }

    #[test]
    fn test_interpretation_embeds_input() {
        let prompt = interpretation_prompt("please add dark mode");
        assert!(prompt.contains("please add dark mode"));
        assert!(prompt.contains(TASKS_DOC));
    }

    #[test]
    fn test_setup_prompt_mentions_docs() {
        let prompt = setup_prompt();
        assert!(prompt.contains(IDEA_DOC));
        assert!(prompt.contains(WORKING_DOC));
    }
}
