//! Project scaffolding for `foreman init`.
//!
//! Creates the `.foreman/` workspace with template documents and an
//! empty task list. Refuses to touch an already-initialized project.

use colored::Colorize;
use std::fs;

use crate::config::Workspace;
use crate::error::{ForemanError, Result};

/// Scaffolds a new foreman workspace.
pub struct Scaffold<'a> {
    workspace: &'a Workspace,
}

impl<'a> Scaffold<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self { workspace }
    }

    /// Create the workspace directory, template documents, and an
    /// empty task list.
    pub fn run(&self) -> Result<()> {
        let dir = self.workspace.dir();
        if dir.exists() {
            return Err(ForemanError::AlreadyInitialized { path: dir });
        }

        fs::create_dir_all(&dir)?;
        println!("Created {}/", dir.display());

        let files = [
            (self.workspace.idea_file(), include_str!("templates/idea.md")),
            (
                self.workspace.working_file(),
                include_str!("templates/working.md"),
            ),
            (self.workspace.tasks_file(), ""),
        ];
        for (path, content) in files {
            fs::write(&path, content)?;
            println!("   Created: {}", path.display());
        }

        println!();
        println!("{} Next steps:", "Initialized!".green().bold());
        println!("  1. Run: foreman edit    # Define your project in idea.md");
        println!("  2. Run: foreman         # Start the loop");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scaffold_creates_workspace() {
        let temp = TempDir::new().expect("temp dir");
        let ws = Workspace::new(temp.path());

        Scaffold::new(&ws).run().expect("scaffold");

        assert!(ws.dir().exists());
        assert!(ws.idea_file().exists());
        assert!(ws.working_file().exists());
        assert!(ws.tasks_file().exists());
        assert_eq!(
            fs::read_to_string(ws.tasks_file()).expect("read tasks"),
            ""
        );
    }

    #[test]
    fn test_scaffolded_idea_is_the_unfilled_template() {
        let temp = TempDir::new().expect("temp dir");
        let ws = Workspace::new(temp.path());

        Scaffold::new(&ws).run().expect("scaffold");

        assert!(ws.is_idea_template());
        assert!(!ws.is_never_started());
    }

    #[test]
    fn test_scaffold_refuses_reinit() {
        let temp = TempDir::new().expect("temp dir");
        let ws = Workspace::new(temp.path());

        Scaffold::new(&ws).run().expect("scaffold");
        let err = Scaffold::new(&ws).run().expect_err("second run");
        assert!(matches!(err, ForemanError::AlreadyInitialized { .. }));
    }
}
