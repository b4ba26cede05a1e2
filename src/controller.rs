//! The loop controller: poll, claim, branch, iterate, finalize.
//!
//! One controller process drives the loop; tasks are strictly
//! serialized. Each cycle claims a task, works it on its own branch
//! through bounded agent iterations, then folds the result into the
//! base branch. Shutdown is cooperative: a stop sentinel and the
//! console quit flag are checked once per poll, never mid-agent-call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::Colorize;
use tracing::{info, warn};

use crate::agent::AgentRunner;
use crate::config::{Settings, Workspace};
use crate::error::{ForemanError, Result};
use crate::git::Git;
use crate::input::{self, ConsoleInput};
use crate::prompt::{self, TaskPrompt};
use crate::select::{self, Mode};
use crate::store::TaskStore;
use crate::task::{self, Task, TaskStatus};

/// Characters of user input shown in log lines.
const INPUT_LOG_CHARS: usize = 50;

/// Title of the synthetic task that decomposes the goal document.
const BOOTSTRAP_TITLE: &str = "Read idea.md and create initial task breakdown";

/// Whether the poll loop keeps going or shuts down.
enum LoopSignal {
    Continue,
    Stop,
}

/// Top-level state machine driving the agent through the task tree.
#[derive(Debug)]
pub struct Controller {
    workspace: Workspace,
    settings: Settings,
    store: TaskStore,
    agent: AgentRunner,
    git: Git,
    console: Option<ConsoleInput>,
    daemon: bool,
    base_branch: String,
    quit: Arc<AtomicBool>,
    waiting_logged: bool,
}

impl Controller {
    /// Run startup checks and capture the base branch.
    ///
    /// Fails fatally when the workspace is missing, the agent command
    /// is not on PATH, the project is not a git repository, or no
    /// branch is checked out.
    pub fn new(
        workspace: Workspace,
        settings: Settings,
        console: bool,
        daemon: bool,
    ) -> Result<Self> {
        if !workspace.exists() {
            return Err(ForemanError::NotInitialized {
                path: workspace.dir(),
            });
        }

        let agent = AgentRunner::new(&settings, workspace.root());
        if !agent.installed() {
            return Err(ForemanError::MissingTool {
                tool: settings.agent_command.clone(),
            });
        }

        let git = Git::new(workspace.root());
        if !git.is_repo() {
            return Err(ForemanError::NotARepo {
                message: "run 'git init' first, then try again".to_string(),
            });
        }
        let base_branch = git.current_branch()?;

        let console = console.then(ConsoleInput::start);
        let quit = console
            .as_ref()
            .map(ConsoleInput::quit_flag)
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
        let store = TaskStore::new(&workspace);

        Ok(Self {
            workspace,
            settings,
            store,
            agent,
            git,
            console,
            daemon,
            base_branch,
            quit,
            waiting_logged: false,
        })
    }

    /// Drive the loop until stopped or complete.
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();
        info!("Foreman loop starting (base branch: {})", self.base_branch);

        // Interrupts set the same quit flag the console uses, so
        // shutdown happens at the next safe point.
        let quit = Arc::clone(&self.quit);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                quit.store(true, Ordering::SeqCst);
            }
        });

        loop {
            // POLLING
            if self.stop_requested() {
                break;
            }

            let tasks = self.store.load()?;
            let Some((selected, mode)) = select::select(&tasks) else {
                match self.idle().await? {
                    LoopSignal::Stop => break,
                    LoopSignal::Continue => continue,
                }
            };
            let selected = selected.clone();
            self.waiting_logged = false;

            match self.work_cycle(tasks, selected, mode).await? {
                LoopSignal::Stop => break,
                LoopSignal::Continue => {}
            }
        }

        info!("Foreman loop stopped");
        println!("\nFull log: {}", self.workspace.log_file().display());
        Ok(())
    }

    fn print_banner(&self) {
        println!("{}", "═".repeat(60).bright_blue());
        println!("{}", "     FOREMAN - agent task loop".bright_blue().bold());
        println!("{}", "═".repeat(60).bright_blue());
        println!();
        println!("   Project: {}", self.workspace.root().display());
        println!("   Base branch: {}", self.base_branch);
        println!("   Max iterations per task: {}", self.settings.max_iterations);
        if self.daemon {
            println!("   Daemon mode: polling every {}s", self.settings.poll_interval_secs);
        }
        println!();
    }

    /// Check the stop sentinel (consumed when present) and the quit
    /// flag.
    fn stop_requested(&self) -> bool {
        if consume_stop_sentinel(&self.workspace) {
            info!("Stop signal received");
            return true;
        }
        if self.quit.load(Ordering::SeqCst) {
            info!("Quit requested");
            return true;
        }
        false
    }

    /// No selectable task: interpret queued input, bootstrap a defined
    /// but unstarted project, wait in daemon mode, or run the setup /
    /// completion-check prompts.
    async fn idle(&mut self) -> Result<LoopSignal> {
        if let Some(user_input) = input::gather(&self.workspace, self.console.as_mut()) {
            info!("Processing user input: {}...", excerpt(&user_input));
            self.waiting_logged = false;
            let outcome = self
                .agent
                .run_with_retry(&prompt::interpretation_prompt(&user_input))
                .await?;
            if outcome.error.is_fatal_for_loop() {
                return self.halt_no_budget();
            }
            return Ok(LoopSignal::Continue);
        }

        if self.workspace.is_never_started() {
            info!("Project defined but no tasks. Creating bootstrap task...");
            let bootstrap = Task::new("0", BOOTSTRAP_TITLE);
            self.store.save(&[bootstrap])?;
            return Ok(LoopSignal::Continue);
        }

        if self.daemon {
            if !self.waiting_logged {
                info!("No tasks. Waiting... (type a message or add tasks)");
                self.waiting_logged = true;
            }
            tokio::time::sleep(self.settings.poll_interval()).await;
            return Ok(LoopSignal::Continue);
        }

        if self.workspace.is_idea_template() {
            info!("Project not initialized. Running setup...");
            let outcome = self.agent.run_with_retry(&prompt::setup_prompt()).await?;
            if outcome.error.is_fatal_for_loop() {
                return self.halt_no_budget();
            }
            return Ok(LoopSignal::Continue);
        }

        info!("Task list empty. Verifying project completion...");
        let outcome = self
            .agent
            .run_with_retry(&prompt::completion_check_prompt())
            .await?;
        if !outcome.success() {
            if outcome.error.is_fatal_for_loop() {
                return self.halt_no_budget();
            }
            return Ok(LoopSignal::Continue);
        }

        let tasks = self.store.load()?;
        if !tasks.is_empty() {
            info!("New tasks identified. Continuing...");
            Ok(LoopSignal::Continue)
        } else {
            info!("Project complete. Exiting.");
            println!("\n{} Project complete.", "Done:".green().bold());
            Ok(LoopSignal::Stop)
        }
    }

    /// One full task cycle: CLAIMED, BRANCHED, ITERATING, FINALIZING.
    async fn work_cycle(
        &mut self,
        mut tasks: Vec<Task>,
        selected: Task,
        mode: Mode,
    ) -> Result<LoopSignal> {
        let task_id = selected.id.clone();
        println!(
            "\n{} [{}] [{}] {} {}",
            "===".bright_blue(),
            mode.to_string().to_uppercase(),
            task_id,
            selected.title,
            "===".bright_blue()
        );
        info!("Cycle start: [{mode}] [{task_id}] {}", selected.title);

        // CLAIMED: persist `active` before any side effects so a crash
        // resumes here.
        self.store
            .set_status(&mut tasks, &task_id, TaskStatus::Active)?;

        // BRANCHED
        let branch = self.git.create_or_resume_branch(&task_id, &selected.title)?;
        info!("On branch: {branch}");

        // ITERATING
        let mut task_done = false;
        let mut halt = false;
        for iteration in 1..=self.settings.max_iterations {
            println!(
                "{} Iteration {}/{}",
                "---".bright_blue(),
                iteration,
                self.settings.max_iterations
            );

            let user_input = input::gather(&self.workspace, self.console.as_mut());
            if let Some(ref input) = user_input {
                info!("User input received: {}...", excerpt(input));
            }

            let text = TaskPrompt::new(&selected, mode)
                .with_role(prompt::role_for(iteration, mode))
                .with_user_input(user_input.as_deref())
                .render();

            let outcome = self.agent.run_with_retry(&text).await?;
            if !outcome.success() {
                if outcome.error.is_fatal_for_loop() {
                    halt = true;
                    break;
                }
                // Transient failures were already retried inside the
                // runner; the failed attempt still counts against the
                // ceiling.
                continue;
            }

            let current = self.store.load()?;
            let Some(refreshed) = task::find(&current, &task_id) else {
                warn!("Task {task_id} disappeared from the store");
                break;
            };
            match refreshed.status {
                TaskStatus::Complete => {
                    info!("Task {task_id} marked complete");
                    task_done = true;
                    break;
                }
                TaskStatus::Split => {
                    info!("Task {task_id} was split into subtasks");
                    task_done = true;
                    break;
                }
                _ => {}
            }

            tokio::time::sleep(self.settings.iteration_pause()).await;
        }

        if !task_done && !halt {
            warn!(
                "Task {task_id} not complete after {} iterations",
                self.settings.max_iterations
            );
        }

        // FINALIZING: act on whatever status the store holds now.
        let mut tasks = self.store.load()?;
        match task::find(&tasks, &task_id).map(|t| t.status) {
            Some(TaskStatus::Complete) => {
                let hash =
                    self.git
                        .squash_merge(&branch, &task_id, &selected.title, &self.base_branch)?;
                if selected.is_root() {
                    self.store.archive_tree(&mut tasks, &task_id, &hash)?;
                    info!("Completed & archived: [{task_id}] {} ({hash})", selected.title);
                    println!(
                        "{} Completed & archived: [{}] {} ({})",
                        "===".green(),
                        task_id,
                        selected.title,
                        hash
                    );
                } else {
                    // Non-root completions stay in the store until the
                    // root of their tree completes.
                    self.store.record_commit(&mut tasks, &task_id, &hash)?;
                    info!("Completed: [{task_id}] {} ({hash})", selected.title);
                    println!(
                        "{} Completed: [{}] {} ({})",
                        "===".green(),
                        task_id,
                        selected.title,
                        hash
                    );
                }
            }
            Some(TaskStatus::Split) => {
                self.git
                    .merge_split_branch(&branch, &task_id, &self.base_branch)?;
                info!("Split: [{task_id}] - children pending");
                println!("{} Split: [{}] - children pending", "===".yellow(), task_id);
            }
            _ => {
                // Ceiling exhausted or halted while still active: keep
                // the record `active` so the next poll resumes it, and
                // keep the branch for review.
                self.git.preserve_branch(&self.base_branch)?;
                info!("Branch {branch} preserved for review");
                println!(
                    "   {} Branch {} preserved for review",
                    "Warning:".yellow().bold(),
                    branch
                );
            }
        }

        if halt {
            return self.halt_no_budget();
        }
        Ok(LoopSignal::Continue)
    }

    fn halt_no_budget(&self) -> Result<LoopSignal> {
        warn!("Cannot continue - out of tokens/credits");
        println!(
            "   {} Out of tokens/credits; stopping.",
            "Error:".red().bold()
        );
        Ok(LoopSignal::Stop)
    }
}

/// Delete and report the stop sentinel if present.
fn consume_stop_sentinel(workspace: &Workspace) -> bool {
    let sentinel = workspace.stop_file();
    if !sentinel.exists() {
        return false;
    }
    if let Err(e) = std::fs::remove_file(&sentinel) {
        warn!("Could not remove stop sentinel: {e}");
    }
    true
}

fn excerpt(text: &str) -> String {
    text.chars().take(INPUT_LOG_CHARS).collect()
}
