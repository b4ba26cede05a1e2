//! Foreman - external orchestration loop for a coding agent.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use foreman::bootstrap::Scaffold;
use foreman::controller::Controller;
use foreman::error::{ForemanError, Result};
use foreman::{prompt, Settings, Workspace};

#[derive(Parser)]
#[command(name = "foreman")]
#[command(version = "0.1.0")]
#[command(about = "External orchestration loop for a coding agent", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Enable interactive console input
    #[arg(short, long, global = true)]
    console: bool,

    /// Run as daemon (poll forever instead of exiting when idle)
    #[arg(short, long, global = true)]
    daemon: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a foreman project
    Init,
    /// Define the goal document interactively with the agent
    Edit,
    /// Run the loop (also the default when initialized)
    Run,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let workspace = Workspace::new(&cli.project);
    init_tracing(&workspace);

    let result = match cli.command {
        Some(Commands::Init) => cmd_init(&workspace),
        Some(Commands::Edit) => cmd_edit(&workspace),
        Some(Commands::Run) => cmd_run(workspace, cli.console, cli.daemon).await,
        None => {
            if workspace.exists() {
                cmd_run(workspace, cli.console, cli.daemon).await
            } else {
                let _ = Cli::command().print_help();
                println!("\nTo get started, run: foreman init");
                Ok(())
            }
        }
    };

    if let Err(e) = result {
        eprintln!("{} {e}", "Error:".red().bold());
        std::process::exit(e.exit_code());
    }
}

fn cmd_init(workspace: &Workspace) -> Result<()> {
    Scaffold::new(workspace).run()
}

/// Launch the agent interactively to fill in the goal document.
fn cmd_edit(workspace: &Workspace) -> Result<()> {
    if !workspace.exists() {
        return Err(ForemanError::NotInitialized {
            path: workspace.dir(),
        });
    }
    let settings = Settings::load(workspace)?;
    let status = std::process::Command::new(&settings.agent_command)
        .arg(prompt::edit_prompt())
        .current_dir(workspace.root())
        .status()
        .map_err(|e| {
            ForemanError::agent(format!("failed to launch '{}': {e}", settings.agent_command))
        })?;
    if !status.success() {
        return Err(ForemanError::agent(format!(
            "'{}' exited with {status}",
            settings.agent_command
        )));
    }
    Ok(())
}

async fn cmd_run(workspace: Workspace, console: bool, daemon: bool) -> Result<()> {
    let settings = Settings::load(&workspace)?;
    let mut controller = Controller::new(workspace, settings, console, daemon)?;
    controller.run().await
}

/// Log with timestamps to the console and, when the workspace exists,
/// to the persistent log file as well.
fn init_tracing(workspace: &Workspace) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer().with_target(false);
    let registry = tracing_subscriber::registry().with(filter).with(console_layer);

    if workspace.exists() {
        if let Ok(file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(workspace.log_file())
        {
            let file = Arc::new(file);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(move || Arc::clone(&file));
            registry.with(file_layer).init();
            return;
        }
    }
    registry.init();
}
