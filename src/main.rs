use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use drover::config::{DroverToml, Mode, RunOverrides, RunnerConfig};
use drover::errors::RunnerError;
use drover::input::ConsoleInput;
use drover::logger::RunLogger;
use drover::runner::Runner;

#[derive(Parser)]
#[command(name = "drover")]
#[command(version, about = "Plan-driven orchestrator for agent CLI tools")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Explicit config file (default: drover.toml in the project dir, then
    /// the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the phase pipeline against the project plan
    Run {
        /// Pipeline mode
        #[arg(short, long, value_enum)]
        mode: Option<Mode>,

        /// Path to the plan file. If not provided, uses PLAN.md or the newest
        /// plan under docs/plans/
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Task-phase iteration budget
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Retries after the first task failure before the run aborts
        #[arg(long)]
        task_retries: Option<u32>,

        /// Skip the finalize step
        #[arg(long)]
        no_finalize: bool,
    },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a default drover.toml to the project directory
    Init,
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "drover=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let load_toml = || match &cli.config {
        Some(path) => DroverToml::load(path),
        None => DroverToml::load_or_default(&project_dir),
    };

    match &cli.command {
        Commands::Run {
            mode,
            plan,
            max_iterations,
            task_retries,
            no_finalize,
        } => {
            let overrides = RunOverrides {
                mode: *mode,
                plan_file: plan.clone(),
                max_iterations: *max_iterations,
                task_retries: *task_retries,
                no_finalize: *no_finalize,
            };
            let config = RunnerConfig::build(&project_dir, load_toml()?, overrides)?;

            let cancel = CancellationToken::new();
            let interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!();
                    eprintln!(
                        "{}",
                        style("Interrupt received; stopping the current tool").yellow()
                    );
                    interrupt.cancel();
                }
            });

            let logger = Arc::new(RunLogger::new(config.progress_file.clone(), cli.verbose));
            let runner = Runner::new(config, Arc::clone(&logger), Arc::new(ConsoleInput), cancel);

            match runner.run().await {
                Ok(()) => {
                    println!(
                        "{} progress log at {}",
                        style("Run complete.").green().bold(),
                        logger.progress_path().display()
                    );
                }
                Err(RunnerError::Canceled) => {
                    eprintln!("{}", style("Run canceled").yellow().bold());
                    std::process::exit(130);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Config { command } => {
            match command.clone().unwrap_or(ConfigCommands::Show) {
                ConfigCommands::Show => {
                    let toml = load_toml()?;
                    let rendered = toml::to_string_pretty(&toml)
                        .context("Failed to render configuration")?;
                    print!("{rendered}");
                }
                ConfigCommands::Init => {
                    let path = project_dir.join("drover.toml");
                    if path.exists() {
                        bail!("{} already exists", path.display());
                    }
                    DroverToml::default().save(&path)?;
                    println!("Wrote {}", path.display());
                }
            }
        }
    }

    Ok(())
}
