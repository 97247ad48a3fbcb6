//! sentinel CLI
//!
//! Single binary for every sentinel role:
//! - Manager setup and the registration daemon
//! - Agent enrolment
//! - Operator commands (pending, accept, list, run)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel::commands::{self, Role};
use sentinel::output::print_error;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(author, version, about = "Enrol agents over SSH and run commands on them")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set this machine up as a manager or an agent
    Install {
        /// Role to install; prompts when omitted
        #[arg(short, long, value_enum)]
        role: Option<Role>,
        /// Manager to register with (agent role)
        #[arg(short, long)]
        manager: Option<String>,
        /// Regenerate the manager keypair without asking
        #[arg(short, long)]
        force: bool,
        /// Install the registration daemon as a systemd service (manager role)
        #[arg(short, long)]
        service: bool,
    },

    /// Run the registration listener in the foreground
    Daemon {
        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// List agents waiting for approval
    Pending,

    /// Approve a pending agent and push the manager key to it
    Accept {
        /// Address shown by `sentinel pending`
        address: String,
        /// Alias to record; prompts when omitted
        #[arg(short, long)]
        alias: Option<String>,
    },

    /// List trusted agents
    List,

    /// Run a command on a trusted agent
    Run {
        /// Alias or address of the agent
        target: String,
        /// Command to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

impl Commands {
    /// Long-running commands log progress at info level by default
    fn default_log_level(&self) -> &'static str {
        match self {
            Commands::Daemon { .. } | Commands::Install { .. } => "info",
            _ => "warn",
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => cli.command.default_log_level(),
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            1
        }
    };

    // Do not wait on a terminal read still blocked from `run`
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Install {
            role,
            manager,
            force,
            service,
        } => {
            commands::install_command(config_path, role, manager, force, service).await?;
        }

        Commands::Daemon { bind } => {
            let (_, config) = commands::load_config(config_path)?;
            commands::daemon_command(config.manager, bind).await?;
        }

        Commands::Pending => {
            let (_, config) = commands::load_config(config_path)?;
            commands::pending_command(&config.manager).await?;
        }

        Commands::Accept { address, alias } => {
            let (_, config) = commands::load_config(config_path)?;
            commands::accept_command(config.manager, &address, alias).await?;
        }

        Commands::List => {
            let (_, config) = commands::load_config(config_path)?;
            commands::list_command(&config.manager).await?;
        }

        Commands::Run { target, command } => {
            let (_, config) = commands::load_config(config_path)?;
            return commands::run_command(config.manager, &target, &command).await;
        }
    }

    Ok(0)
}
