//! Install command implementation
//!
//! `sentinel install` sets a machine up in one of two roles:
//!
//! - **manager**: prepares the config root, generates the keypair and
//!   optionally installs the registration daemon as a systemd service
//! - **agent**: creates the execution account, registers with a manager and
//!   waits until an operator runs `sentinel accept` there

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use sx_agent::{enroll, EnrollOutcome, SystemAccount};
use sx_core::config::{self, ConfigFile};
use sx_core::service::SystemdService;
use sx_core::setup::prepare_manager_root;
use sx_core::traits::{AccountProvisioner, ServiceInstaller};
use sx_manager::KeyAuthority;

use crate::commands::{confirm, load_config, prompt, shutdown_token};
use crate::output::{print_info, print_success, print_warning};

/// Role of the machine being installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    Manager,
    Agent,
}

impl Role {
    fn parse(answer: &str) -> Option<Self> {
        match answer.to_ascii_lowercase().as_str() {
            "m" | "manager" => Some(Role::Manager),
            "a" | "agent" => Some(Role::Agent),
            _ => None,
        }
    }
}

/// Execute the install command
pub async fn install_command(
    config_path: Option<&Path>,
    role: Option<Role>,
    manager: Option<String>,
    force: bool,
    service: bool,
) -> Result<()> {
    let role = match role {
        Some(role) => role,
        None => {
            let answer = prompt("Install this machine as a manager or an agent? [manager/agent]:")?;
            Role::parse(&answer)
                .with_context(|| format!("Unknown role '{}', expected 'manager' or 'agent'", answer))?
        }
    };

    match role {
        Role::Manager => install_manager(config_path, force, service).await,
        Role::Agent => {
            if service {
                print_warning("--service only applies to the manager, ignoring");
            }
            install_agent(config_path, manager).await
        }
    }
}

async fn install_manager(config_path: Option<&Path>, force: bool, service: bool) -> Result<()> {
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path);
    // The unit runs from the config root and needs an absolute path
    let config_path = if config_path.is_relative() {
        std::env::current_dir()
            .context("Failed to read the current directory")?
            .join(config_path)
    } else {
        config_path
    };

    let setup = prepare_manager_root(&config_path)?;
    if setup.created_config {
        print_success(&format!("Created configuration at {:?}", setup.config_path));
    }

    let file: ConfigFile = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let keys = KeyAuthority::new(&file.manager.key_dir);

    let regenerate = if keys.exists() && !force {
        print_warning(&format!(
            "A keypair already exists at {:?}",
            keys.private_key_path()
        ));
        confirm("Regenerate it? Agents accepted with the current key will stop trusting this manager")?
    } else {
        true
    };

    let fingerprint = if regenerate {
        let fingerprint = keys.generate()?;
        print_success(&format!("Generated keypair at {:?}", keys.private_key_path()));
        fingerprint
    } else {
        print_info("Keeping the existing keypair");
        keys.fingerprint()?
    };
    println!("Fingerprint: {}", fingerprint);

    if service {
        SystemdService::new(&setup.config_dir)
            .with_config(&config_path)
            .install()
            .await
            .context("Failed to install the systemd service")?;
        print_success("Installed and started the sentinel service");
    } else {
        println!();
        println!("Start the registration listener with: sentinel daemon");
    }
    println!("Then run on each agent: sentinel install --role agent --manager <this-host>");
    Ok(())
}

async fn install_agent(config_path: Option<&Path>, manager: Option<String>) -> Result<()> {
    let manager = match manager {
        Some(manager) => manager,
        None => prompt("Manager address:")?,
    };
    if manager.is_empty() {
        anyhow::bail!("A manager address is required (--manager <address>)");
    }

    let (_, file) = load_config(config_path)?;
    let agent = file.agent;

    let account: Arc<dyn AccountProvisioner> = Arc::new(SystemAccount::from_config(&agent));
    print_info(&format!(
        "Registering {} with manager {}",
        agent.claimed_identity(),
        manager
    ));

    match enroll(&manager, &agent, account, shutdown_token()).await? {
        EnrollOutcome::Trusted { fingerprint } => {
            print_success(&format!("Manager key {} installed", fingerprint));
            println!("This host now accepts commands from the manager");
        }
        EnrollOutcome::AlreadyTrusted => {
            print_success("The manager already trusts this host");
        }
        EnrollOutcome::Aborted => {
            print_warning("Stopped before the manager accepted this host");
        }
    }
    Ok(())
}
