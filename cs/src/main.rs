use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use serde_json::{Value, json};
use tracing::info;

use clusterstore::cli::{Cli, Command};
use clusterstore::config::Config;
use clusterstore::edit::{parse_assignment, set_path};
use clusterstore::{ClusterStore, now_ms};

fn setup_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .init();
    Ok(())
}

/// Read-modify-write the cluster config, guarded by its config version
fn edit_config(store: &ClusterStore, edit: impl FnOnce(&mut Value) -> Result<()>) -> Result<bool> {
    let state = store.load().context("Failed to read cluster state")?;
    let mut config = state.config.unwrap_or_else(|| json!({}));
    edit(&mut config)?;
    let update = store
        .set_config(config, Some(state.config_version))
        .context("Failed to write cluster config")?;
    Ok(update.applied)
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(path) = cli.path {
        config.store_path = path;
    }
    if let Some(scope) = cli.scope {
        config.scope = scope;
    }

    info!(path = ?config.store_path, scope = %config.scope, "clusterstore starting");
    let store = ClusterStore::open(&config.store_path, &config.scope)?;

    match cli.command {
        Command::Show => {
            let state = store.load()?;
            println!("Scope: {}", store.scope().cyan());
            println!("Version: {}", state.version);
            match &state.leader {
                Some(leader) if leader.is_expired_at(now_ms()) => {
                    println!("Leader: {} {}", leader.name, "(expired)".dimmed());
                }
                Some(leader) => {
                    let remaining = (leader.expires_at - now_ms()) / 1000;
                    println!("Leader: {} (lease {}s)", leader.name.green(), remaining);
                }
                None => println!("Leader: {}", "none".yellow()),
            }
            match &state.config {
                Some(cfg) => {
                    println!("Config (v{}):", state.config_version);
                    println!("{}", serde_json::to_string_pretty(cfg)?);
                }
                None => println!("Config: {}", "not initialized".yellow()),
            }
        }
        Command::Set { assignments } => {
            let parsed = assignments
                .iter()
                .map(|a| parse_assignment(a))
                .collect::<Result<Vec<_>>>()?;
            let applied = edit_config(&store, |cfg| {
                for (key, value) in parsed {
                    set_path(cfg, &key, value);
                }
                Ok(())
            })?;
            if applied {
                println!("{} Config updated", "✓".green());
            } else {
                println!("Config unchanged");
            }
        }
        Command::Pause | Command::Resume => {
            let pause = matches!(cli.command, Command::Pause);
            let applied = edit_config(&store, |cfg| {
                set_path(cfg, "pause", Value::Bool(pause));
                Ok(())
            })?;
            let verb = if pause { "paused" } else { "resumed" };
            if applied {
                println!("{} Cluster {}", "✓".green(), verb);
            } else {
                println!("Cluster already {}", verb);
            }
        }
        Command::RemoveLeader => {
            if store.remove_leader()?.applied {
                println!("{} Leader lease removed", "✓".green());
            } else {
                println!("No leader lease to remove");
            }
        }
    }

    Ok(())
}
