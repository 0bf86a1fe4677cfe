//! CLI argument parsing for clusterstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cs")]
#[command(author, version = env!("GIT_DESCRIBE"), about = "Inspect and edit a cluster coordination store", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Store directory (overrides config)
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Cluster scope (overrides config)
    #[arg(short, long)]
    pub scope: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the cluster config and leader
    Show,

    /// Set config values (dotted keys, JSON values)
    Set {
        /// Assignments like loop_wait=5 or postgresql.parameters.work_mem=4MB
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Suspend automatic failover on every node
    Pause,

    /// Resume automatic failover
    Resume,

    /// Drop the current leader lease
    RemoveLeader,
}
