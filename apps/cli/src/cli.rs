//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Converge: dependency-gated resource provisioning.
#[derive(Debug, Parser)]
#[command(name = "converge", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Provision a simulated broker/topic/subscription and ollama/model topology.
    Demo(DemoArgs),
}

#[derive(Debug, Args)]
pub struct DemoArgs {
    /// TOML file with engine settings; `CONVERGE_*` variables override it.
    #[arg(short, long, env = "CONVERGE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Make the operation of this resource fail permanently.
    #[arg(long, value_name = "ID")]
    pub fail: Vec<String>,

    /// Pretend this resource was created by an earlier run.
    #[arg(long, value_name = "ID")]
    pub conflict: Vec<String>,
}
