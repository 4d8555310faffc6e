use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "hearth",
    about = "Hearth: a JSON-lines record server for small devices",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the record server
    Serve(ServeArgs),
    /// Remove leftover temp files from the data directory
    Sweep,
    /// Show record counts per collection
    Stats,
    /// Print one page of a collection, newest first
    Dump(DumpArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Override the configured listen address
    #[arg(long)]
    pub bind: Option<String>,
    #[arg(long, default_value = "5")]
    pub bind_attempts: u32,
}

#[derive(Args)]
pub struct DumpArgs {
    pub collection: String,
    #[arg(long, default_value = "1")]
    pub page: usize,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(short, long)]
    pub search: Option<String>,
    /// Oldest first
    #[arg(long)]
    pub forward: bool,
}
