use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tiercache")]
#[command(about = "Inspect and operate a two-tier (local + Redis) cache")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file (defaults to ./tiercache.toml when present)
    #[arg(short, long, global = true, env = "TIERCACHE_CONFIG")]
    pub config: Option<String>,

    /// Log level or filter directive (overrides the config file)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Print Prometheus metrics recorded during the command
    #[arg(long, global = true)]
    pub print_metrics: bool,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe the network tier and show breaker state
    Ping,
    /// Read a value
    Get(KeyArgs),
    /// Store a JSON value
    Set(SetArgs),
    /// Delete a value from both tiers
    Delete(KeyArgs),
    /// Drop every entry of a namespace
    Invalidate(InvalidateArgs),
    /// Show tier statistics
    Stats,
    /// Show the effective configuration
    Config,
}

#[derive(clap::Args)]
pub struct KeyArgs {
    /// Namespace (e.g. menu-analysis)
    pub namespace: String,
    /// Entry id within the namespace
    pub id: String,
}

#[derive(clap::Args)]
pub struct SetArgs {
    /// Namespace (e.g. menu-analysis)
    pub namespace: String,
    /// Entry id within the namespace
    pub id: String,
    /// JSON value to store
    pub value: String,
    /// Time-to-live in seconds (defaults to the configured TTL)
    #[arg(long)]
    pub ttl: Option<u64>,
    /// Store without expiration
    #[arg(long, conflicts_with = "ttl")]
    pub persistent: bool,
}

#[derive(clap::Args)]
pub struct InvalidateArgs {
    /// Namespace to drop
    pub namespace: String,
}
