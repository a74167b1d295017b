mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tiercache::{CacheConfig, CacheManager};
use tiercache::config::loader::load_config;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    tiercache::init_tracing();

    let config = load_config(cli.config.as_deref())?;
    if let Some(level) = log_level_override(cli.log_level.as_deref(), &config) {
        tiercache::apply_logging_level(level);
    }

    if cli.print_metrics {
        tiercache::metrics::init_metrics();
    }

    if let Commands::Config = &cli.command {
        return commands::status::config(&config, format);
    }

    let cache = CacheManager::from_config(&config).await?;

    match &cli.command {
        Commands::Ping => commands::status::ping(&cache, &config).await?,
        Commands::Get(args) => commands::entries::get(&cache, args).await?,
        Commands::Set(args) => commands::entries::set(&cache, args).await?,
        Commands::Delete(args) => commands::entries::delete(&cache, args).await?,
        Commands::Invalidate(args) => commands::entries::invalidate(&cache, args).await?,
        Commands::Stats => commands::status::stats(&cache, format)?,
        Commands::Config => {}
    }

    cache.shutdown();

    if cli.print_metrics {
        if let Some(rendered) = tiercache::metrics::render_metrics() {
            println!("{rendered}");
        }
    }

    Ok(())
}

/// Level to switch to once the config is loaded. `--log-level` wins, then
/// `RUST_LOG` (already applied at init), then the config file.
fn log_level_override<'a>(flag: Option<&'a str>, config: &'a CacheConfig) -> Option<&'a str> {
    match flag {
        Some(level) => Some(level),
        None if std::env::var_os("RUST_LOG").is_some() => None,
        None => Some(&config.logging.level),
    }
}
