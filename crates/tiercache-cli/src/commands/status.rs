use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use tiercache::{BreakerState, CacheConfig, CacheManager, CacheStats};

use crate::cli::OutputFormat;
use crate::output::{print_json, print_table, print_warning};

pub async fn ping(cache: &CacheManager, config: &CacheConfig) -> Result<()> {
    if !config.redis.enabled {
        print_warning("Redis is disabled; running with the local tier only");
        return Ok(());
    }

    let url = config.redacted().redis.url;
    let health = cache.health().await;
    if health.network == Some(true) {
        println!("{} {} is {}", "✓".green(), url.cyan(), "reachable".green());
    } else {
        println!("{} {} is {}", "✗".red(), url.cyan(), "unreachable".red());
    }
    println!("  breaker: {}", describe_breaker(&health.breaker));
    Ok(())
}

pub fn stats(cache: &CacheManager, format: OutputFormat) -> Result<()> {
    let stats = cache.stats();

    if matches!(format, OutputFormat::Json) {
        let local = stats.local.as_ref().map(|local| {
            json!({
                "entries": local.entries,
                "bytes": local.bytes,
                "max_entries": local.max_entries,
                "max_bytes": local.max_bytes,
                "hits": local.hits,
                "misses": local.misses,
                "hit_rate": local.hit_rate(),
                "evictions": local.evictions,
                "expirations": local.expirations,
            })
        });
        print_json(&json!({
            "mode": stats.mode(),
            "codec": stats.codec.name(),
            "default_ttl_secs": stats.default_ttl.as_secs(),
            "network_enabled": stats.network_enabled,
            "breaker": stats.breaker,
            "local": local,
        }));
        return Ok(());
    }

    print_table(stats_rows(&stats));
    Ok(())
}

pub fn config(config: &CacheConfig, format: OutputFormat) -> Result<()> {
    let shown = config.redacted();
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&shown)?),
        OutputFormat::Table => println!("{}", toml::to_string_pretty(&shown)?),
    }
    Ok(())
}

fn stats_rows(stats: &CacheStats) -> Vec<(String, String)> {
    let mut rows = vec![
        ("Mode".to_string(), stats.mode().to_string()),
        ("Codec".to_string(), stats.codec.name().to_string()),
        (
            "Default TTL".to_string(),
            format!("{}s", stats.default_ttl.as_secs()),
        ),
        ("Breaker".to_string(), describe_breaker(&stats.breaker)),
    ];
    if let Some(local) = &stats.local {
        rows.extend([
            (
                "Local entries".to_string(),
                format!("{} / {}", local.entries, local.max_entries),
            ),
            (
                "Local bytes".to_string(),
                format!("{} / {}", local.bytes, local.max_bytes),
            ),
            (
                "Local hit rate".to_string(),
                format!("{:.1}%", local.hit_rate()),
            ),
            ("Evictions".to_string(), local.evictions.to_string()),
            ("Expirations".to_string(), local.expirations.to_string()),
        ]);
    }
    rows
}

fn describe_breaker(state: &BreakerState) -> String {
    match state {
        BreakerState::Healthy => "healthy".green().to_string(),
        BreakerState::Probing => "probing".yellow().to_string(),
        BreakerState::CoolingDown {
            remaining_ms,
            interval_ms,
        } => format!(
            "{} ({remaining_ms}ms left of {interval_ms}ms)",
            "cooling down".red()
        ),
    }
}
