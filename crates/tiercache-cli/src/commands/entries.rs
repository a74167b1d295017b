use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::Value;
use tiercache::CacheManager;

use crate::cli::{InvalidateArgs, KeyArgs, SetArgs};
use crate::output::{print_json, print_success};

pub async fn get(cache: &CacheManager, args: &KeyArgs) -> Result<()> {
    match cache.get::<Value>(&args.namespace, &args.id).await? {
        Some(value) => print_json(&value),
        None => println!("{}", "(miss)".dimmed()),
    }
    Ok(())
}

pub async fn set(cache: &CacheManager, args: &SetArgs) -> Result<()> {
    let value: Value = serde_json::from_str(&args.value)
        .with_context(|| format!("Value is not valid JSON: {}", args.value))?;

    let expiry = if args.persistent {
        cache
            .set_persistent(&args.namespace, &args.id, &value)
            .await?;
        "no expiry".to_string()
    } else {
        let ttl = args
            .ttl
            .map(Duration::from_secs)
            .unwrap_or_else(|| cache.default_ttl());
        cache
            .set_with_ttl(&args.namespace, &args.id, &value, ttl)
            .await?;
        format!("ttl {}s", ttl.as_secs())
    };

    print_success(&format!(
        "Stored {}:{} ({expiry})",
        args.namespace, args.id
    ));
    Ok(())
}

pub async fn delete(cache: &CacheManager, args: &KeyArgs) -> Result<()> {
    cache.delete(&args.namespace, &args.id).await?;
    print_success(&format!("Deleted {}:{}", args.namespace, args.id));
    Ok(())
}

pub async fn invalidate(cache: &CacheManager, args: &InvalidateArgs) -> Result<()> {
    cache.invalidate_namespace(&args.namespace).await?;
    print_success(&format!("Invalidated namespace {}", args.namespace));
    Ok(())
}
