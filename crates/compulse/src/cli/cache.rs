use anyhow::Result;
use console::style;

use compulse_core::{Config, SourceCache};

pub async fn run_status(config: &Config) -> Result<()> {
    let cache = SourceCache::open(config.cache.resolved_dir()).await?;
    let entries = cache.status().await?;

    eprintln!("{} Cache: {}", style("●").blue(), cache.dir().display());
    if entries.is_empty() {
        println!("Cache is empty");
        return Ok(());
    }

    for entry in entries {
        let fetched = entry.fetched_at.map_or_else(
            || "unreadable".to_string(),
            |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );
        println!("{}\t{}\t{} bytes", entry.key, fetched, entry.size_bytes);
    }
    Ok(())
}

pub async fn run_clear(config: &Config, key: Option<&str>) -> Result<()> {
    let cache = SourceCache::open(config.cache.resolved_dir()).await?;

    match key {
        Some(key) => {
            if cache.invalidate(key).await? {
                println!("Removed {key}");
            } else {
                println!("No cached entry for {key}");
            }
        }
        None => {
            let removed = cache.clear().await?;
            println!("Removed {removed} cached entries");
        }
    }
    Ok(())
}
