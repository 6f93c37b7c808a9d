use anyhow::Result;
use console::style;

use compulse_core::sources::{build_datasets, CachePolicy};
use compulse_core::{Config, HttpClient};

fn describe(policy: CachePolicy) -> String {
    match policy {
        CachePolicy::Persisted { ttl } => format!("cached on disk for {}h", ttl.num_hours()),
        CachePolicy::ProcessLifetime => "loaded once per run".to_string(),
        CachePolicy::PerQuery => "queried per lookup".to_string(),
    }
}

pub fn run(config: &Config) -> Result<()> {
    let client = HttpClient::new(config.network.clone())?;

    for dataset in build_datasets(config, &client) {
        println!(
            "{}\t{}\tthreshold {}\tmatches {}\t{}",
            style(dataset.id()).bold(),
            dataset.title(),
            dataset.threshold(),
            dataset.match_field(),
            describe(dataset.cache_policy())
        );
    }
    Ok(())
}
