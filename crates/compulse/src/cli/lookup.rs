use std::sync::Arc;

use anyhow::Result;
use console::style;
use serde::Serialize;

use compulse_core::pipeline::{cancel_pair, AggregateReport, Aggregator, Enricher, Enrichment};
use compulse_core::sources::{build_datasets, select_datasets, FilingArchive};
use compulse_core::summarize::OllamaSummarizer;
use compulse_core::{Config, HttpClient, SourceCache};

use super::LookupArgs;

#[derive(Serialize)]
struct LookupOutput<'a> {
    #[serde(flatten)]
    report: &'a AggregateReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    enrichment: Option<&'a Enrichment>,
}

pub async fn run(mut config: Config, args: LookupArgs) -> Result<()> {
    if let Some(role) = args.role.filter(|r| !r.trim().is_empty()) {
        config.sources.jobs.role = role;
    }

    let client = HttpClient::new(config.network.clone())?;
    let datasets = select_datasets(build_datasets(&config, &client), &args.only)?;
    let cache = SourceCache::open(config.cache.resolved_dir()).await?;
    let aggregator = Aggregator::from_config(cache, &config);

    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Interrupted, finishing report", style("!").yellow());
            handle.cancel();
        }
    });

    let report = aggregator
        .resolve_all_until(&args.name, &datasets, token)
        .await?;

    let enrichment = if args.filings || args.summarize {
        let fetcher = aggregator.fetcher();
        let mut enricher = Enricher::new(config.sources.litigation.lookback_years);
        if args.filings {
            enricher = enricher.with_archive(FilingArchive::new(
                client.clone(),
                fetcher,
                config.sources.filings.clone(),
            ));
        }
        if args.summarize {
            enricher = enricher.with_summarizer(Arc::new(OllamaSummarizer::new(
                client.clone(),
                fetcher,
                config.summarizer.clone(),
            )));
        }
        Some(enricher.enrich(&report).await)
    } else {
        None
    };

    if args.json {
        let output = LookupOutput {
            report: &report,
            enrichment: enrichment.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", report.render_text());
        if let Some(enrichment) = enrichment {
            let extra = enrichment.render_text();
            if !extra.is_empty() {
                println!();
                print!("{extra}");
            }
        }
    }

    Ok(())
}
