use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::tabular::{cell, coerce_count, Table};
use super::{CachePolicy, Dataset};
use crate::network::{FetchError, FetchResult, ResilientFetcher};
use crate::resolve::{Candidate, NormalizedName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoffConfig {
    pub path: PathBuf,
    pub company_column: String,
    pub workers_column: String,
    pub date_column: Option<String>,
    pub city_column: Option<String>,
}

impl Default for LayoffConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/warn.csv"),
            company_column: "Company".to_string(),
            workers_column: "Number of Workers".to_string(),
            date_column: Some("Received Date".to_string()),
            city_column: Some("City".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoffNotice {
    pub workers: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoffSummary {
    pub company: String,
    pub total_workers: u64,
    pub notices: Vec<LayoffNotice>,
}

/// Group layoff notices by company, in first-seen order.
///
/// Worker counts that are missing or not numeric count as zero.
pub fn parse_layoff_table(bytes: &[u8], config: &LayoffConfig) -> FetchResult<Vec<LayoffSummary>> {
    let table = Table::parse(bytes)?;
    let company = table.require(&config.company_column)?;
    let workers = table.column(&config.workers_column);
    let date = config.date_column.as_deref().and_then(|c| table.column(c));
    let city = config.city_column.as_deref().and_then(|c| table.column(c));

    let mut summaries: Vec<LayoffSummary> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in table.rows() {
        let Some(name) = cell(row, Some(company)) else {
            continue;
        };

        let index = *positions.entry(name.to_string()).or_insert_with(|| {
            summaries.push(LayoffSummary {
                company: name.to_string(),
                total_workers: 0,
                notices: Vec::new(),
            });
            summaries.len() - 1
        });

        let notice = LayoffNotice {
            workers: coerce_count(cell(row, workers)),
            received: cell(row, date).map(str::to_string),
            city: cell(row, city).map(str::to_string),
        };
        let summary = &mut summaries[index];
        summary.total_workers = summary.total_workers.saturating_add(notice.workers);
        summary.notices.push(notice);
    }

    Ok(summaries)
}

/// State layoff notices (WARN filings) from a local export.
pub struct LayoffNotices {
    config: LayoffConfig,
    threshold: u8,
}

impl LayoffNotices {
    pub const ID: &'static str = "layoff_notices";

    pub const fn new(config: LayoffConfig, threshold: u8) -> Self {
        Self { config, threshold }
    }
}

#[async_trait]
impl Dataset for LayoffNotices {
    fn id(&self) -> &str {
        Self::ID
    }

    fn title(&self) -> &str {
        "Layoff notices"
    }

    fn threshold(&self) -> u8 {
        self.threshold
    }

    fn match_field(&self) -> &str {
        &self.config.company_column
    }

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::ProcessLifetime
    }

    async fn load_candidates(
        &self,
        _name: &NormalizedName,
        fetcher: &ResilientFetcher,
    ) -> FetchResult<Vec<Candidate>> {
        let path = &self.config.path;
        let bytes = fetcher
            .execute("layoff notices", || async {
                tokio::fs::read(path).await.map_err(FetchError::from)
            })
            .await?;

        let summaries = parse_layoff_table(&bytes, &self.config)?;
        tracing::info!("Loaded {} companies with layoff notices", summaries.len());

        summaries
            .into_iter()
            .map(|summary| {
                let detail =
                    serde_json::to_value(&summary).map_err(|e| FetchError::Parse(e.to_string()))?;
                Ok(Candidate::new(summary.company.clone(), summary.company).with_detail(detail))
            })
            .collect()
    }
}
