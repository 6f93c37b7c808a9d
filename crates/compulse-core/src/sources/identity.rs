use async_trait::async_trait;
use chrono::Duration;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{CachePolicy, Dataset};
use crate::network::{FetchError, FetchResult, HttpClient, ResilientFetcher};
use crate::resolve::{Candidate, NormalizedName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityRegistryConfig {
    pub url: String,
    /// The registry rejects requests without a declared contact
    pub user_agent: String,
}

impl Default for IdentityRegistryConfig {
    fn default() -> Self {
        Self {
            url: "https://www.sec.gov/files/company_tickers.json".to_string(),
            user_agent: "compulse/0.1 (set SEC_USER_AGENT to a contact address)".to_string(),
        }
    }
}

/// One row of the ticker registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerRecord {
    #[serde(rename = "cik_str")]
    pub cik: u64,
    pub ticker: String,
    pub title: String,
}

impl TickerRecord {
    fn into_candidate(self) -> Candidate {
        let detail = serde_json::json!({
            "cik": self.cik,
            "ticker": self.ticker,
            "title": self.title,
        });
        Candidate::new(self.title, self.ticker).with_detail(detail)
    }
}

/// Parse the registry document, an object keyed by row number.
///
/// Rows come back in row-number order so that duplicate titles resolve to
/// the same record the registry lists first.
pub fn parse_registry(body: &str) -> FetchResult<Vec<TickerRecord>> {
    let rows: HashMap<String, TickerRecord> =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(format!("ticker registry: {e}")))?;

    let mut numbered: Vec<(u64, TickerRecord)> = rows
        .into_iter()
        .map(|(key, record)| (key.parse().unwrap_or(u64::MAX), record))
        .collect();
    numbered.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cik.cmp(&b.1.cik)));

    Ok(numbered.into_iter().map(|(_, record)| record).collect())
}

/// Public-company identity registry: company title to ticker and CIK.
pub struct IdentityRegistry {
    client: HttpClient,
    config: IdentityRegistryConfig,
    ttl: Duration,
    threshold: u8,
}

impl IdentityRegistry {
    pub const ID: &'static str = "identity_registry";

    pub const fn new(
        client: HttpClient,
        config: IdentityRegistryConfig,
        ttl: Duration,
        threshold: u8,
    ) -> Self {
        Self {
            client,
            config,
            ttl,
            threshold,
        }
    }

    async fn fetch(&self) -> FetchResult<String> {
        let request = self
            .client
            .get(&self.config.url)?
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, "application/json");
        self.client.send_text(request).await
    }
}

#[async_trait]
impl Dataset for IdentityRegistry {
    fn id(&self) -> &str {
        Self::ID
    }

    fn title(&self) -> &str {
        "Public company registry"
    }

    fn threshold(&self) -> u8 {
        self.threshold
    }

    fn match_field(&self) -> &str {
        "title"
    }

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::Persisted { ttl: self.ttl }
    }

    async fn load_candidates(
        &self,
        _name: &NormalizedName,
        fetcher: &ResilientFetcher,
    ) -> FetchResult<Vec<Candidate>> {
        let body = fetcher.execute("ticker registry", || self.fetch()).await?;
        let records = parse_registry(&body)?;
        tracing::info!("Loaded {} registry records", records.len());

        Ok(records.into_iter().map(TickerRecord::into_candidate).collect())
    }
}
