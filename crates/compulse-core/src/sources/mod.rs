//! Datasets a company name can be resolved against.
//!
//! Every dataset implements [`Dataset`]; the aggregator treats them
//! uniformly and only looks at the id, threshold and cache policy.

mod filings;
mod identity;
mod jobs;
mod layoffs;
mod litigation;
mod tabular;
mod visa;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;

use crate::config::Config;
use crate::network::{FetchResult, HttpClient, ResilientFetcher};
use crate::resolve::{Candidate, NormalizedName};
use crate::{Error, Result};

pub use filings::{
    clean_section_text, parse_filing_urls, FilingArchive, FilingExtract, FilingSection,
    FilingsConfig,
};
pub use identity::{parse_registry, IdentityRegistry, IdentityRegistryConfig, TickerRecord};
pub use jobs::{
    group_by_employer, EmployerPostings, HttpJobSearch, JobPosting, JobPostings, JobSearch,
    JobSearchConfig,
};
pub use layoffs::{parse_layoff_table, LayoffConfig, LayoffNotice, LayoffNotices, LayoffSummary};
pub use litigation::{
    analyze_party, default_categories, split_parties, CaseCategory, CaseQuery, CaseRecord,
    CaseSearch, CategorySummary, CourtListenerSearch, Litigation, LitigationConfig,
    LitigationProfile, PartyCase, RiskAssessment, RiskFactor, RiskLevel,
};
pub use visa::{parse_visa_table, VisaConfig, VisaSponsorship, VisaSummary};

/// How long a dataset's loaded candidates may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Persist the candidate list on disk and reuse it until it is older
    /// than `ttl`.
    Persisted { ttl: Duration },
    /// Load once and keep the candidates for the life of the process.
    ProcessLifetime,
    /// Candidates depend on the query itself and are never reused.
    PerQuery,
}

#[async_trait]
pub trait Dataset: Send + Sync {
    /// Stable identifier, used as the report key and the cache key.
    fn id(&self) -> &str;

    /// Human-readable name for reports.
    fn title(&self) -> &str;

    /// Minimum fuzzy score for a candidate to be accepted.
    fn threshold(&self) -> u8;

    /// Which field of the native record the candidate names come from.
    fn match_field(&self) -> &str;

    fn cache_policy(&self) -> CachePolicy;

    /// Load the candidates to score `name` against.
    ///
    /// Every external call made here must go through `fetcher`. Indexed
    /// datasets ignore `name`; live searches use it to build their query.
    async fn load_candidates(
        &self,
        name: &NormalizedName,
        fetcher: &ResilientFetcher,
    ) -> FetchResult<Vec<Candidate>>;
}

pub type DatasetRef = Arc<dyn Dataset>;

/// Build every dataset from configuration, in report order.
pub fn build_datasets(config: &Config, client: &HttpClient) -> Vec<DatasetRef> {
    let thresholds = &config.resolution.thresholds;
    let sources = &config.sources;

    vec![
        Arc::new(IdentityRegistry::new(
            client.clone(),
            sources.identity.clone(),
            config.cache.identity_ttl(),
            thresholds.identity_registry,
        )),
        Arc::new(VisaSponsorship::new(sources.visa.clone(), thresholds.visa_sponsorship)),
        Arc::new(LayoffNotices::new(sources.layoffs.clone(), thresholds.layoff_notices)),
        Arc::new(JobPostings::new(
            Arc::new(HttpJobSearch::new(client.clone(), sources.jobs.clone())),
            sources.jobs.role.clone(),
            thresholds.job_postings,
        )),
        Arc::new(Litigation::new(
            Arc::new(CourtListenerSearch::new(client.clone(), sources.litigation.clone())),
            default_categories(),
            sources.litigation.lookback_years,
            thresholds.litigation,
        )),
    ]
}

/// Keep only the datasets named in `only`, in their original order.
///
/// An empty filter keeps everything.
pub fn select_datasets(datasets: Vec<DatasetRef>, only: &[String]) -> Result<Vec<DatasetRef>> {
    if only.is_empty() {
        return Ok(datasets);
    }

    if let Some(unknown) = only
        .iter()
        .find(|wanted| !datasets.iter().any(|d| d.id() == wanted.as_str()))
    {
        return Err(Error::UnknownDataset(unknown.clone()));
    }

    Ok(datasets
        .into_iter()
        .filter(|d| only.iter().any(|wanted| wanted == d.id()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkConfig;

    fn datasets() -> Vec<DatasetRef> {
        let client = HttpClient::new(NetworkConfig::default()).unwrap();
        build_datasets(&Config::default(), &client)
    }

    #[test]
    fn test_build_datasets_ids_are_unique() {
        let all = datasets();
        let ids: Vec<&str> = all.iter().map(|d| d.id()).collect();
        assert_eq!(
            ids,
            vec![
                "identity_registry",
                "visa_sponsorship",
                "layoff_notices",
                "job_postings",
                "litigation"
            ]
        );
    }

    #[test]
    fn test_thresholds_come_from_config() {
        let all = datasets();
        let thresholds = Config::default().resolution.thresholds;
        assert_eq!(all[0].threshold(), thresholds.identity_registry);
        assert_eq!(all[1].threshold(), thresholds.visa_sponsorship);
        assert_eq!(all[4].threshold(), thresholds.litigation);
    }

    #[test]
    fn test_identity_registry_is_persisted_weekly() {
        let all = datasets();
        assert_eq!(
            all[0].cache_policy(),
            CachePolicy::Persisted {
                ttl: Duration::days(7)
            }
        );
        assert_eq!(all[1].cache_policy(), CachePolicy::ProcessLifetime);
        assert_eq!(all[3].cache_policy(), CachePolicy::PerQuery);
    }

    #[test]
    fn test_select_datasets() {
        let picked = select_datasets(datasets(), &["litigation".into(), "visa_sponsorship".into()]).unwrap();
        let ids: Vec<&str> = picked.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["visa_sponsorship", "litigation"]);

        assert_eq!(select_datasets(datasets(), &[]).unwrap().len(), 5);
        assert!(matches!(
            select_datasets(datasets(), &["stocks".into()]),
            Err(Error::UnknownDataset(name)) if name == "stocks"
        ));
    }
}
