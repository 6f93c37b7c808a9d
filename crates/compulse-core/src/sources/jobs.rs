use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use super::{CachePolicy, Dataset};
use crate::network::{FetchError, FetchResult, HttpClient, ResilientFetcher};
use crate::resolve::{canonical_key, Candidate, NormalizedName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSearchConfig {
    /// Search endpoint; the dataset reports itself unavailable when unset
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub role: String,
    pub results_wanted: u32,
    pub hours_old: u32,
}

impl Default for JobSearchConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            role: "Engineer".to_string(),
            results_wanted: 20,
            hours_old: 72,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    #[serde(default)]
    pub company: Option<String>,
    pub title: String,
    #[serde(default)]
    pub location: Option<String>,
    pub job_url: String,
}

/// Postings grouped under one employer spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployerPostings {
    pub company: String,
    pub role: String,
    pub postings: Vec<JobPosting>,
}

#[async_trait]
pub trait JobSearch: Send + Sync {
    /// Search recent postings for `role` at `company`.
    async fn search(&self, company: &str, role: &str) -> FetchResult<Vec<JobPosting>>;
}

/// Job-board aggregator reached over HTTP.
pub struct HttpJobSearch {
    client: HttpClient,
    config: JobSearchConfig,
}

impl HttpJobSearch {
    pub const fn new(client: HttpClient, config: JobSearchConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl JobSearch for HttpJobSearch {
    async fn search(&self, company: &str, role: &str) -> FetchResult<Vec<JobPosting>> {
        let url = self
            .config
            .api_url
            .as_deref()
            .ok_or_else(|| FetchError::NotConfigured("JOBS_API_URL is not set".to_string()))?;

        let search_term = format!("\"{role} at {company}\"");
        let mut request = self.client.get(url)?.query(&[
            ("search_term", search_term),
            ("results_wanted", self.config.results_wanted.to_string()),
            ("hours_old", self.config.hours_old.to_string()),
        ]);
        if let Some(ref key) = self.config.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {key}"));
        }

        self.client.send_json(request).await
    }
}

/// Group postings by employer, merging spellings with the same canonical key.
///
/// The first spelling seen names the group. Postings without a company are
/// dropped.
pub fn group_by_employer(postings: Vec<JobPosting>, role: &str) -> Vec<EmployerPostings> {
    let mut groups: Vec<EmployerPostings> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for posting in postings {
        let Some(company) = posting
            .company
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
        else {
            continue;
        };

        let key = canonical_key(&company);
        let index = *positions.entry(key).or_insert_with(|| {
            groups.push(EmployerPostings {
                company,
                role: role.to_string(),
                postings: Vec::new(),
            });
            groups.len() - 1
        });
        groups[index].postings.push(posting);
    }

    groups
}

/// Live job postings, searched per query.
pub struct JobPostings {
    search: Arc<dyn JobSearch>,
    role: String,
    threshold: u8,
}

impl JobPostings {
    pub const ID: &'static str = "job_postings";

    pub fn new(search: Arc<dyn JobSearch>, role: impl Into<String>, threshold: u8) -> Self {
        Self {
            search,
            role: role.into(),
            threshold,
        }
    }

    /// Same search backend, different role.
    pub fn with_role(&self, role: impl Into<String>) -> Self {
        Self::new(Arc::clone(&self.search), role, self.threshold)
    }
}

#[async_trait]
impl Dataset for JobPostings {
    fn id(&self) -> &str {
        Self::ID
    }

    fn title(&self) -> &str {
        "Job postings"
    }

    fn threshold(&self) -> u8 {
        self.threshold
    }

    fn match_field(&self) -> &str {
        "company"
    }

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::PerQuery
    }

    async fn load_candidates(
        &self,
        name: &NormalizedName,
        fetcher: &ResilientFetcher,
    ) -> FetchResult<Vec<Candidate>> {
        let company = name.original.trim();
        let postings = fetcher
            .execute("job search", || self.search.search(company, &self.role))
            .await?;
        tracing::debug!("Job search for {} returned {} postings", company, postings.len());

        group_by_employer(postings, &self.role)
            .into_iter()
            .map(|group| {
                let key = canonical_key(&group.company);
                let detail =
                    serde_json::to_value(&group).map_err(|e| FetchError::Parse(e.to_string()))?;
                Ok(Candidate::new(group.company, key).with_detail(detail))
            })
            .collect()
    }
}
