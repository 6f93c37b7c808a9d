use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::network::{NetworkConfig, RetryPolicy};
use crate::sources::{
    FilingsConfig, IdentityRegistryConfig, JobSearchConfig, LayoffConfig, LitigationConfig,
    VisaConfig,
};
use crate::summarize::SummarizerConfig;
use crate::{Error, Result};

/// Acceptance threshold per dataset, 0-100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub identity_registry: u8,
    pub visa_sponsorship: u8,
    pub layoff_notices: u8,
    pub job_postings: u8,
    pub litigation: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            identity_registry: 70,
            visa_sponsorship: 50,
            layoff_notices: 80,
            job_postings: 80,
            litigation: 75,
        }
    }
}

impl Thresholds {
    fn all(&self) -> [(&'static str, u8); 5] {
        [
            ("identity_registry", self.identity_registry),
            ("visa_sponsorship", self.visa_sponsorship),
            ("layoff_notices", self.layoff_notices),
            ("job_postings", self.job_postings),
            ("litigation", self.litigation),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    pub thresholds: Thresholds,
    /// A runner-up within this many points of the best match makes it ambiguous
    pub margin: u8,
    /// Most candidates listed for an ambiguous outcome
    pub max_ambiguous: usize,
    /// Wall-clock budget for one dataset, including retries
    pub source_timeout_seconds: u64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            margin: 10,
            max_ambiguous: 5,
            source_timeout_seconds: 60,
        }
    }
}

impl ResolutionConfig {
    pub const fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Defaults to the platform cache directory
    pub dir: Option<PathBuf>,
    pub identity_ttl_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            identity_ttl_hours: 24 * 7,
        }
    }
}

impl CacheConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("compulse")
        })
    }

    pub fn identity_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.identity_ttl_hours)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub identity: IdentityRegistryConfig,
    pub visa: VisaConfig,
    pub layoffs: LayoffConfig,
    pub jobs: JobSearchConfig,
    pub litigation: LitigationConfig,
    pub filings: FilingsConfig,
}

/// Complete runtime configuration.
///
/// Layered as defaults, then an optional JSON file, then environment
/// variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resolution: ResolutionConfig,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub network: NetworkConfig,
    pub sources: SourcesConfig,
    pub summarizer: SummarizerConfig,
}

impl Config {
    /// Load from an optional JSON file, apply the process environment and
    /// validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))
    }

    /// Override settings from environment-style variables. Empty values are
    /// ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = var("COMPULSE_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = var("COMPULSE_VISA_DATA") {
            self.sources.visa.path = PathBuf::from(path);
        }
        if let Some(path) = var("COMPULSE_LAYOFF_DATA") {
            self.sources.layoffs.path = PathBuf::from(path);
        }
        if let Some(role) = var("COMPULSE_JOB_ROLE") {
            self.sources.jobs.role = role;
        }
        if let Some(proxy) = var("COMPULSE_PROXY") {
            self.network.proxy_url = Some(proxy);
        }
        if let Some(seconds) = var("COMPULSE_SOURCE_TIMEOUT") {
            self.resolution.source_timeout_seconds = seconds.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("COMPULSE_SOURCE_TIMEOUT is not a number: {seconds}"))
            })?;
        }

        if let Some(agent) = var("SEC_USER_AGENT") {
            self.sources.identity.user_agent.clone_from(&agent);
            self.sources.filings.user_agent = agent;
        }
        if let Some(key) = var("SEC_API_KEY") {
            self.sources.filings.api_key = Some(key);
        }
        if let Some(url) = var("SEC_EXTRACT_API_URL") {
            self.sources.filings.extract_api_url = url;
        }
        if let Some(url) = var("JOBS_API_URL") {
            self.sources.jobs.api_url = Some(url);
        }
        if let Some(key) = var("JOBS_API_KEY") {
            self.sources.jobs.api_key = Some(key);
        }
        if let Some(key) = var("COURT_LISTENER_API_KEY") {
            self.sources.litigation.api_key = Some(key);
        }
        if let Some(url) = var("OLLAMA_SERVER_URL") {
            self.summarizer.server_url = url;
        }
        if let Some(model) = var("OLLAMA_MODEL") {
            self.summarizer.model = model;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (dataset, threshold) in self.resolution.thresholds.all() {
            if threshold > 100 {
                return Err(Error::InvalidConfig(format!(
                    "threshold for {dataset} must be 0-100, got {threshold}"
                )));
            }
        }
        if self.resolution.margin > 100 {
            return Err(Error::InvalidConfig("margin must be 0-100".to_string()));
        }
        if self.resolution.max_ambiguous == 0 {
            return Err(Error::InvalidConfig("max_ambiguous must be at least 1".to_string()));
        }
        if self.resolution.source_timeout_seconds == 0 {
            return Err(Error::InvalidConfig(
                "source_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.cache.identity_ttl_hours <= 0 {
            return Err(Error::InvalidConfig(
                "identity_ttl_hours must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig("retry.max_attempts must be at least 1".to_string()));
        }
        self.network
            .validate()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}
