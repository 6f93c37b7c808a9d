use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::tabular::{cell, coerce_count, Table};
use super::{CachePolicy, Dataset};
use crate::network::{FetchError, FetchResult, ResilientFetcher};
use crate::resolve::{Candidate, NormalizedName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisaConfig {
    pub path: PathBuf,
    pub employer_column: String,
}

impl Default for VisaConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/h1b.csv"),
            employer_column: "Employer (Petitioner) Name".to_string(),
        }
    }
}

const FISCAL_YEAR: &str = "Fiscal Year";
const INITIAL_APPROVAL: &str = "Initial Approval";
const INITIAL_DENIAL: &str = "Initial Denial";
const CONTINUING_APPROVAL: &str = "Continuing Approval";
const CONTINUING_DENIAL: &str = "Continuing Denial";

/// Petition totals for one employer across every row it appears in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisaSummary {
    pub employer: String,
    pub rows: u64,
    pub fiscal_years: BTreeSet<String>,
    pub initial_approvals: u64,
    pub initial_denials: u64,
    pub continuing_approvals: u64,
    pub continuing_denials: u64,
}

impl VisaSummary {
    pub const fn total_approvals(&self) -> u64 {
        self.initial_approvals.saturating_add(self.continuing_approvals)
    }

    pub const fn total_denials(&self) -> u64 {
        self.initial_denials.saturating_add(self.continuing_denials)
    }
}

/// Group the petition table by employer, in first-seen order.
pub fn parse_visa_table(bytes: &[u8], employer_column: &str) -> FetchResult<Vec<VisaSummary>> {
    let table = Table::parse(bytes)?;
    let employer = table.require(employer_column)?;
    let year = table.column(FISCAL_YEAR);
    let initial_approval = table.column(INITIAL_APPROVAL);
    let initial_denial = table.column(INITIAL_DENIAL);
    let continuing_approval = table.column(CONTINUING_APPROVAL);
    let continuing_denial = table.column(CONTINUING_DENIAL);

    let mut summaries: Vec<VisaSummary> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in table.rows() {
        let Some(name) = cell(row, Some(employer)) else {
            continue;
        };

        let index = *positions.entry(name.to_string()).or_insert_with(|| {
            summaries.push(VisaSummary {
                employer: name.to_string(),
                ..VisaSummary::default()
            });
            summaries.len() - 1
        });
        let summary = &mut summaries[index];

        summary.rows += 1;
        if let Some(year) = cell(row, year) {
            summary.fiscal_years.insert(year.to_string());
        }
        let add = |total: &mut u64, column: Option<usize>| {
            *total = total.saturating_add(coerce_count(cell(row, column)));
        };
        add(&mut summary.initial_approvals, initial_approval);
        add(&mut summary.initial_denials, initial_denial);
        add(&mut summary.continuing_approvals, continuing_approval);
        add(&mut summary.continuing_denials, continuing_denial);
    }

    Ok(summaries)
}

/// Employer-sponsored work visa petitions from a local export.
pub struct VisaSponsorship {
    config: VisaConfig,
    threshold: u8,
}

impl VisaSponsorship {
    pub const ID: &'static str = "visa_sponsorship";

    pub const fn new(config: VisaConfig, threshold: u8) -> Self {
        Self { config, threshold }
    }
}

#[async_trait]
impl Dataset for VisaSponsorship {
    fn id(&self) -> &str {
        Self::ID
    }

    fn title(&self) -> &str {
        "Visa sponsorship"
    }

    fn threshold(&self) -> u8 {
        self.threshold
    }

    fn match_field(&self) -> &str {
        &self.config.employer_column
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
            .execute("visa petitions", || async {
                tokio::fs::read(path).await.map_err(FetchError::from)
            })
            .await?;

        let summaries = parse_visa_table(&bytes, &self.config.employer_column)?;
        tracing::info!("Loaded {} visa sponsors from {}", summaries.len(), path.display());

        summaries
            .into_iter()
            .map(|summary| {
                let detail = serde_json::to_value(&summary)
                    .map_err(|e| FetchError::Parse(e.to_string()))?;
                Ok(Candidate::new(summary.employer.clone(), summary.employer).with_detail(detail))
            })
            .collect()
    }
}
