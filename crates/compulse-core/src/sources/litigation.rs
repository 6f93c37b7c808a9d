use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use super::{CachePolicy, Dataset};
use crate::network::{FetchError, FetchResult, HttpClient, ResilientFetcher};
use crate::resolve::{canonical_key, Candidate, NormalizedName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LitigationConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub lookback_years: u32,
    pub page_size: u32,
}

impl Default for LitigationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.courtlistener.com/api/rest/v4".to_string(),
            api_key: None,
            lookback_years: 2,
            page_size: 500,
        }
    }
}

/// A family of cases searched together, by federal nature-of-suit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseCategory {
    pub key: String,
    pub name: String,
    /// 1 is the most serious
    pub priority: u8,
    pub nature_of_suit_codes: Vec<String>,
    pub keywords: Vec<String>,
}

impl CaseCategory {
    fn new(key: &str, name: &str, priority: u8, codes: &[&str], keywords: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            priority,
            nature_of_suit_codes: codes.iter().map(|c| (*c).to_string()).collect(),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

pub fn default_categories() -> Vec<CaseCategory> {
    vec![
        CaseCategory::new(
            "employment_discrimination",
            "Employment Discrimination",
            1,
            &["442", "445"],
            &["discrimination", "hostile work environment", "retaliation"],
        ),
        CaseCategory::new(
            "wage_violations",
            "Wage Violations",
            1,
            &["710"],
            &["unpaid wages", "overtime", "FLSA"],
        ),
        CaseCategory::new(
            "workplace_safety",
            "Workplace Safety",
            2,
            &["790"],
            &["OSHA", "safety violation", "workplace injury"],
        ),
        CaseCategory::new(
            "bankruptcy",
            "Bankruptcy",
            1,
            &["422", "423"],
            &["Chapter 11", "bankruptcy", "reorganization"],
        ),
    ]
}

/// One docket search: every spelling of the name, one category, one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseQuery {
    pub terms: String,
    pub nature_of_suit: Vec<String>,
    pub filed_after: NaiveDate,
    pub filed_before: NaiveDate,
}

impl CaseQuery {
    pub fn new(
        name: &NormalizedName,
        category: &CaseCategory,
        filed_after: NaiveDate,
        filed_before: NaiveDate,
    ) -> Self {
        Self {
            terms: format!("({})", name.search_forms().join(" OR ")),
            nature_of_suit: category.nature_of_suit_codes.clone(),
            filed_after,
            filed_before,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    #[serde(default, alias = "caseName")]
    pub case_name: String,
    #[serde(default, alias = "dateFiled")]
    pub date_filed: Option<String>,
    #[serde(default, alias = "docketNumber")]
    pub docket_number: Option<String>,
    #[serde(default)]
    pub court: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CaseRecord {
    fn filed_on(&self) -> Option<NaiveDate> {
        let raw = self.date_filed.as_deref()?;
        let day = raw.get(..10).unwrap_or(raw);
        match NaiveDate::parse_from_str(day, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(e) => {
                tracing::debug!("Unparseable filing date {:?}: {}", raw, e);
                None
            }
        }
    }

    fn mentions(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        self.case_name.to_lowercase().contains(&keyword)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&keyword))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<CaseRecord>,
}

#[async_trait]
pub trait CaseSearch: Send + Sync {
    async fn search(&self, query: &CaseQuery) -> FetchResult<Vec<CaseRecord>>;
}

/// Federal docket search over the CourtListener REST API.
pub struct CourtListenerSearch {
    client: HttpClient,
    config: LitigationConfig,
}

impl CourtListenerSearch {
    pub const fn new(client: HttpClient, config: LitigationConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl CaseSearch for CourtListenerSearch {
    async fn search(&self, query: &CaseQuery) -> FetchResult<Vec<CaseRecord>> {
        let key = self.config.api_key.as_deref().ok_or_else(|| {
            FetchError::NotConfigured("COURT_LISTENER_API_KEY is not set".to_string())
        })?;

        let url = format!("{}/search/", self.config.base_url.trim_end_matches('/'));
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.terms.clone()),
            ("type", "r".to_string()),
            ("order_by", "dateFiled desc".to_string()),
            ("page_size", self.config.page_size.to_string()),
            ("filed_after", query.filed_after.format("%Y-%m-%d").to_string()),
            ("filed_before", query.filed_before.format("%Y-%m-%d").to_string()),
        ];
        params.extend(
            query
                .nature_of_suit
                .iter()
                .map(|code| ("nature_of_suit", code.clone())),
        );

        let request = self
            .client
            .get(&url)?
            .query(&params)
            .header(AUTHORIZATION, format!("Token {key}"));
        let response: SearchResponse = self.client.send_json(request).await?;

        Ok(response.results)
    }
}

/// Split a case caption into its party names.
///
/// "Doe v. Acme Corp., et al." yields both sides; "In re Acme Corp" yields
/// the debtor alone.
pub fn split_parties(case_name: &str) -> Vec<String> {
    let caption = case_name.trim();
    let lower = caption.to_ascii_lowercase();

    for prefix in ["in re ", "in the matter of "] {
        if lower.starts_with(prefix) {
            return clean_party(&caption[prefix.len()..]).into_iter().collect();
        }
    }

    let split = [" v. ", " vs. ", " v ", " vs "]
        .iter()
        .filter_map(|sep| lower.find(sep).map(|at| (at, sep.len())))
        .min_by_key(|(at, _)| *at);

    match split {
        Some((at, len)) => [&caption[..at], &caption[at + len..]]
            .into_iter()
            .filter_map(clean_party)
            .collect(),
        None => clean_party(caption).into_iter().collect(),
    }
}

fn clean_party(raw: &str) -> Option<String> {
    let mut party = raw.trim().trim_end_matches(',').trim();
    let lower = party.to_ascii_lowercase();
    for tail in [" et al.", " et al"] {
        if lower.ends_with(tail) {
            party = party[..party.len() - tail.len()].trim().trim_end_matches(',').trim();
            break;
        }
    }
    (!party.is_empty()).then(|| party.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub severity: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub overall: RiskLevel,
    pub red_flags: Vec<String>,
    pub factors: Vec<RiskFactor>,
}

impl Default for RiskAssessment {
    fn default() -> Self {
        Self {
            overall: RiskLevel::Low,
            red_flags: Vec::new(),
            factors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub priority: u8,
    pub total_cases: usize,
    /// Filed within the last year
    pub recent_cases: usize,
    pub keywords_found: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyCase {
    pub category: String,
    pub case: CaseRecord,
}

/// Everything found for one party across all categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LitigationProfile {
    pub party: String,
    pub analysis_date: NaiveDate,
    pub lookback_years: u32,
    pub categories: Vec<CategorySummary>,
    pub risk: RiskAssessment,
    /// Categories whose search failed; their counts are missing, not zero
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_categories: Vec<String>,
    pub cases: Vec<PartyCase>,
}

impl LitigationProfile {
    pub fn total_cases(&self) -> usize {
        self.categories.iter().map(|c| c.total_cases).sum()
    }

    /// Plain-text report, also used as summarizer input.
    pub fn render_report(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LitigationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Employment Legal Analysis Report")?;
        writeln!(f, "{}", "=".repeat(30))?;
        writeln!(f, "\nCompany: {}", self.party)?;
        writeln!(f, "Analysis Date: {}", self.analysis_date)?;
        writeln!(f, "Lookback Period: {} years", self.lookback_years)?;

        writeln!(f, "\nRisk Assessment")?;
        writeln!(f, "{}", "-".repeat(15))?;
        writeln!(f, "Overall Risk: {}", self.risk.overall)?;
        for factor in &self.risk.factors {
            writeln!(f, "- {} ({})", factor.factor, factor.severity)?;
        }

        if !self.risk.red_flags.is_empty() {
            writeln!(f, "\nRed Flags")?;
            writeln!(f, "{}", "-".repeat(9))?;
            for flag in &self.risk.red_flags {
                writeln!(f, "- {flag}")?;
            }
        }

        writeln!(f, "\nCase Summary")?;
        writeln!(f, "{}", "-".repeat(12))?;
        for summary in &self.categories {
            writeln!(f, "\n{}:", summary.category)?;
            writeln!(f, "  Total Cases: {}", summary.total_cases)?;
            writeln!(f, "  Recent Cases: {}", summary.recent_cases)?;
        }
        for failed in &self.failed_categories {
            writeln!(f, "\n{failed}: search failed")?;
        }

        Ok(())
    }
}

/// Summarize one party's cases and score the risk.
///
/// A priority-1 category with more than two cases filed in the last year is
/// a red flag and makes the overall risk high. More than five cases of any
/// category is a high-severity factor.
pub fn analyze_party(
    party: &str,
    categories: &[CaseCategory],
    cases: &[PartyCase],
    lookback_years: u32,
    today: NaiveDate,
) -> LitigationProfile {
    let recent_cutoff = today - Duration::days(365);
    let mut risk = RiskAssessment::default();
    let mut summaries = Vec::with_capacity(categories.len());

    for category in categories {
        let matching: Vec<&CaseRecord> = cases
            .iter()
            .filter(|c| c.category == category.name)
            .map(|c| &c.case)
            .collect();

        let recent_cases = matching
            .iter()
            .filter(|c| c.filed_on().is_some_and(|d| d > recent_cutoff))
            .count();
        let keywords_found = category
            .keywords
            .iter()
            .map(|k| (k.clone(), matching.iter().filter(|c| c.mentions(k)).count()))
            .collect();

        let summary = CategorySummary {
            category: category.name.clone(),
            priority: category.priority,
            total_cases: matching.len(),
            recent_cases,
            keywords_found,
        };

        if category.priority == 1 && summary.recent_cases > 2 {
            risk.red_flags
                .push(format!("Multiple recent {} cases detected", category.name));
            risk.overall = RiskLevel::High;
        }
        if summary.total_cases > 5 {
            risk.factors.push(RiskFactor {
                factor: format!("High volume of {} cases", category.name),
                severity: RiskLevel::High,
            });
        }

        summaries.push(summary);
    }

    LitigationProfile {
        party: party.to_string(),
        analysis_date: today,
        lookback_years,
        categories: summaries,
        risk,
        failed_categories: Vec::new(),
        cases: cases.to_vec(),
    }
}

/// Federal litigation naming the company, grouped by party.
pub struct Litigation {
    search: Arc<dyn CaseSearch>,
    categories: Vec<CaseCategory>,
    lookback_years: u32,
    threshold: u8,
}

impl Litigation {
    pub const ID: &'static str = "litigation";

    pub fn new(
        search: Arc<dyn CaseSearch>,
        categories: Vec<CaseCategory>,
        lookback_years: u32,
        threshold: u8,
    ) -> Self {
        Self {
            search,
            categories,
            lookback_years,
            threshold,
        }
    }

    /// Run every category search concurrently, each under its own retry
    /// budget. Results come back in category order.
    async fn search_categories(
        &self,
        name: &NormalizedName,
        fetcher: &ResilientFetcher,
        today: NaiveDate,
    ) -> Vec<(usize, FetchResult<Vec<CaseRecord>>)> {
        let filed_after = today - Duration::days(365 * i64::from(self.lookback_years));
        let mut tasks = JoinSet::new();

        for (position, category) in self.categories.iter().enumerate() {
            let search = Arc::clone(&self.search);
            let fetcher = *fetcher;
            let query = CaseQuery::new(name, category, filed_after, today);
            let label = format!("litigation search ({})", category.key);

            tasks.spawn(async move {
                let result = fetcher.execute(&label, || search.search(&query)).await;
                (position, result)
            });
        }

        let mut results = Vec::with_capacity(self.categories.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!("Litigation search task failed: {}", e),
            }
        }
        results.sort_by_key(|(position, _)| *position);
        results
    }
}

#[async_trait]
impl Dataset for Litigation {
    fn id(&self) -> &str {
        Self::ID
    }

    fn title(&self) -> &str {
        "Litigation"
    }

    fn threshold(&self) -> u8 {
        self.threshold
    }

    fn match_field(&self) -> &str {
        "case_name"
    }

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::PerQuery
    }

    async fn load_candidates(
        &self,
        name: &NormalizedName,
        fetcher: &ResilientFetcher,
    ) -> FetchResult<Vec<Candidate>> {
        let today = Utc::now().date_naive();
        let results = self.search_categories(name, fetcher, today).await;

        let mut cases: Vec<PartyCase> = Vec::new();
        let mut failed: Vec<String> = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0;

        for (position, result) in results {
            let category = &self.categories[position];
            match result {
                Ok(records) => {
                    succeeded += 1;
                    cases.extend(records.into_iter().map(|case| PartyCase {
                        category: category.name.clone(),
                        case,
                    }));
                }
                Err(e) => {
                    tracing::warn!("{} search failed: {}", category.name, e);
                    failed.push(category.name.clone());
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 && !self.categories.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                FetchError::Missing("no litigation category search completed".into())
            }));
        }

        let mut parties: Vec<(String, String, Vec<PartyCase>)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for case in cases {
            for party in split_parties(&case.case.case_name) {
                let key = canonical_key(&party);
                if key.is_empty() {
                    continue;
                }
                let index = *positions.entry(key.clone()).or_insert_with(|| {
                    parties.push((party, key, Vec::new()));
                    parties.len() - 1
                });
                let entry = &mut parties[index].2;
                if !entry.contains(&case) {
                    entry.push(case.clone());
                }
            }
        }
        tracing::debug!("Litigation search found {} distinct parties", parties.len());

        parties
            .into_iter()
            .map(|(party, key, party_cases)| {
                let mut profile = analyze_party(
                    &party,
                    &self.categories,
                    &party_cases,
                    self.lookback_years,
                    today,
                );
                profile.failed_categories.clone_from(&failed);
                let detail =
                    serde_json::to_value(&profile).map_err(|e| FetchError::Parse(e.to_string()))?;
                Ok(Candidate::new(party, key).with_detail(detail))
            })
            .collect()
    }
}
