use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};

use crate::network::{FetchError, FetchResult, HttpClient, ResilientFetcher};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilingsConfig {
    pub submissions_url: String,
    pub archive_url: String,
    pub extract_api_url: String,
    pub api_key: Option<String>,
    pub user_agent: String,
    pub form_type: String,
    pub sections: Vec<String>,
}

impl Default for FilingsConfig {
    fn default() -> Self {
        Self {
            submissions_url: "https://data.sec.gov/submissions".to_string(),
            archive_url: "https://www.sec.gov/Archives/edgar/data".to_string(),
            extract_api_url: "https://api.sec-api.io/extractor".to_string(),
            api_key: None,
            user_agent: "compulse/0.1 (set SEC_USER_AGENT to a contact address)".to_string(),
            form_type: "10-K".to_string(),
            sections: ["1", "1A", "2", "7", "7A", "8"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Submissions {
    #[serde(default)]
    filings: SubmissionFilings,
}

#[derive(Debug, Default, Deserialize)]
struct SubmissionFilings {
    #[serde(default)]
    recent: RecentFilings,
}

#[derive(Debug, Default, Deserialize)]
struct RecentFilings {
    #[serde(default, rename = "accessionNumber")]
    accession_number: Vec<String>,
    #[serde(default)]
    form: Vec<String>,
}

/// Index-page URLs for every recent filing of `form_type`, newest first.
pub fn parse_filing_urls(
    archive_url: &str,
    cik: u64,
    body: &str,
    form_type: &str,
) -> FetchResult<Vec<String>> {
    let submissions: Submissions =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(format!("submissions: {e}")))?;
    let recent = submissions.filings.recent;
    let archive = archive_url.trim_end_matches('/');

    Ok(recent
        .accession_number
        .iter()
        .zip(&recent.form)
        .filter(|(_, form)| *form == form_type)
        .map(|(accession, _)| format!("{archive}/{cik}/{}/index.html", accession.replace('-', "")))
        .collect())
}

static PAGE_FOOTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^.*\|.*Form 10-K \|.*(?:\n|$)").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n)+").unwrap());

/// Drop page-footer lines and collapse runs of blank lines.
pub fn clean_section_text(text: &str) -> String {
    let without_footers = PAGE_FOOTER.replace_all(text, "");
    BLANK_RUNS
        .replace_all(&without_footers, "\n")
        .trim()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingSection {
    pub item: String,
    pub text: String,
}

/// Selected sections of a company's most recent annual report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingExtract {
    pub cik: u64,
    pub filing_url: String,
    pub sections: Vec<FilingSection>,
    /// Items that could not be extracted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

impl FilingExtract {
    pub fn combined_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Regulatory filing archive plus the section-extraction service.
///
/// Not a resolution dataset: it is looked up by the CIK the identity
/// registry resolved.
pub struct FilingArchive {
    client: HttpClient,
    fetcher: ResilientFetcher,
    config: FilingsConfig,
}

impl FilingArchive {
    pub const fn new(client: HttpClient, fetcher: ResilientFetcher, config: FilingsConfig) -> Self {
        Self {
            client,
            fetcher,
            config,
        }
    }

    pub async fn filing_urls(&self, cik: u64) -> FetchResult<Vec<String>> {
        let url = format!(
            "{}/CIK{cik:010}.json",
            self.config.submissions_url.trim_end_matches('/')
        );
        let body = self
            .fetcher
            .execute("filing index", || async {
                let request = self
                    .client
                    .get(&url)?
                    .header(USER_AGENT, &self.config.user_agent);
                self.client.send_text(request).await
            })
            .await?;

        parse_filing_urls(&self.config.archive_url, cik, &body, &self.config.form_type)
    }

    pub async fn extract_section(&self, filing_url: &str, item: &str) -> FetchResult<String> {
        let token = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::NotConfigured("SEC_API_KEY is not set".to_string()))?;

        let label = format!("extract item {item}");
        let raw = self
            .fetcher
            .execute(&label, || async {
                let request = self.client.get(&self.config.extract_api_url)?.query(&[
                    ("url", filing_url),
                    ("item", item),
                    ("type", "text"),
                    ("token", token),
                ]);
                self.client.send_text(request).await
            })
            .await?;

        Ok(clean_section_text(&raw))
    }

    /// Extract the configured sections of the latest filing.
    ///
    /// Sections that fail are listed in `missing`; the call only fails when
    /// the filing itself cannot be located or no section could be read.
    pub async fn latest_sections(&self, cik: u64) -> FetchResult<FilingExtract> {
        let urls = self.filing_urls(cik).await?;
        let filing_url = urls.into_iter().next().ok_or_else(|| {
            FetchError::Missing(format!("no {} filings listed for CIK {cik}", self.config.form_type))
        })?;

        let mut sections = Vec::new();
        let mut missing = Vec::new();
        let mut last_error = None;

        for item in &self.config.sections {
            match self.extract_section(&filing_url, item).await {
                Ok(text) if !text.is_empty() => sections.push(FilingSection {
                    item: item.clone(),
                    text,
                }),
                Ok(_) => missing.push(item.clone()),
                Err(e) => {
                    tracing::warn!("Could not extract item {} from {}: {}", item, filing_url, e);
                    missing.push(item.clone());
                    last_error = Some(e);
                }
            }
        }

        if sections.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        Ok(FilingExtract {
            cik,
            filing_url,
            sections,
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkConfig;

    const SUBMISSIONS: &str = r#"{
        "cik": "1045810",
        "filings": {
            "recent": {
                "accessionNumber": ["0001045810-24-000029", "0001045810-24-000012", "0001045810-23-000017"],
                "form": ["10-Q", "10-K", "10-K"]
            }
        }
    }"#;

    #[test]
    fn test_parse_filing_urls() {
        let urls = parse_filing_urls(
            "https://www.sec.gov/Archives/edgar/data/",
            1_045_810,
            SUBMISSIONS,
            "10-K",
        )
        .unwrap();

        assert_eq!(
            urls,
            vec![
                "https://www.sec.gov/Archives/edgar/data/1045810/000104581024000012/index.html",
                "https://www.sec.gov/Archives/edgar/data/1045810/000104581023000017/index.html",
            ]
        );
    }

    #[test]
    fn test_parse_filing_urls_without_filings() {
        let urls = parse_filing_urls("https://a.example", 1, "{}", "10-K").unwrap();
        assert!(urls.is_empty());
        assert!(parse_filing_urls("https://a.example", 1, "<html>", "10-K").is_err());
    }

    #[test]
    fn test_clean_section_text() {
        let raw = "Item 1. Business\n\n\nWe make GPUs.\nNVIDIA Corporation | 2024 Form 10-K | 4\n\n  \nRevenue grew.\n";
        assert_eq!(
            clean_section_text(raw),
            "Item 1. Business\nWe make GPUs.\nRevenue grew."
        );
    }

    #[test]
    fn test_combined_text() {
        let extract = FilingExtract {
            cik: 1,
            filing_url: "https://a.example".into(),
            sections: vec![
                FilingSection {
                    item: "1".into(),
                    text: "Business".into(),
                },
                FilingSection {
                    item: "1A".into(),
                    text: "Risks".into(),
                },
            ],
            missing: vec!["7".into()],
        };
        assert_eq!(extract.combined_text(), "Business\nRisks");
    }

    #[tokio::test]
    async fn test_extract_requires_api_key() {
        let client = HttpClient::new(NetworkConfig::default()).unwrap();
        let archive = FilingArchive::new(client, ResilientFetcher::default(), FilingsConfig::default());

        let result = archive
            .extract_section("https://www.sec.gov/Archives/edgar/data/1/2/index.html", "1A")
            .await;
        assert!(matches!(result, Err(FetchError::NotConfigured(_))));
    }
}
