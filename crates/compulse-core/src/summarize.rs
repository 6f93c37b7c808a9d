//! Optional text summarization through a local language-model server.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::network::{FetchResult, HttpClient, ResilientFetcher};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub server_url: String,
    pub model: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:11434".to_string(),
            model: "summarizer".to_string(),
        }
    }
}

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

/// Remove `<think>...</think>` reasoning blocks some models emit.
pub fn strip_think_tags(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

pub fn filing_prompt(filing_text: &str) -> String {
    format!(
        "Please analyze this 10K filing and extract all the useful info into easy to read \
         nuance points, highlight significant numbers. The input: {filing_text}"
    )
}

pub fn dispute_prompt(report: &str, lookback_years: u32) -> String {
    format!(
        "Given the following analysis report of a company's employment-related legal matters, \
         provide a summary of the company's employment disputes and relevant suggestions for a \
         job seeker considering an application to the company.\n\
         Note that the total cases cover {lookback_years} years of history and recent cases \
         cover the last year.\n{report}"
    )
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &str) -> FetchResult<String>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Summarizer backed by an Ollama server's `/api/generate`.
pub struct OllamaSummarizer {
    client: HttpClient,
    fetcher: ResilientFetcher,
    config: SummarizerConfig,
}

impl OllamaSummarizer {
    pub const fn new(client: HttpClient, fetcher: ResilientFetcher, config: SummarizerConfig) -> Self {
        Self {
            client,
            fetcher,
            config,
        }
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, prompt: &str) -> FetchResult<String> {
        let url = format!("{}/api/generate", self.config.server_url.trim_end_matches('/'));
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
        };

        let response: GenerateResponse = self
            .fetcher
            .execute("summarizer", || async {
                let request = self.client.post(&url)?.json(&body);
                self.client.send_json(request).await
            })
            .await?;

        Ok(strip_think_tags(&response.response))
    }
}
