use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::report::AggregateReport;
use crate::sources::{FilingArchive, FilingExtract, LitigationProfile};
use crate::summarize::{dispute_prompt, filing_prompt, Summarizer};

const IDENTITY_DATASET: &str = "identity_registry";
const LITIGATION_DATASET: &str = "litigation";

/// Follow-up material gathered after resolution: the latest annual filing
/// and optional model summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub filing: Option<FilingExtract>,
    pub filing_summary: Option<String>,
    pub dispute_summary: Option<String>,
    /// Steps that were skipped or failed, with the reason
    pub notes: Vec<String>,
}

impl Enrichment {
    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Enrichment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref filing) = self.filing {
            writeln!(f, "== Annual filing (CIK {}) ==", filing.cik)?;
            writeln!(f, "{}", filing.filing_url)?;
            for section in &filing.sections {
                writeln!(f, "  Item {}: {} chars", section.item, section.text.len())?;
            }
            if !filing.missing.is_empty() {
                writeln!(f, "  Missing items: {}", filing.missing.join(", "))?;
            }
        }
        if let Some(ref summary) = self.filing_summary {
            writeln!(f, "\n== Filing summary ==\n{summary}")?;
        }
        if let Some(ref summary) = self.dispute_summary {
            writeln!(f, "\n== Employment disputes ==\n{summary}")?;
        }
        if !self.notes.is_empty() {
            writeln!(f, "\nNotes:")?;
            for note in &self.notes {
                writeln!(f, "- {note}")?;
            }
        }
        Ok(())
    }
}

/// Builds an [`Enrichment`] from an accepted report.
///
/// Never fails: anything missing or broken ends up in `notes`.
#[derive(Default)]
pub struct Enricher {
    archive: Option<FilingArchive>,
    summarizer: Option<Arc<dyn Summarizer>>,
    lookback_years: u32,
}

impl Enricher {
    pub fn new(lookback_years: u32) -> Self {
        Self {
            lookback_years,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_archive(mut self, archive: FilingArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub async fn enrich(&self, report: &AggregateReport) -> Enrichment {
        let mut enrichment = Enrichment::default();

        if let Some(ref archive) = self.archive {
            match report
                .accepted(IDENTITY_DATASET)
                .and_then(|m| m.detail["cik"].as_u64())
            {
                Some(cik) => match archive.latest_sections(cik).await {
                    Ok(extract) => enrichment.filing = Some(extract),
                    Err(e) => {
                        tracing::warn!("Filing lookup for CIK {} failed: {}", cik, e);
                        enrichment.notes.push(format!("filing unavailable: {e}"));
                    }
                },
                None => enrichment
                    .notes
                    .push("filing skipped: no confident registry match".to_string()),
            }
        }

        let Some(ref summarizer) = self.summarizer else {
            return enrichment;
        };

        if let Some(ref filing) = enrichment.filing {
            let prompt = filing_prompt(&filing.combined_text());
            match summarizer.summarize(&prompt).await {
                Ok(summary) => enrichment.filing_summary = Some(summary),
                Err(e) => enrichment
                    .notes
                    .push(format!("filing summary unavailable: {e}")),
            }
        }

        let profile = report
            .accepted(LITIGATION_DATASET)
            .map(|m| serde_json::from_value::<LitigationProfile>(m.detail.clone()));
        match profile {
            Some(Ok(profile)) => {
                let prompt = dispute_prompt(&profile.render_report(), self.lookback_years);
                match summarizer.summarize(&prompt).await {
                    Ok(summary) => enrichment.dispute_summary = Some(summary),
                    Err(e) => enrichment
                        .notes
                        .push(format!("dispute summary unavailable: {e}")),
                }
            }
            Some(Err(e)) => enrichment
                .notes
                .push(format!("dispute summary skipped: unreadable case profile: {e}")),
            None => enrichment
                .notes
                .push("dispute summary skipped: no confident litigation match".to_string()),
        }

        enrichment
    }
}
