use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::state::ResolutionState;
use crate::resolve::{MatchResult, NormalizedName, ResolutionOutcome};

/// How one dataset resolved, and how it got there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetResolution {
    pub dataset_id: String,
    pub title: String,
    pub threshold: u8,
    pub outcome: ResolutionOutcome,
    pub trace: Vec<ResolutionState>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub accepted: usize,
    pub rejected: usize,
    pub ambiguous: usize,
    pub unavailable: usize,
}

/// Consolidated result of resolving one name against every dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: NormalizedName,
    pub datasets: BTreeMap<String, DatasetResolution>,
}

impl AggregateReport {
    pub fn new(name: NormalizedName, datasets: BTreeMap<String, DatasetResolution>) -> Self {
        Self {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            name,
            datasets,
        }
    }

    pub fn outcome(&self, dataset_id: &str) -> Option<&ResolutionOutcome> {
        self.datasets.get(dataset_id).map(|d| &d.outcome)
    }

    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &ResolutionOutcome)> {
        self.datasets
            .iter()
            .map(|(id, resolution)| (id.as_str(), &resolution.outcome))
    }

    pub fn accepted(&self, dataset_id: &str) -> Option<&MatchResult> {
        self.outcome(dataset_id).and_then(ResolutionOutcome::accepted)
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for (_, outcome) in self.outcomes() {
            match outcome {
                ResolutionOutcome::Accepted(_) => counts.accepted += 1,
                ResolutionOutcome::Rejected { .. } => counts.rejected += 1,
                ResolutionOutcome::Ambiguous { .. } => counts.ambiguous += 1,
                ResolutionOutcome::SourceUnavailable { .. } => counts.unavailable += 1,
            }
        }
        counts
    }

    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Company profile: {}", self.name.original.trim())?;
        writeln!(
            f,
            "Searched as \"{}\" ({} variants), report {} at {}",
            self.name.base_form,
            self.name.variants.len(),
            self.id,
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;

        for resolution in self.datasets.values() {
            writeln!(f)?;
            writeln!(f, "== {} ({}) ==", resolution.title, resolution.dataset_id)?;
            render_outcome(f, resolution)?;
        }

        let counts = self.counts();
        writeln!(f)?;
        writeln!(
            f,
            "{} accepted, {} rejected, {} ambiguous, {} unavailable",
            counts.accepted, counts.rejected, counts.ambiguous, counts.unavailable
        )?;
        Ok(())
    }
}

fn render_outcome(f: &mut fmt::Formatter<'_>, resolution: &DatasetResolution) -> fmt::Result {
    let threshold = resolution.threshold;
    match &resolution.outcome {
        ResolutionOutcome::Accepted(m) => {
            writeln!(
                f,
                "Matched {} [{}], score {} (threshold {})",
                m.candidate_name, m.identifier, m.score, threshold
            )?;
            for line in detail_lines(&m.detail) {
                writeln!(f, "  {line}")?;
            }
        }
        ResolutionOutcome::Rejected { best_score } => {
            writeln!(
                f,
                "No confident match (best score {best_score}, threshold {threshold})"
            )?;
        }
        ResolutionOutcome::Ambiguous { candidates } => {
            writeln!(f, "Ambiguous, {} close candidates:", candidates.len())?;
            for m in candidates {
                writeln!(f, "  - {} [{}], score {}", m.candidate_name, m.identifier, m.score)?;
            }
        }
        ResolutionOutcome::SourceUnavailable { reason } => {
            writeln!(f, "Source unavailable: {reason}")?;
        }
    }
    Ok(())
}

const MAX_INLINE_ITEMS: usize = 5;

/// Flatten a detail record into "key: value" lines, one level deep.
fn detail_lines(detail: &Value) -> Vec<String> {
    let Value::Object(fields) = detail else {
        return scalar(detail).into_iter().collect();
    };

    let mut lines = Vec::new();
    for (key, value) in fields {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                let scalars: Option<Vec<String>> = items.iter().map(scalar).collect();
                match scalars {
                    Some(values) if !values.is_empty() && values.len() <= MAX_INLINE_ITEMS => {
                        lines.push(format!("{key}: {}", values.join(", ")));
                    }
                    _ => lines.push(format!("{key}: {} entries", items.len())),
                }
            }
            Value::Object(nested) => {
                for (sub, value) in nested {
                    if let Some(text) = scalar(value) {
                        lines.push(format!("{key}.{sub}: {text}"));
                    }
                }
            }
            other => {
                if let Some(text) = scalar(other) {
                    lines.push(format!("{key}: {text}"));
                }
            }
        }
    }
    lines
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
