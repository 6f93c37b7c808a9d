use serde::{Deserialize, Serialize};

use super::index::RankedCandidate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate_name: String,
    pub identifier: String,
    pub score: u8,
    pub dataset_id: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl MatchResult {
    pub fn from_ranked(dataset_id: &str, ranked: &RankedCandidate<'_>) -> Self {
        Self {
            candidate_name: ranked.candidate.name.clone(),
            identifier: ranked.candidate.identifier.clone(),
            score: ranked.score,
            dataset_id: dataset_id.to_string(),
            detail: ranked.candidate.detail.clone(),
        }
    }
}

/// Result of resolving one name against one dataset.
///
/// "No confident match" and "too close to call" are ordinary outcomes here,
/// not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Accepted(MatchResult),
    Rejected {
        best_score: u8,
    },
    Ambiguous {
        candidates: Vec<MatchResult>,
    },
    SourceUnavailable {
        reason: String,
    },
}

impl ResolutionOutcome {
    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted(_) => "accepted",
            Self::Rejected { .. } => "rejected",
            Self::Ambiguous { .. } => "ambiguous",
            Self::SourceUnavailable { .. } => "source_unavailable",
        }
    }

    pub fn accepted(&self) -> Option<&MatchResult> {
        match self {
            Self::Accepted(matched) => Some(matched),
            _ => None,
        }
    }

    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

impl std::fmt::Display for ResolutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
