use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::matcher::{FuzzyMatcher, Prepared};
use super::normalizer::NormalizedName;

/// One dataset's record key, the identifier used to pull the full record,
/// and the dataset's aggregated detail for that key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl Candidate {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            detail: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// A candidate paired with its best score for the current query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedCandidate<'a> {
    pub candidate: &'a Candidate,
    pub score: u8,
}

/// In-memory lookup of a dataset's known entity names.
///
/// Names are deduplicated on load (first record wins) and prepared for
/// scoring once. The index is immutable after construction and shared
/// between concurrent resolutions.
#[derive(Debug, Default)]
pub struct CandidateIndex {
    candidates: Vec<Candidate>,
    keys: Vec<Prepared>,
}

impl CandidateIndex {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        let mut seen: HashSet<String> = HashSet::new();
        let candidates: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| !c.name.trim().is_empty() && seen.insert(c.name.clone()))
            .collect();
        let keys = candidates.iter().map(|c| Prepared::new(&c.name)).collect();

        Self { candidates, keys }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Rank every candidate against all match forms of `name`.
    pub fn rank(&self, name: &NormalizedName) -> Vec<RankedCandidate<'_>> {
        let queries: Vec<Prepared> = name.match_forms().into_iter().map(Prepared::new).collect();

        FuzzyMatcher::rank_prepared(&queries, &self.keys)
            .into_iter()
            .map(|(index, score)| RankedCandidate {
                candidate: &self.candidates[index],
                score,
            })
            .collect()
    }
}
