use serde::{Deserialize, Serialize};

use super::index::RankedCandidate;
use super::outcome::{MatchResult, ResolutionOutcome};

/// Decides whether the best fuzzy match for a dataset is good enough, and
/// distinct enough from the runner-up, to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionGate {
    /// A runner-up within this many points of the top score makes the match
    /// ambiguous.
    pub margin: u8,
    /// Maximum number of candidates reported for an ambiguous match.
    pub max_candidates: usize,
}

impl Default for ResolutionGate {
    fn default() -> Self {
        Self {
            margin: 10,
            max_candidates: 5,
        }
    }
}

impl ResolutionGate {
    pub const fn new(margin: u8, max_candidates: usize) -> Self {
        Self {
            margin,
            max_candidates,
        }
    }

    /// `ranked` must be sorted best first, as produced by
    /// [`CandidateIndex::rank`](super::CandidateIndex::rank).
    ///
    /// Any runner-up within `margin` contests the top score, but only
    /// candidates that clear `threshold` are listed in an ambiguous outcome.
    pub fn decide(
        &self,
        dataset_id: &str,
        ranked: &[RankedCandidate<'_>],
        threshold: u8,
    ) -> ResolutionOutcome {
        let Some(top) = ranked.first() else {
            return ResolutionOutcome::Rejected { best_score: 0 };
        };

        if top.score < threshold {
            return ResolutionOutcome::Rejected {
                best_score: top.score,
            };
        }

        let contested = ranked
            .get(1)
            .is_some_and(|second| top.score.saturating_sub(second.score) <= self.margin);

        if !contested {
            return ResolutionOutcome::Accepted(MatchResult::from_ranked(dataset_id, top));
        }

        let candidates = ranked
            .iter()
            .take_while(|r| r.score >= threshold)
            .take(self.max_candidates.max(2))
            .map(|r| MatchResult::from_ranked(dataset_id, r))
            .collect();

        ResolutionOutcome::Ambiguous { candidates }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::index::Candidate;

    fn candidates(n: usize) -> Vec<Candidate> {
        (0..n).map(|i| Candidate::new(format!("Company {i}"), format!("C{i}"))).collect()
    }

    fn ranked<'a>(pool: &'a [Candidate], scores: &[u8]) -> Vec<RankedCandidate<'a>> {
        scores
            .iter()
            .zip(pool)
            .map(|(&score, candidate)| RankedCandidate { candidate, score })
            .collect()
    }

    #[test]
    fn test_empty_is_rejected_with_zero() {
        let gate = ResolutionGate::default();
        assert_eq!(gate.decide("d", &[], 70), ResolutionOutcome::Rejected { best_score: 0 });
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let pool = candidates(1);
        let gate = ResolutionGate::default();

        let at = gate.decide("d", &ranked(&pool, &[70]), 70);
        assert!(at.is_accepted());
        assert_eq!(at.accepted().unwrap().score, 70);

        let below = gate.decide("d", &ranked(&pool, &[69]), 70);
        assert_eq!(below, ResolutionOutcome::Rejected { best_score: 69 });
    }

    #[test]
    fn test_close_runner_up_is_ambiguous() {
        let pool = candidates(2);
        let gate = ResolutionGate::new(10, 5);

        match gate.decide("d", &ranked(&pool, &[95, 94]), 70) {
            ResolutionOutcome::Ambiguous { candidates } => {
                assert_eq!(candidates.len(), 2);
                assert_eq!(candidates[0].identifier, "C0");
                assert_eq!(candidates[1].score, 94);
            }
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_distant_runner_up_accepts_top() {
        let pool = candidates(2);
        let gate = ResolutionGate::new(10, 5);

        let outcome = gate.decide("d", &ranked(&pool, &[95, 80]), 70);
        let matched = outcome.accepted().expect("accepted");
        assert_eq!(matched.identifier, "C0");
        assert_eq!(matched.score, 95);
        assert_eq!(matched.dataset_id, "d");
    }

    #[test]
    fn test_margin_boundary_is_ambiguous() {
        let pool = candidates(2);
        let gate = ResolutionGate::new(10, 5);
        let outcome = gate.decide("d", &ranked(&pool, &[95, 85]), 70);
        assert!(matches!(outcome, ResolutionOutcome::Ambiguous { .. }));
    }

    #[test]
    fn test_runner_up_below_threshold_still_contests() {
        let pool = candidates(2);
        let gate = ResolutionGate::new(10, 5);

        match gate.decide("d", &ranked(&pool, &[72, 65]), 70) {
            ResolutionOutcome::Ambiguous { candidates } => {
                assert_eq!(candidates.len(), 1);
                assert_eq!(candidates[0].identifier, "C0");
                assert_eq!(candidates[0].score, 72);
            }
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_runner_up_just_outside_margin_accepts() {
        let pool = candidates(2);
        let gate = ResolutionGate::new(10, 5);
        let outcome = gate.decide("d", &ranked(&pool, &[72, 61]), 70);
        assert!(outcome.is_accepted());
    }

    #[test]
    fn test_ambiguous_lists_only_candidates_above_threshold() {
        let pool = candidates(8);
        let gate = ResolutionGate::new(10, 3);

        match gate.decide("d", &ranked(&pool, &[90, 90, 88, 85, 60, 50, 40, 30]), 70) {
            ResolutionOutcome::Ambiguous { candidates } => {
                assert_eq!(candidates.len(), 3);
                assert!(candidates.iter().all(|c| c.score >= 70));
            }
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }
}
