mod gate;
mod index;
mod matcher;
mod normalizer;
mod outcome;

pub use gate::ResolutionGate;
pub use index::{Candidate, CandidateIndex, RankedCandidate};
pub use matcher::{FuzzyMatcher, Prepared};
pub use normalizer::{
    canonical_key, fold, normalize, strip_all_suffixes, strip_suffix, NormalizedName,
    LEGAL_SUFFIXES,
};
pub use outcome::{MatchResult, ResolutionOutcome};
