use super::normalizer::fold;

/// Token-based ratios lose this much relative to a plain edit-distance ratio
/// so that a whole-string match outranks a subset match.
const TOKEN_SCALE: f64 = 0.95;
/// Extra penalty on token ratios when one string is much longer than the
/// other.
const LENGTH_SKEW_SCALE: f64 = 0.9;
const LENGTH_SKEW_RATIO: f64 = 1.5;

/// A string pre-processed for scoring. Candidate keys are prepared once per
/// index and reused for every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    raw_lower: String,
    folded: String,
    sorted: String,
    tokens: Vec<String>,
    len: usize,
}

impl Prepared {
    pub fn new(value: &str) -> Self {
        let folded = fold(value);
        let mut tokens: Vec<String> = folded.split(' ').filter(|t| !t.is_empty()).map(String::from).collect();
        tokens.sort();
        let sorted = tokens.join(" ");
        tokens.dedup();
        let len = folded.chars().count();

        Self {
            raw_lower: value.trim().to_lowercase(),
            folded,
            sorted,
            tokens,
            len,
        }
    }

    pub fn folded(&self) -> &str {
        &self.folded
    }
}

/// Scores free-text queries against candidate names.
///
/// The score is an integer in `0..=100`: the best of an edit-distance ratio,
/// a token-sort ratio and a token-set ratio. It only depends on the two
/// strings, so ranking is deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyMatcher;

impl FuzzyMatcher {
    pub fn score(query: &str, candidate: &str) -> u8 {
        Self::score_prepared(&Prepared::new(query), &Prepared::new(candidate))
    }

    pub fn score_prepared(query: &Prepared, candidate: &Prepared) -> u8 {
        if query.raw_lower == candidate.raw_lower {
            return 100;
        }
        if query.folded.is_empty() || candidate.folded.is_empty() {
            return 0;
        }

        let plain = ratio(&query.folded, &candidate.folded);
        let sort = ratio(&query.sorted, &candidate.sorted);
        let set = token_set_ratio(&query.tokens, &candidate.tokens);

        let (short, long) = if query.len <= candidate.len {
            (query.len, candidate.len)
        } else {
            (candidate.len, query.len)
        };
        let skew = if long as f64 / short as f64 >= LENGTH_SKEW_RATIO {
            LENGTH_SKEW_SCALE
        } else {
            1.0
        };

        let best = plain.max(sort * TOKEN_SCALE).max(set * TOKEN_SCALE * skew);
        to_score(best)
    }

    /// Rank candidates against a single query, best first.
    ///
    /// Returns `(index, score)` pairs; equal scores keep the candidates'
    /// original order.
    pub fn rank<S: AsRef<str>>(query: &str, candidates: &[S]) -> Vec<(usize, u8)> {
        let prepared: Vec<Prepared> = candidates.iter().map(|c| Prepared::new(c.as_ref())).collect();
        Self::rank_prepared(&[Prepared::new(query)], &prepared)
    }

    /// Rank candidates against several spellings of one query, keeping each
    /// candidate's best score across spellings.
    pub fn rank_prepared(queries: &[Prepared], candidates: &[Prepared]) -> Vec<(usize, u8)> {
        let mut ranked: Vec<(usize, u8)> = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let mut best = 0;
                for query in queries {
                    best = best.max(Self::score_prepared(query, candidate));
                    if best == 100 {
                        break;
                    }
                }
                (index, best)
            })
            .collect();

        // sort_by is stable, so ties stay in first-seen order
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }
}

fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

fn token_set_ratio(a: &[String], b: &[String]) -> f64 {
    let intersection: Vec<&str> = a.iter().filter(|t| b.contains(t)).map(String::as_str).collect();
    let only_a: Vec<&str> = a.iter().filter(|t| !b.contains(t)).map(String::as_str).collect();
    let only_b: Vec<&str> = b.iter().filter(|t| !a.contains(t)).map(String::as_str).collect();

    let sect = intersection.join(" ");
    let combined_a = join_nonempty(&sect, &only_a.join(" "));
    let combined_b = join_nonempty(&sect, &only_b.join(" "));

    if sect.is_empty() {
        return ratio(&combined_a, &combined_b);
    }

    ratio(&sect, &combined_a)
        .max(ratio(&sect, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{head} {tail}"),
    }
}

fn to_score(similarity: f64) -> u8 {
    (similarity * 100.0).round().clamp(0.0, 100.0) as u8
}
