//! "Did you mean" suggestions for unresolved names.

use rapidfuzz::distance::jaro_winkler::similarity as jaro_similarity;

/// Minimum Jaro-Winkler similarity for a candidate to be offered.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Best-scoring candidate for `name`, compared case-insensitively.
pub fn suggest<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let target = name.to_uppercase();
    let mut best: Option<(f64, &str)> = None;
    for candidate in candidates {
        let upper = candidate.to_uppercase();
        if upper == target {
            continue;
        }
        let score = jaro_similarity(target.chars(), upper.chars());
        if score < SUGGESTION_THRESHOLD {
            continue;
        }
        // Ties keep the first candidate so suggestions are stable.
        if best.is_none_or(|(top, _)| score > top) {
            best = Some((score, candidate));
        }
    }
    best.map(|(_, candidate)| candidate.to_string())
}
