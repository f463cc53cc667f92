//! Fuzzy string matching
//!
//! One normalized similarity primitive shared by tool matching and layer-name
//! lookup. Scores are `2 * matching_chars / total_chars` over a character diff,
//! in the range 0..=1, computed on lowercased, whitespace-collapsed text.

use similar::TextDiff;

/// Minimum similarity for a candidate to count as a match
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Lowercase, turn `_`/`-` into spaces and collapse runs of whitespace
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity ratio between two strings after normalization
///
/// Empty input on either side scores 0.0.
pub fn similarity(a: &str, b: &str) -> f32 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    TextDiff::from_chars(a.as_str(), b.as_str()).ratio()
}

/// A candidate that cleared the threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Position of the candidate in the input order
    pub index: usize,
    pub score: f32,
}

/// Pick the best-scoring candidate at or above `threshold`
///
/// Ties keep the earliest candidate.
pub fn best_match<'a, I>(query: &str, candidates: I, threshold: f32) -> Option<Match>
where
    I: IntoIterator<Item = &'a str>,
{
    best_by_score(candidates.into_iter().map(|c| similarity(query, c)), threshold)
}

/// Same selection rule as [`best_match`], over precomputed scores
pub fn best_by_score<I>(scores: I, threshold: f32) -> Option<Match>
where
    I: IntoIterator<Item = f32>,
{
    let mut best: Option<Match> = None;
    for (index, score) in scores.into_iter().enumerate() {
        if score < threshold {
            continue;
        }
        match best {
            Some(current) if score <= current.score => {}
            _ => best = Some(Match { index, score }),
        }
    }
    best
}

/// Resolve a user-supplied layer name against the known layer names
pub fn find_layer<'a>(query: &str, layer_names: &'a [String], threshold: f32) -> Option<&'a str> {
    best_match(query, layer_names.iter().map(String::as_str), threshold)
        .map(|m| layer_names[m.index].as_str())
}
