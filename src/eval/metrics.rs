//! Deterministic, LLM-free metrics.

use super::chain::RetrievedDocument;
use std::collections::HashSet;

/// Fraction of expected keywords an answer must contain to count as a hit.
pub const DEFAULT_HIT_THRESHOLD: f64 = 0.5;

/// Retrieval redundancy of one result list: `1 - unique / total` over the
/// document identifiers. Empty identifiers are ordinary values.
pub fn duplicate_rate(documents: &[RetrievedDocument]) -> f64 {
    let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
    duplicate_rate_of_ids(&ids)
}

/// [`duplicate_rate`] over raw identifiers.
pub fn duplicate_rate_of_ids<S: AsRef<str>>(ids: &[S]) -> f64 {
    if ids.is_empty() {
        return 0.0;
    }

    let unique: HashSet<&str> = ids.iter().map(|id| id.as_ref()).collect();
    1.0 - unique.len() as f64 / ids.len() as f64
}

/// Keyword hit at the default 50% threshold.
pub fn hit<S: AsRef<str>>(answer: &str, expected_keywords: &[S]) -> bool {
    hit_with_threshold(answer, expected_keywords, DEFAULT_HIT_THRESHOLD)
}

/// Whether at least `threshold` of the expected keywords occur in the answer
/// (case-insensitive substring match).
///
/// No keywords means no ground truth, which never counts as a pass.
pub fn hit_with_threshold<S: AsRef<str>>(answer: &str, expected_keywords: &[S], threshold: f64) -> bool {
    if expected_keywords.is_empty() {
        return false;
    }

    let answer = answer.to_lowercase();
    let matched = expected_keywords
        .iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty() && answer.contains(k.as_str()))
        .count();

    matched as f64 / expected_keywords.len() as f64 >= threshold
}

/// Round to a fixed number of decimals for reporting.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
