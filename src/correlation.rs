//! Correlation of a follow-up prompt with the suggestion shown before it.
//!
//! Scoring is a containment ratio, not Jaccard: every user token found in the
//! suggestion's token set counts once per occurrence, and the count is
//! divided by the longer of the two token lists.

use crate::suggestion::Suggestion;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Overlap strictly above this is an acceptance
pub const ACCEPT_THRESHOLD: f64 = 0.7;

/// Overlap strictly above this (and not accepted) is a steer
pub const STEER_THRESHOLD: f64 = 0.3;

/// Max keyword samples carried in steer feedback
pub const MAX_DIFF_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationKind {
    Accepted,
    Steered,
    Rejected,
}

impl CorrelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationKind::Accepted => "accepted",
            CorrelationKind::Steered => "steered",
            CorrelationKind::Rejected => "rejected",
        }
    }

    /// Classify an overlap ratio
    pub fn from_overlap(overlap: f64) -> Self {
        if overlap > ACCEPT_THRESHOLD {
            CorrelationKind::Accepted
        } else if overlap > STEER_THRESHOLD {
            CorrelationKind::Steered
        } else {
            CorrelationKind::Rejected
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResult {
    #[serde(rename = "type")]
    pub kind: CorrelationKind,
    pub key: String,
    pub overlap: f64,
    /// Steers only: user words the suggestion did not have
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<Vec<String>>,
    /// Steers only: suggestion words the user dropped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<Vec<String>>,
}

/// Lower-case, whitespace-split
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// `|user ∩ suggestion| / max(|user|, |suggestion|)`, in `[0, 1]`
pub fn overlap_ratio(user_tokens: &[String], suggestion_tokens: &[String]) -> f64 {
    let denominator = user_tokens.len().max(suggestion_tokens.len());
    if denominator == 0 {
        return 0.0;
    }

    let suggestion_set: HashSet<&str> = suggestion_tokens.iter().map(String::as_str).collect();
    let intersection = user_tokens
        .iter()
        .filter(|t| suggestion_set.contains(t.as_str()))
        .count();

    intersection as f64 / denominator as f64
}

/// Up to [`MAX_DIFF_SAMPLES`] distinct tokens of `from` missing in `against`
fn missing_sample(from: &[String], against: &[String]) -> Vec<String> {
    let against: HashSet<&str> = against.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    from.iter()
        .filter(|t| !against.contains(t.as_str()))
        .filter(|t| seen.insert(t.as_str()))
        .take(MAX_DIFF_SAMPLES)
        .cloned()
        .collect()
}

/// Score `prompt` against the correlation text and classify it under `key`
pub fn correlate(prompt: &str, correlation_text: &str, key: &str) -> CorrelationResult {
    let user_tokens = tokenize(prompt);
    let suggestion_tokens = tokenize(correlation_text);
    let overlap = overlap_ratio(&user_tokens, &suggestion_tokens);
    let kind = CorrelationKind::from_overlap(overlap);

    let (added, removed) = if kind == CorrelationKind::Steered {
        (
            Some(missing_sample(&user_tokens, &suggestion_tokens)),
            Some(missing_sample(&suggestion_tokens, &user_tokens)),
        )
    } else {
        (None, None)
    };

    CorrelationResult {
        kind,
        key: key.to_string(),
        overlap,
        added,
        removed,
    }
}

/// Analyze a new user prompt against the live suggestion.
///
/// `None` when there is no suggestion, it is older than `window_ms`, or it
/// carries no usable key.
pub fn analyze(
    prompt: &str,
    suggestion: Option<&Suggestion>,
    now: DateTime<Utc>,
    window_ms: i64,
) -> Option<CorrelationResult> {
    let suggestion = suggestion?;
    if !suggestion.is_within_window(now, window_ms) {
        return None;
    }
    let key = suggestion
        .primary_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())?;

    Some(correlate(prompt, &suggestion.correlation_text, key))
}
