//! Suggestion payloads and the live suggestion record.
//!
//! The external tool answers `suggest skill ... --format json` with
//! `{"results": [{name, description?, key, library?, content?}]}`. Anything
//! that is not JSON is shown as-is with a best-effort key pulled out of it.

use crate::marker::{extract_markers, is_marker_key, render_marker};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

lazy_static! {
    static ref RE_KEY_FIELD: Regex =
        Regex::new(r#"(?i)"?\bkey"?\s*[:=]\s*"?([A-Za-z0-9][A-Za-z0-9._/-]*)"#).unwrap();
    static ref RE_QUALIFIED_TOKEN: Regex =
        Regex::new(r"\b([A-Za-z0-9][A-Za-z0-9._-]*/[A-Za-z0-9][A-Za-z0-9._-]*)\b").unwrap();
}

/// Header line of the block injected into the prompt
const RENDER_HEADER: &str =
    "Suggested by sage (if you use one, include its marker in your reply):";

// ============================================================================
// Payload Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SuggestResponse {
    #[serde(default)]
    pub results: Vec<SuggestCandidate>,
}

/// One candidate returned by `suggest skill`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SuggestCandidate {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub key: String,

    #[serde(default)]
    pub library: Option<String>,

    /// Skill body; rendered when provisioning but never scored
    #[serde(default)]
    pub content: Option<String>,
}

impl SuggestCandidate {
    /// `library/key`, or the bare key without a library
    pub fn qualified_key(&self) -> String {
        match self.library.as_deref().map(str::trim) {
            Some(library) if !library.is_empty() => format!("{}/{}", library, self.key),
            _ => self.key.clone(),
        }
    }
}

// ============================================================================
// Shown Keys
// ============================================================================

/// Insertion-ordered set of qualified keys
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ShownKeys(Vec<String>);

impl ShownKeys {
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.0.contains(&key) {
            return false;
        }
        self.0.push(key);
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|k| k == key)
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl<S: Into<String>> FromIterator<S> for ShownKeys {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut keys = ShownKeys::default();
        for key in iter {
            keys.insert(key);
        }
        keys
    }
}

// ============================================================================
// Prepared / Live Suggestion
// ============================================================================

/// A fetched payload turned into something that can be shown and correlated
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSuggestion {
    pub rendered: String,
    pub correlation_text: String,
    pub primary_key: Option<String>,
    pub shown_keys: ShownKeys,
}

/// The one suggestion a session correlates against
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Input that triggered the fetch
    pub prompt: String,
    pub correlation_text: String,
    pub primary_key: Option<String>,
    pub shown_keys: ShownKeys,
    pub accepted_feedback_sent: bool,
    pub implicit_feedback_sent: bool,
}

impl Suggestion {
    pub fn new(prepared: PreparedSuggestion, prompt: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at,
            prompt: prompt.to_string(),
            correlation_text: prepared.correlation_text,
            primary_key: prepared.primary_key,
            shown_keys: prepared.shown_keys,
            accepted_feedback_sent: false,
            implicit_feedback_sent: false,
        }
    }

    /// Milliseconds since the suggestion was shown
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_milliseconds()
    }

    pub fn is_within_window(&self, now: DateTime<Utc>, window_ms: i64) -> bool {
        self.age_ms(now) <= window_ms
    }
}

// ============================================================================
// Preparation
// ============================================================================

/// Turn raw `suggest skill` stdout into a prepared suggestion.
///
/// Returns `None` when there is nothing to show: valid JSON without
/// candidates, or blank text.
pub fn prepare_suggestion(raw: &str, provision: bool) -> Option<PreparedSuggestion> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => {
            let response: SuggestResponse = serde_json::from_value(value).ok()?;
            prepare_structured(&response.results, provision)
        }
        Err(_) => prepare_fallback(raw),
    }
}

fn prepare_structured(candidates: &[SuggestCandidate], provision: bool) -> Option<PreparedSuggestion> {
    if candidates.is_empty() {
        return None;
    }

    let shown_keys: ShownKeys = candidates.iter().map(SuggestCandidate::qualified_key).collect();
    let primary_key = shown_keys.first().map(str::to_string);
    let correlation_text = candidates
        .iter()
        .map(correlation_fragment)
        .collect::<Vec<_>>()
        .join(" ");
    let rendered = render_candidates(candidates, provision);

    if rendered.trim().is_empty() {
        return None;
    }

    Some(PreparedSuggestion {
        rendered,
        correlation_text,
        primary_key,
        shown_keys,
    })
}

fn prepare_fallback(raw: &str) -> Option<PreparedSuggestion> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    let primary_key = fallback_key(text);
    let shown_keys: ShownKeys = primary_key.iter().cloned().collect();

    Some(PreparedSuggestion {
        rendered: text.to_string(),
        correlation_text: text.to_string(),
        primary_key,
        shown_keys,
    })
}

/// Name, description and key only; content bodies would swamp the overlap score
fn correlation_fragment(candidate: &SuggestCandidate) -> String {
    let mut parts = vec![candidate.name.trim().to_string()];
    if let Some(description) = candidate.description.as_deref() {
        if !description.trim().is_empty() {
            parts.push(description.trim().to_string());
        }
    }
    parts.push(candidate.qualified_key());
    parts.join(" ")
}

/// Human-readable block, one entry per candidate.
///
/// A key the marker parser could not read back gets no marker line.
pub fn render_candidates(candidates: &[SuggestCandidate], provision: bool) -> String {
    let mut out = String::from(RENDER_HEADER);
    out.push('\n');

    for (i, candidate) in candidates.iter().enumerate() {
        let key = candidate.qualified_key();
        out.push_str(&format!("\n{}. {} ({})\n", i + 1, candidate.name.trim(), key));
        if let Some(description) = candidate.description.as_deref() {
            if !description.trim().is_empty() {
                out.push_str(&format!("   {}\n", description.trim()));
            }
        }
        if provision {
            if let Some(content) = candidate.content.as_deref() {
                for line in content.trim().lines() {
                    out.push_str(&format!("   | {}\n", line));
                }
            }
        }
        if is_marker_key(&key) {
            out.push_str(&format!("   Marker: {}\n", render_marker(&key)));
        }
    }

    out
}

/// Permissive key extraction for unstructured output
pub fn fallback_key(text: &str) -> Option<String> {
    if let Some(key) = extract_markers(text).into_iter().next() {
        return Some(key);
    }
    if let Some(caps) = RE_KEY_FIELD.captures(text) {
        return Some(caps[1].trim_end_matches(['.', '/']).to_string());
    }
    RE_QUALIFIED_TOKEN
        .captures(text)
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, description: Option<&str>, key: &str, library: Option<&str>) -> SuggestCandidate {
        SuggestCandidate {
            name: name.to_string(),
            description: description.map(str::to_string),
            key: key.to_string(),
            library: library.map(str::to_string),
            content: Some("## Body\nLots of boilerplate".to_string()),
        }
    }

    #[test]
    fn test_qualified_key() {
        assert_eq!(candidate("n", None, "db-opt", Some("lib")).qualified_key(), "lib/db-opt");
        assert_eq!(candidate("n", None, "db-opt", None).qualified_key(), "db-opt");
        assert_eq!(candidate("n", None, "db-opt", Some("  ")).qualified_key(), "db-opt");
    }

    #[test]
    fn test_shown_keys_unique_by_value() {
        let keys: ShownKeys = ["a/x", "b/y", "a/x"].into_iter().collect();
        assert_eq!(keys.to_vec(), vec!["a/x", "b/y"]);
        assert!(keys.contains("b/y"));
        assert_eq!(keys.first(), Some("a/x"));
    }

    #[test]
    fn test_prepare_structured() {
        let raw = r#"{"results":[
            {"name":"Database Optimization","description":"tips for queries","key":"db-opt","library":"lib","content":"SELECT boilerplate"},
            {"name":"Indexing","key":"idx"}
        ]}"#;
        let prepared = prepare_suggestion(raw, false).unwrap();

        assert_eq!(prepared.primary_key.as_deref(), Some("lib/db-opt"));
        assert_eq!(prepared.shown_keys.to_vec(), vec!["lib/db-opt", "idx"]);
        assert_eq!(
            prepared.correlation_text,
            "Database Optimization tips for queries lib/db-opt Indexing idx"
        );
        assert!(!prepared.correlation_text.contains("boilerplate"));
        assert!(prepared.rendered.contains("[[sage:prompt_key=lib/db-opt]]"));
        assert!(prepared.rendered.contains("[[sage:prompt_key=idx]]"));
        assert!(!prepared.rendered.contains("SELECT boilerplate"));
    }

    #[test]
    fn test_render_includes_content_when_provisioning() {
        let rendered = render_candidates(&[candidate("A", Some("d"), "k", None)], true);
        assert!(rendered.contains("   | ## Body"));
        assert!(rendered.contains("   | Lots of boilerplate"));
    }

    #[test]
    fn test_rendered_markers_parse_back_to_shown_keys() {
        let raw = r#"{"results":[
            {"name":"Scoped","key":"db-opt","library":"@acme"},
            {"name":"Nested","key":"sql/tune","library":"lib"}
        ]}"#;
        let prepared = prepare_suggestion(raw, false).unwrap();

        assert_eq!(prepared.shown_keys.to_vec(), vec!["@acme/db-opt", "lib/sql/tune"]);
        let scan = crate::marker::scan(&prepared.rendered);
        assert_eq!(scan.keys, prepared.shown_keys.to_vec());
        assert!(scan.malformed.is_empty());
    }

    #[test]
    fn test_unparseable_key_gets_no_marker() {
        let rendered = render_candidates(&[candidate("Odd", None, "two words", None)], false);
        assert!(rendered.contains("1. Odd (two words)"));
        assert!(!rendered.contains("Marker:"));
    }

    #[test]
    fn test_prepare_empty_results_is_none() {
        assert!(prepare_suggestion(r#"{"results":[]}"#, false).is_none());
        assert!(prepare_suggestion(r#"{}"#, false).is_none());
        assert!(prepare_suggestion(r#"[1,2]"#, false).is_none());
    }

    #[test]
    fn test_prepare_fallback_raw_text() {
        let prepared = prepare_suggestion("Try the skill key: lib/db-opt for this", false).unwrap();
        assert_eq!(prepared.rendered, "Try the skill key: lib/db-opt for this");
        assert_eq!(prepared.correlation_text, prepared.rendered);
        assert_eq!(prepared.primary_key.as_deref(), Some("lib/db-opt"));
        assert_eq!(prepared.shown_keys.to_vec(), vec!["lib/db-opt"]);
    }

    #[test]
    fn test_prepare_blank_is_none() {
        assert!(prepare_suggestion("   \n", false).is_none());
    }

    #[test]
    fn test_fallback_key_sources() {
        assert_eq!(
            fallback_key("use [[sage:prompt_key=a/b]] and key=c/d").as_deref(),
            Some("a/b")
        );
        assert_eq!(fallback_key(r#"{"key": "plain-key""#).as_deref(), Some("plain-key"));
        assert_eq!(fallback_key("see tools/lint for details").as_deref(), Some("tools/lint"));
        assert_eq!(fallback_key("nothing useful here"), None);
    }

    #[test]
    fn test_window() {
        let now = Utc::now();
        let prepared = prepare_suggestion("key=a", false).unwrap();
        let suggestion = Suggestion::new(prepared, "p", now);
        assert!(suggestion.is_within_window(now + chrono::Duration::milliseconds(30_000), 30_000));
        assert!(!suggestion.is_within_window(now + chrono::Duration::milliseconds(30_001), 30_000));
    }
}
