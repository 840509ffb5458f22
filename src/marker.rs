//! Explicit suggestion-usage markers.
//!
//! Grammar (no whitespace inside the brackets):
//!
//! ```text
//! marker := "[[sage:" "prompt_key" "=" key "]]"
//! key    := [^[\]\s]+
//! ```
//!
//! Keys are opaque: nested (`lib/sql/tune`) and scoped (`@acme/db-opt`)
//! library paths parse like any other key.
//!
//! Text without the literal marker form yields no markers, however clearly it
//! talks about a suggested skill.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

const MARKER_OPEN: &str = "[[sage:";
const MARKER_CLOSE: &str = "]]";
const KEY_FIELD: &str = "prompt_key";

lazy_static! {
    static ref RE_MARKER_KEY: Regex = Regex::new(r"^[^\[\]\s]+$").unwrap();
}

/// Why a `[[sage:` opening did not produce a key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkerError {
    #[error("marker is not closed with `]]`")]
    MissingTerminator,

    #[error("unknown marker field `{0}`")]
    UnknownField(String),

    #[error("marker has an empty key")]
    EmptyKey,

    #[error("`{0}` cannot appear in a marker")]
    InvalidKey(String),
}

/// Result of scanning a block of assistant text
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MarkerScan {
    /// Distinct well-formed keys in first-seen order
    pub keys: Vec<String>,
    /// Openings that failed to parse
    pub malformed: Vec<MarkerError>,
}

impl MarkerScan {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.malformed.is_empty()
    }
}

/// Whether `key` survives a render/parse round trip
pub fn is_marker_key(key: &str) -> bool {
    RE_MARKER_KEY.is_match(key)
}

/// Render the marker an assistant should echo for `key`
pub fn render_marker(key: &str) -> String {
    format!("{}{}={}{}", MARKER_OPEN, KEY_FIELD, key, MARKER_CLOSE)
}

/// Parse the body between `[[sage:` and `]]`
pub fn parse_marker_body(body: &str) -> Result<String, MarkerError> {
    let (field, value) = body
        .split_once('=')
        .ok_or_else(|| MarkerError::UnknownField(body.to_string()))?;

    if field != KEY_FIELD {
        return Err(MarkerError::UnknownField(field.to_string()));
    }
    if value.is_empty() {
        return Err(MarkerError::EmptyKey);
    }
    if !is_marker_key(value) {
        return Err(MarkerError::InvalidKey(value.to_string()));
    }
    Ok(value.to_string())
}

/// Scan `text` for every marker opening
pub fn scan(text: &str) -> MarkerScan {
    let mut result = MarkerScan::default();
    let mut rest = text;

    while let Some(start) = rest.find(MARKER_OPEN) {
        let after = &rest[start + MARKER_OPEN.len()..];
        let Some(end) = after.find(MARKER_CLOSE) else {
            result.malformed.push(MarkerError::MissingTerminator);
            break;
        };

        let body = &after[..end];
        // A fresh opening before the close means the earlier one was never terminated
        if let Some(reopen) = body.find(MARKER_OPEN) {
            result.malformed.push(MarkerError::MissingTerminator);
            rest = &after[reopen..];
            continue;
        }

        match parse_marker_body(body) {
            Ok(key) => {
                if !result.keys.contains(&key) {
                    result.keys.push(key);
                }
            }
            Err(e) => result.malformed.push(e),
        }
        rest = &after[end + MARKER_CLOSE.len()..];
    }

    result
}

/// Distinct marker keys in `text`, first-seen order
pub fn extract_markers(text: &str) -> Vec<String> {
    scan(text).keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_markers() {
        let scan = scan("I used the database optimization skill from lib/db-opt.");
        assert!(scan.is_empty());
    }

    #[test]
    fn test_single_marker() {
        let keys = extract_markers("Done. [[sage:prompt_key=lib/db-opt]]");
        assert_eq!(keys, vec!["lib/db-opt"]);
    }

    #[test]
    fn test_bare_key_marker() {
        assert_eq!(extract_markers("[[sage:prompt_key=db-opt]]"), vec!["db-opt"]);
    }

    #[test]
    fn test_distinct_first_seen_order() {
        let text = "[[sage:prompt_key=b/two]] x [[sage:prompt_key=a/one]] y [[sage:prompt_key=b/two]]";
        assert_eq!(extract_markers(text), vec!["b/two", "a/one"]);
    }

    #[test]
    fn test_malformed_markers() {
        let scan = scan(
            "[[sage:prompt_key=]] [[sage:other=x]] [[sage:prompt_key=bad key]] [[sage:prompt_key=ok/key",
        );
        assert!(scan.keys.is_empty());
        assert_eq!(
            scan.malformed,
            vec![
                MarkerError::EmptyKey,
                MarkerError::UnknownField("other".to_string()),
                MarkerError::InvalidKey("bad key".to_string()),
                MarkerError::MissingTerminator,
            ]
        );
    }

    #[test]
    fn test_unterminated_then_valid() {
        let scan = scan("[[sage:prompt_key=a [[sage:prompt_key=lib/b]]");
        assert_eq!(scan.keys, vec!["lib/b"]);
        assert_eq!(scan.malformed, vec![MarkerError::MissingTerminator]);
    }

    #[test]
    fn test_render_round_trips_through_parser() {
        let marker = render_marker("lib/db-opt");
        assert_eq!(marker, "[[sage:prompt_key=lib/db-opt]]");
        assert_eq!(extract_markers(&marker), vec!["lib/db-opt"]);
    }

    #[test]
    fn test_nested_and_scoped_keys() {
        for key in ["lib/sql/tune", "@acme/db-opt", "team:core/v2.1"] {
            let scan = scan(&format!("ok {}", render_marker(key)));
            assert_eq!(scan.keys, vec![key]);
            assert!(scan.malformed.is_empty());
        }
    }

    #[test]
    fn test_is_marker_key() {
        assert!(is_marker_key("lib/db-opt"));
        assert!(is_marker_key("@acme/db-opt"));
        assert!(!is_marker_key(""));
        assert!(!is_marker_key("two words"));
        assert!(!is_marker_key("odd]key"));
        assert!(!is_marker_key("odd[key"));
    }
}
