//! Feedback dispatch to the external tool.
//!
//! Both calls are best-effort: a failure is logged and reported as `false`,
//! never propagated.

use crate::clock::Clock;
use crate::correlation::{CorrelationKind, CorrelationResult};
use crate::sink::{ExternalSink, FeedbackEvent};
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Structured kind for a marker echoed back by the assistant
pub const IMPLICITLY_HELPFUL: &str = "implicitly_helpful";

pub struct FeedbackEmitter {
    sink: Arc<dyn ExternalSink>,
    clock: Arc<dyn Clock>,
    source: String,
    enabled: bool,
}

impl FeedbackEmitter {
    pub fn new(sink: Arc<dyn ExternalSink>, clock: Arc<dyn Clock>, source: &str, enabled: bool) -> Self {
        Self {
            sink,
            clock,
            source: source.to_string(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Structured event plus the legacy dated entry for one classification
    pub async fn emit_correlation(&self, suggestion_id: Uuid, result: &CorrelationResult) -> bool {
        if !self.enabled {
            debug!("Feedback disabled, dropping {} for {}", result.kind.as_str(), result.key);
            return false;
        }

        let structured = self
            .record_events(suggestion_id, &[correlation_event(result)])
            .await;
        let entry = compose_entry(result, self.clock.now().date_naive());
        let legacy = self.append_entry(&result.key, &entry).await;
        structured && legacy
    }

    /// One `implicitly_helpful` event at full confidence
    pub async fn emit_implicit(&self, suggestion_id: Uuid, key: &str) -> bool {
        if !self.enabled {
            debug!("Feedback disabled, dropping implicit feedback for {}", key);
            return false;
        }
        self.record_events(suggestion_id, &[implicit_event(key)]).await
    }

    pub async fn record_events(&self, suggestion_id: Uuid, events: &[FeedbackEvent]) -> bool {
        match self.sink.record_prompt_feedback(suggestion_id, events).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to record feedback for suggestion {}: {}", suggestion_id, e);
                false
            }
        }
    }

    pub async fn append_entry(&self, key: &str, entry: &str) -> bool {
        match self.sink.append_feedback(key, entry, &self.source).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to append feedback for {}: {}", key, e);
                false
            }
        }
    }
}

fn percent(ratio: f64) -> String {
    format!("{:.0}%", ratio * 100.0)
}

fn sample(words: &Option<Vec<String>>) -> String {
    match words.as_deref() {
        Some(words) if !words.is_empty() => words.join(", "),
        _ => "none".to_string(),
    }
}

/// Single-line, dated, distinct per classification
pub fn compose_entry(result: &CorrelationResult, date: NaiveDate) -> String {
    let date = date.format("%Y-%m-%d");
    match result.kind {
        CorrelationKind::Accepted => format!(
            "{} accepted suggestion (overlap {})",
            date,
            percent(result.overlap)
        ),
        CorrelationKind::Steered => format!(
            "{} steered suggestion (added: {}; removed: {})",
            date,
            sample(&result.added),
            sample(&result.removed)
        ),
        CorrelationKind::Rejected => format!(
            "{} rejected suggestion (low overlap {})",
            date,
            percent(result.overlap)
        ),
    }
}

pub fn correlation_event(result: &CorrelationResult) -> FeedbackEvent {
    let features = json!({
        "source": "correlation",
        "overlap": result.overlap,
        "added": result.added.clone().unwrap_or_default(),
        "removed": result.removed.clone().unwrap_or_default(),
    });
    FeedbackEvent {
        kind: result.kind.as_str().to_string(),
        prompt_key: result.key.clone(),
        confidence: result.overlap,
        features_json: features.to_string(),
    }
}

pub fn implicit_event(key: &str) -> FeedbackEvent {
    FeedbackEvent {
        kind: IMPLICITLY_HELPFUL.to_string(),
        prompt_key: key.to_string(),
        confidence: 1.0,
        features_json: json!({"source": "marker"}).to_string(),
    }
}
