//! In-memory sink: records every call, serves scripted fetch output and can
//! be told to stall or fail individual operations.

use super::{
    ExternalSink, FeedbackEvent, PromptCapture, ResponseCapture, SuggestRequest, SuggestionReport,
};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkOp {
    CapturePrompt,
    CaptureResponse,
    FetchSuggestion,
    ReportSuggestion,
    PromptFeedback,
    AppendFeedback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    CapturePrompt(PromptCapture),
    CaptureResponse(ResponseCapture),
    FetchSuggestion(SuggestRequest),
    ReportSuggestion(SuggestionReport),
    PromptFeedback {
        suggestion_id: Uuid,
        events: Vec<FeedbackEvent>,
    },
    AppendFeedback {
        key: String,
        entry: String,
        source: String,
    },
}

impl SinkCall {
    pub fn op(&self) -> SinkOp {
        match self {
            SinkCall::CapturePrompt(_) => SinkOp::CapturePrompt,
            SinkCall::CaptureResponse(_) => SinkOp::CaptureResponse,
            SinkCall::FetchSuggestion(_) => SinkOp::FetchSuggestion,
            SinkCall::ReportSuggestion(_) => SinkOp::ReportSuggestion,
            SinkCall::PromptFeedback { .. } => SinkOp::PromptFeedback,
            SinkCall::AppendFeedback { .. } => SinkOp::AppendFeedback,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    calls: Mutex<Vec<SinkCall>>,
    fetch_responses: Mutex<VecDeque<String>>,
    failing: Mutex<HashSet<SinkOp>>,
    delays: Mutex<HashMap<SinkOp, Duration>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue stdout for the next fetch; an empty queue answers `""`
    pub fn push_fetch_response(&self, raw: impl Into<String>) {
        locked(&self.fetch_responses).push_back(raw.into());
    }

    /// Make every call of `op` fail with a command error
    pub fn fail(&self, op: SinkOp) {
        locked(&self.failing).insert(op);
    }

    pub fn recover(&self, op: SinkOp) {
        locked(&self.failing).remove(&op);
    }

    /// Hold every call of `op` for `delay` (tokio time) after recording it
    pub fn set_delay(&self, op: SinkOp, delay: Duration) {
        locked(&self.delays).insert(op, delay);
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        locked(&self.calls).clone()
    }

    pub fn count(&self, op: SinkOp) -> usize {
        locked(&self.calls).iter().filter(|c| c.op() == op).count()
    }

    /// Every structured feedback event, flattened, in send order
    pub fn feedback_events(&self) -> Vec<FeedbackEvent> {
        locked(&self.calls)
            .iter()
            .filter_map(|c| match c {
                SinkCall::PromptFeedback { events, .. } => Some(events.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// `(key, entry)` of every legacy feedback append
    pub fn appended_feedback(&self) -> Vec<(String, String)> {
        locked(&self.calls)
            .iter()
            .filter_map(|c| match c {
                SinkCall::AppendFeedback { key, entry, .. } => Some((key.clone(), entry.clone())),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: SinkCall) -> Result<()> {
        let op = call.op();
        locked(&self.calls).push(call);
        let delay = locked(&self.delays).get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if locked(&self.failing).contains(&op) {
            return Err(BridgeError::CommandFailed {
                command: format!("memory {:?}", op),
                status: Some(1),
                stderr: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalSink for MemorySink {
    async fn capture_prompt(&self, capture: &PromptCapture) -> Result<()> {
        self.record(SinkCall::CapturePrompt(capture.clone())).await
    }

    async fn capture_response(&self, capture: &ResponseCapture) -> Result<()> {
        self.record(SinkCall::CaptureResponse(capture.clone())).await
    }

    async fn fetch_suggestion(&self, request: &SuggestRequest) -> Result<String> {
        self.record(SinkCall::FetchSuggestion(request.clone())).await?;
        Ok(locked(&self.fetch_responses).pop_front().unwrap_or_default())
    }

    async fn report_suggestion(&self, report: &SuggestionReport) -> Result<()> {
        self.record(SinkCall::ReportSuggestion(report.clone())).await
    }

    async fn record_prompt_feedback(&self, suggestion_id: Uuid, events: &[FeedbackEvent]) -> Result<()> {
        self.record(SinkCall::PromptFeedback {
            suggestion_id,
            events: events.to_vec(),
        })
        .await
    }

    async fn append_feedback(&self, key: &str, entry: &str, source: &str) -> Result<()> {
        self.record(SinkCall::AppendFeedback {
            key: key.to_string(),
            entry: entry.to_string(),
            source: source.to_string(),
        })
        .await
    }
}
