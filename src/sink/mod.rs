//! The external tool, seen as a capability.
//!
//! The bridge only ever sends facts through this trait and reads back one
//! thing: suggestion contents for a single fetch. [`cli::CliSink`] talks to
//! the real command-line tool, [`memory::MemorySink`] records calls in memory.

pub mod cli;
pub mod memory;

use crate::error::Result;
use crate::events::TokenUsage;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

pub use cli::CliSink;
pub use memory::{MemorySink, SinkCall, SinkOp};

/// `capture hook prompt`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptCapture {
    pub prompt: String,
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub workspace: Option<PathBuf>,
}

/// `capture hook response`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseCapture {
    pub response: String,
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub tokens: TokenUsage,
}

/// `suggest skill <prompt> --format json --limit N [--provision]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestRequest {
    pub prompt: String,
    pub limit: usize,
    pub provision: bool,
}

/// `suggest prompt capture <id> <prompt> --source <s> --shown <key>...`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionReport {
    pub id: Uuid,
    pub prompt: String,
    pub source: String,
    pub shown_keys: Vec<String>,
    /// Contextual attributes, sent as `--attributes-json` when not null
    pub attributes: serde_json::Value,
}

/// One entry of `suggest prompt feedback <id> --events-json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackEvent {
    pub kind: String,
    pub prompt_key: String,
    pub confidence: f64,
    /// JSON-encoded feature map
    pub features_json: String,
}

#[async_trait]
pub trait ExternalSink: Send + Sync {
    async fn capture_prompt(&self, capture: &PromptCapture) -> Result<()>;

    async fn capture_response(&self, capture: &ResponseCapture) -> Result<()>;

    /// Raw stdout of the suggestion fetch
    async fn fetch_suggestion(&self, request: &SuggestRequest) -> Result<String>;

    async fn report_suggestion(&self, report: &SuggestionReport) -> Result<()>;

    async fn record_prompt_feedback(&self, suggestion_id: Uuid, events: &[FeedbackEvent]) -> Result<()>;

    /// Legacy single-line feedback append
    async fn append_feedback(&self, key: &str, entry: &str, source: &str) -> Result<()>;
}
