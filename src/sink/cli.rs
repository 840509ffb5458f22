//! Production sink: runs the external tool as a subprocess.
//!
//! No timeout is imposed here; a hung process stalls only the handler that
//! awaited it.

use super::{
    ExternalSink, FeedbackEvent, PromptCapture, ResponseCapture, SuggestRequest, SuggestionReport,
};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

pub struct CliSink {
    program: String,
}

impl CliSink {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the tool and return its stdout; non-zero exit is an error
    async fn run(&self, args: &[String], env: &[(&str, String)]) -> Result<String> {
        let label = command_label(&self.program, args);
        debug!("Running {}", label);

        let output = Command::new(&self.program)
            .args(args)
            .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BridgeError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(BridgeError::CommandFailed {
                command: label,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| BridgeError::InvalidOutput(e.to_string()))
    }
}

/// Program plus the two subcommand words; never user text
fn command_label(program: &str, args: &[String]) -> String {
    let words: Vec<&str> = args.iter().take(2).map(String::as_str).collect();
    format!("{} {}", program, words.join(" "))
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

// ============================================================================
// Argument Builders
// ============================================================================

pub fn prompt_capture_env(capture: &PromptCapture) -> Vec<(&'static str, String)> {
    vec![
        ("SAGE_PROMPT", capture.prompt.clone()),
        ("SAGE_SESSION_ID", opt(&capture.session_id)),
        ("SAGE_MODEL", opt(&capture.model)),
        (
            "SAGE_WORKSPACE",
            capture
                .workspace
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ),
    ]
}

pub fn response_capture_env(capture: &ResponseCapture) -> Vec<(&'static str, String)> {
    vec![
        ("SAGE_RESPONSE", capture.response.clone()),
        ("SAGE_SESSION_ID", opt(&capture.session_id)),
        ("SAGE_MODEL", opt(&capture.model)),
        ("SAGE_TOKENS_INPUT", capture.tokens.input.to_string()),
        ("SAGE_TOKENS_OUTPUT", capture.tokens.output.to_string()),
    ]
}

/// Free text (prompts, entries, keys) goes after `--` so a leading dash is never read as a flag
pub fn suggest_args(request: &SuggestRequest) -> Vec<String> {
    let mut args = vec![
        "suggest".to_string(),
        "skill".to_string(),
        "--format".to_string(),
        "json".to_string(),
        "--limit".to_string(),
        request.limit.to_string(),
    ];
    if request.provision {
        args.push("--provision".to_string());
    }
    args.push("--".to_string());
    args.push(request.prompt.clone());
    args
}

pub fn report_args(report: &SuggestionReport) -> Vec<String> {
    let mut args = vec![
        "suggest".to_string(),
        "prompt".to_string(),
        "capture".to_string(),
        "--source".to_string(),
        report.source.clone(),
    ];
    for key in &report.shown_keys {
        args.push(format!("--shown={}", key));
    }
    if !report.attributes.is_null() {
        args.push("--attributes-json".to_string());
        args.push(report.attributes.to_string());
    }
    args.push("--".to_string());
    args.push(report.id.to_string());
    args.push(report.prompt.clone());
    args
}

pub fn feedback_args(suggestion_id: Uuid, events: &[FeedbackEvent]) -> Result<Vec<String>> {
    Ok(vec![
        "suggest".to_string(),
        "prompt".to_string(),
        "feedback".to_string(),
        suggestion_id.to_string(),
        "--events-json".to_string(),
        serde_json::to_string(events)?,
    ])
}

pub fn append_feedback_args(key: &str, entry: &str, source: &str) -> Vec<String> {
    vec![
        "suggest".to_string(),
        "feedback".to_string(),
        "--source".to_string(),
        source.to_string(),
        "--".to_string(),
        key.to_string(),
        entry.to_string(),
    ]
}

// ============================================================================
// Sink
// ============================================================================

#[async_trait]
impl ExternalSink for CliSink {
    async fn capture_prompt(&self, capture: &PromptCapture) -> Result<()> {
        let args = ["capture", "hook", "prompt"].map(String::from);
        self.run(&args, &prompt_capture_env(capture)).await.map(|_| ())
    }

    async fn capture_response(&self, capture: &ResponseCapture) -> Result<()> {
        let args = ["capture", "hook", "response"].map(String::from);
        self.run(&args, &response_capture_env(capture)).await.map(|_| ())
    }

    async fn fetch_suggestion(&self, request: &SuggestRequest) -> Result<String> {
        self.run(&suggest_args(request), &[]).await
    }

    async fn report_suggestion(&self, report: &SuggestionReport) -> Result<()> {
        self.run(&report_args(report), &[]).await.map(|_| ())
    }

    async fn record_prompt_feedback(&self, suggestion_id: Uuid, events: &[FeedbackEvent]) -> Result<()> {
        let args = feedback_args(suggestion_id, events)?;
        self.run(&args, &[]).await.map(|_| ())
    }

    async fn append_feedback(&self, key: &str, entry: &str, source: &str) -> Result<()> {
        self.run(&append_feedback_args(key, entry, source), &[])
            .await
            .map(|_| ())
    }
}
