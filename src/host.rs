//! Calls the bridge makes back into the host.

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

/// Service name attached to every host log entry
pub const SERVICE_NAME: &str = "sage-bridge";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// `client.app.log({service, level, message, extra})`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub service: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>, extra: serde_json::Value) -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            level,
            message: message.into(),
            extra,
        }
    }
}

#[async_trait]
pub trait Host: Send + Sync {
    async fn log(&self, entry: LogEntry) -> Result<()>;

    /// `client.tui.appendPrompt({body: {text}})`
    async fn append_prompt(&self, text: &str) -> Result<()>;
}

/// Records host calls; used by tests and by embedders without a UI
#[derive(Debug, Default)]
pub struct MemoryHost {
    logs: Mutex<Vec<LogEntry>>,
    injected: Mutex<Vec<String>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn injected(&self) -> Vec<String> {
        self.injected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Host for MemoryHost {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        Ok(())
    }

    async fn append_prompt(&self, text: &str) -> Result<()> {
        self.injected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
        Ok(())
    }
}
