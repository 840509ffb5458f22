//! Host events consumed by the bridge.
//!
//! Only the fields the bridge reads are modelled; everything else in the
//! host's payloads is ignored.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum HostEvent {
    /// A user prompt about to be sent
    #[serde(rename = "chat.message")]
    ChatMessage {
        #[serde(rename = "sessionMeta")]
        session: SessionMeta,
        output: MessageOutput,
    },

    /// A streamed fragment of the assistant reply
    #[serde(rename = "message.part.updated")]
    PartUpdated { part: MessagePart },

    #[serde(rename = "message.updated")]
    MessageUpdated { info: MessageInfo },

    #[serde(rename = "session.created")]
    SessionCreated { info: SessionInfo },

    /// Text appended to the TUI prompt; drives suggestion scheduling
    #[serde(rename = "tui.prompt.append")]
    PromptAppend { text: String },

    #[serde(other)]
    Other,
}

impl HostEvent {
    pub fn from_json(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(BridgeError::EventParse)
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::ChatMessage { .. } => "chat.message",
            HostEvent::PartUpdated { .. } => "message.part.updated",
            HostEvent::MessageUpdated { .. } => "message.updated",
            HostEvent::SessionCreated { .. } => "session.created",
            HostEvent::PromptAppend { .. } => "tui.prompt.append",
            HostEvent::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SessionMeta {
    #[serde(rename = "sessionID", default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub model: Option<ModelRef>,
}

impl SessionMeta {
    pub fn model_id(&self) -> Option<&str> {
        self.model.as_ref().and_then(|m| m.model_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ModelRef {
    #[serde(rename = "modelID", default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MessageOutput {
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessageOutput {
    /// Concatenated text of all `text` parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(MessagePart::text)
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MessagePart {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub text: Option<String>,
}

impl MessagePart {
    /// Text of a `text` part; other part kinds carry none
    pub fn text(&self) -> Option<&str> {
        if self.kind == "text" {
            self.text.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MessageInfo {
    #[serde(default)]
    pub role: String,

    #[serde(rename = "sessionID", default)]
    pub session_id: Option<String>,

    #[serde(rename = "modelID", default)]
    pub model_id: Option<String>,

    #[serde(default)]
    pub tokens: TokenUsage,
}

impl MessageInfo {
    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,

    #[serde(default)]
    pub output: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub id: String,

    #[serde(rename = "parentID", default)]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub directory: Option<PathBuf>,
}
