//! API Models
//!
//! Request and response bodies of the HTTP API, annotated for `utoipa`.
//! Chat turns and contexts reuse the core wire types.

use serde::{Deserialize, Serialize};
use tutor_core::chat::{ChatContext, ChatMessage};
use tutor_core::log_sink::{LogEntry, LogKind};
use tutor_core::policy::SessionMode;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Debug)]
pub struct ChatRequestPayload {
    /// Prior turns, oldest first. `role` is `learner` or `tutor`.
    #[schema(value_type = Option<Vec<Object>>)]
    pub messages: Option<Vec<ChatMessage>>,
    /// Why the request was issued, e.g. `{"type": "success_feedback", ...}`.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub context: Option<ChatContext>,
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "B")]
    pub mode: Option<SessionMode>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct ChatReply {
    pub message: ReplyMessage,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct ReplyMessage {
    #[schema(example = "assistant")]
    pub role: String,
    pub content: String,
}

impl ChatReply {
    pub fn assistant(content: String) -> Self {
        Self {
            message: ReplyMessage {
                role: "assistant".to_string(),
                content,
            },
        }
    }
}

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LogRequestPayload {
    #[schema(example = "p-017")]
    pub participant_id: Option<String>,
    /// `learn`, `test` or anything else for a top-level update.
    #[serde(rename = "type", default)]
    #[schema(example = "learn")]
    pub kind: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

impl LogRequestPayload {
    /// Converts into a log entry, if a participant was named.
    pub fn into_entry(self) -> Option<LogEntry> {
        let participant_id = self.participant_id.filter(|id| !id.trim().is_empty())?;
        Some(LogEntry {
            participant_id,
            kind: LogKind::from(self.kind.unwrap_or_default()),
            data: self.data,
        })
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct LogResponse {
    pub success: bool,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
