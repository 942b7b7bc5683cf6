use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ErrorKind;
use crate::session::Usage;
use crate::status::ChatStatus;
use crate::tools::ToolCall;

pub const MESSAGE_DELTA_EVENT: &str = "conversation.message.delta";
pub const MESSAGE_COMPLETED_EVENT: &str = "conversation.message.completed";
pub const CHAT_EVENT_PREFIX: &str = "conversation.chat.";
pub const ERROR_EVENT: &str = "error";
pub const DONE_EVENT: &str = "done";
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    /// Incremental fragment of the answer.
    Delta,
    /// Full text of one finished message.
    Completed,
    /// Chat-level status change (`conversation.chat.*`).
    ChatUpdate,
    Error,
    /// End of stream; carries every delta received so far.
    Done,
}

impl StreamEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delta => "delta",
            Self::Completed => "completed",
            Self::ChatUpdate => "chat_update",
            Self::Error => "error",
            Self::Done => "done",
        }
    }
}

/// One decoded protocol event.
///
/// `arrival_sequence` is the ordering key: strictly increasing per connection.
/// `timestamp` is wall-clock at decode time and only advisory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event_type: StreamEventType,
    pub content: String,
    pub conversation_id: Option<String>,
    pub chat_id: Option<String>,
    /// Provider message type for message events (`answer`, `follow_up`, ...).
    pub message_type: Option<String>,
    /// Classified chat status for `ChatUpdate` events.
    pub status: Option<ChatStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    /// Set on `Error` events.
    pub error_kind: Option<ErrorKind>,
    pub arrival_sequence: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub is_completed: bool,
}

impl StreamEvent {
    pub fn new(event_type: StreamEventType, content: impl Into<String>, arrival_sequence: u64) -> Self {
        Self {
            event_type,
            content: content.into(),
            conversation_id: None,
            chat_id: None,
            message_type: None,
            status: None,
            tool_calls: Vec::new(),
            usage: None,
            error_kind: None,
            arrival_sequence,
            timestamp: OffsetDateTime::now_utc(),
            is_completed: !matches!(event_type, StreamEventType::Delta | StreamEventType::ChatUpdate),
        }
    }

    pub fn error(kind: ErrorKind, content: impl Into<String>, arrival_sequence: u64) -> Self {
        let mut event = Self::new(StreamEventType::Error, content, arrival_sequence);
        event.error_kind = Some(kind);
        event
    }

    pub fn with_ids(mut self, conversation_id: Option<String>, chat_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self.chat_id = chat_id;
        self
    }

    pub fn is_delta(&self) -> bool {
        self.event_type == StreamEventType::Delta
    }

    pub fn is_error(&self) -> bool {
        self.event_type == StreamEventType::Error
    }
}
