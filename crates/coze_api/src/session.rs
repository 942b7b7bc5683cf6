use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::CozeApiError;
use crate::status::ChatStatus;
use crate::tools::ToolCall;
use crate::wire::{timestamp, WireChat, WireMessage};

/// Message type the provider uses for the assistant's final answer.
pub const ANSWER_MESSAGE_TYPE: &str = "answer";
/// Message type for suggested follow-up questions.
pub const FOLLOW_UP_MESSAGE_TYPE: &str = "follow_up";

/// Token counters reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub token_count: u64,
    #[serde(default)]
    pub output_count: u64,
    #[serde(default)]
    pub input_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Unknown,
}

impl MessageRole {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Option<String>,
    pub role: MessageRole,
    /// Provider message type: `answer`, `follow_up`, `verbose`, `function_call`, ...
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub content_type: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl ChatMessage {
    pub fn is_assistant_answer(&self) -> bool {
        self.role == MessageRole::Assistant && self.kind == ANSWER_MESSAGE_TYPE
    }

    pub(crate) fn from_wire(message: WireMessage) -> Self {
        Self {
            id: message.id,
            role: message
                .role
                .as_deref()
                .map(MessageRole::parse)
                .unwrap_or(MessageRole::Unknown),
            kind: message.kind.unwrap_or_default(),
            content: message.content.unwrap_or_default(),
            content_type: message.content_type,
            created_at: timestamp(&message.created_at),
            updated_at: timestamp(&message.updated_at),
        }
    }
}

/// The latest assistant answer, by creation time. Ties go to the later message
/// in provider order.
pub fn last_assistant_answer(messages: &[ChatMessage]) -> Option<&ChatMessage> {
    messages
        .iter()
        .filter(|message| message.is_assistant_answer())
        .max_by_key(|message| message.created_at)
}

/// Local read-through projection of one provider chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub chat_id: String,
    pub conversation_id: String,
    pub bot_id: Option<String>,
    pub status: ChatStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub failed_at: Option<OffsetDateTime>,
    /// Provider-supplied reason when the chat failed.
    pub last_error: Option<String>,
}

/// Session plus its ordered messages, as returned by one retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSnapshot {
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
    pub last_assistant_message: Option<String>,
    pub required_tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

impl ChatSnapshot {
    pub(crate) fn from_wire(chat: WireChat) -> Result<Self, CozeApiError> {
        let status = chat
            .status
            .as_deref()
            .ok_or(CozeApiError::MissingField("status"))
            .and_then(ChatStatus::classify)?;
        Self::from_wire_with_status(chat, status)
    }

    pub(crate) fn from_wire_with_status(
        chat: WireChat,
        status: ChatStatus,
    ) -> Result<Self, CozeApiError> {
        let last_error = chat.last_error_message();
        let required_tool_calls = chat.tool_calls();
        let chat_id = non_blank(chat.id).ok_or(CozeApiError::MissingField("id"))?;
        let conversation_id =
            non_blank(chat.conversation_id).ok_or(CozeApiError::MissingField("conversation_id"))?;

        let mut messages = chat
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(ChatMessage::from_wire)
            .collect::<Vec<_>>();
        // Stable: messages without timestamps keep provider order.
        messages.sort_by_key(|message| message.created_at);
        let last_assistant_message =
            last_assistant_answer(&messages).map(|message| message.content.clone());

        Ok(Self {
            session: ChatSession {
                chat_id,
                conversation_id,
                bot_id: chat.bot_id,
                status,
                created_at: timestamp(&chat.created_at),
                completed_at: timestamp(&chat.completed_at),
                failed_at: timestamp(&chat.failed_at),
                last_error,
            },
            messages,
            last_assistant_message,
            required_tool_calls,
            usage: chat.usage,
        })
    }

    pub fn status(&self) -> ChatStatus {
        self.session.status
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
