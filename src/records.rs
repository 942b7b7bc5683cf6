//! Plain result records returned by [`crate::AgentService`].
//!
//! Runtime failures are carried in the record (`success`, `error_message`,
//! `error_kind`); only validation errors are returned as `Err`.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use coze_api::{
    BufferedChat, ChatMessage, ChatSnapshot, ChatStatus, CompletionOutcome, CozeApiError,
    ErrorKind, MergeResult, StartedChat, SubmitOutcome, ToolCall,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub success: bool,
    pub conversation_id: Option<String>,
    pub chat_id: Option<String>,
    pub status: Option<ChatStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    pub tokens_used: u64,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ChatResponse {
    pub fn failure(error: &CozeApiError) -> Self {
        Self {
            content: String::new(),
            success: false,
            conversation_id: None,
            chat_id: None,
            status: None,
            tool_calls: Vec::new(),
            suggestions: Vec::new(),
            tokens_used: 0,
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind()),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Failure of a chat the provider already created, so it can be retrieved later.
    pub fn failure_for_chat(chat: &StartedChat, error: &CozeApiError) -> Self {
        Self {
            chat_id: Some(chat.chat_id.clone()),
            conversation_id: Some(chat.conversation_id.clone()),
            ..Self::failure(error)
        }
    }
}

impl From<BufferedChat> for ChatResponse {
    fn from(chat: BufferedChat) -> Self {
        let content = chat.outcome.display_text();
        let status = chat.outcome.status();
        let (success, error_message, error_kind, tool_calls) = match chat.outcome {
            CompletionOutcome::Answered { .. } | CompletionOutcome::CompletedEmpty => {
                (true, None, None, Vec::new())
            }
            CompletionOutcome::RequiresAction { tool_calls } => (true, None, None, tool_calls),
            CompletionOutcome::Failed { reason } => (
                false,
                Some(reason.unwrap_or_else(|| content.clone())),
                Some(ErrorKind::Provider),
                Vec::new(),
            ),
        };

        Self {
            content,
            success,
            conversation_id: Some(chat.conversation_id),
            chat_id: Some(chat.chat_id),
            status: Some(status),
            tool_calls,
            suggestions: Vec::new(),
            tokens_used: chat.usage.map_or(0, |usage| usage.token_count),
            error_message,
            error_kind,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

impl From<MergeResult> for ChatResponse {
    fn from(merged: MergeResult) -> Self {
        Self {
            content: merged.content,
            success: merged.success,
            conversation_id: merged.conversation_id,
            chat_id: merged.chat_id,
            status: merged.status,
            tool_calls: merged.tool_calls,
            suggestions: merged.statistics.suggestions,
            tokens_used: merged.usage.map_or(0, |usage| usage.token_count),
            error_message: merged.error_message,
            error_kind: merged.error_kind,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveChatResult {
    pub chat_id: String,
    pub conversation_id: String,
    pub bot_id: Option<String>,
    pub status: Option<ChatStatus>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub failed_at: Option<OffsetDateTime>,
    pub messages: Vec<ChatMessage>,
    pub last_assistant_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_tool_calls: Vec<ToolCall>,
    pub tokens_used: u64,
    /// Whether the query itself succeeded; a failed chat is still a successful query.
    pub success: bool,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl RetrieveChatResult {
    pub fn failure(chat_id: &str, conversation_id: &str, error: &CozeApiError) -> Self {
        Self {
            chat_id: chat_id.to_owned(),
            conversation_id: conversation_id.to_owned(),
            bot_id: None,
            status: None,
            created_at: None,
            completed_at: None,
            failed_at: None,
            messages: Vec::new(),
            last_assistant_message: None,
            required_tool_calls: Vec::new(),
            tokens_used: 0,
            success: false,
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

impl From<ChatSnapshot> for RetrieveChatResult {
    fn from(snapshot: ChatSnapshot) -> Self {
        let status = snapshot.status();
        let session = snapshot.session;
        Self {
            chat_id: session.chat_id,
            conversation_id: session.conversation_id,
            bot_id: session.bot_id,
            status: Some(status),
            created_at: session.created_at,
            completed_at: session.completed_at,
            failed_at: session.failed_at,
            messages: snapshot.messages,
            last_assistant_message: snapshot.last_assistant_message,
            required_tool_calls: snapshot.required_tool_calls,
            tokens_used: snapshot.usage.map_or(0, |usage| usage.token_count),
            success: true,
            error_message: session.last_error,
            error_kind: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitToolOutputsResult {
    pub chat_id: String,
    pub conversation_id: String,
    pub status: Option<ChatStatus>,
    pub content: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub failed_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_tool_calls: Vec<ToolCall>,
    pub tokens_used: u64,
    pub success: bool,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl SubmitToolOutputsResult {
    pub fn failure(chat_id: &str, conversation_id: &str, error: &CozeApiError) -> Self {
        Self {
            chat_id: chat_id.to_owned(),
            conversation_id: conversation_id.to_owned(),
            status: None,
            content: None,
            created_at: OffsetDateTime::now_utc(),
            completed_at: None,
            failed_at: None,
            required_tool_calls: Vec::new(),
            tokens_used: 0,
            success: false,
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

impl From<SubmitOutcome> for SubmitToolOutputsResult {
    fn from(outcome: SubmitOutcome) -> Self {
        Self {
            chat_id: outcome.chat_id,
            conversation_id: outcome.conversation_id,
            status: outcome.status,
            content: outcome.content,
            created_at: outcome.created_at.unwrap_or_else(OffsetDateTime::now_utc),
            completed_at: outcome.completed_at,
            failed_at: outcome.failed_at,
            required_tool_calls: outcome.required_tool_calls,
            tokens_used: outcome.usage.map_or(0, |usage| usage.token_count),
            success: outcome.success,
            error_message: outcome.error_message,
            error_kind: outcome.error_kind,
        }
    }
}
