use serde::{Deserialize, Serialize};

use crate::error::CozeApiError;
use crate::tools::ToolOutput;

/// Placeholder identity used when the caller does not name a user.
pub const DEFAULT_USER_ID: &str = "123456";
pub const USER_ROLE: &str = "user";
pub const TEXT_CONTENT_TYPE: &str = "text";

/// Caller intent for one chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub content: String,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Absent means "start a new conversation".
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_true")]
    pub auto_save_history: bool,
}

fn default_true() -> bool {
    true
}

impl MessageRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            bot_id: None,
            user_id: None,
            conversation_id: None,
            stream: false,
            auto_save_history: true,
        }
    }

    pub fn with_bot_id(mut self, bot_id: impl Into<String>) -> Self {
        self.bot_id = Some(bot_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_auto_save_history(mut self, auto_save_history: bool) -> Self {
        self.auto_save_history = auto_save_history;
        self
    }
}

/// Wire payload for `POST /v3/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub bot_id: String,
    pub user_id: String,
    pub stream: bool,
    pub auto_save_history: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub additional_messages: Vec<AdditionalMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalMessage {
    pub role: String,
    pub content: String,
    pub content_type: String,
}

impl AdditionalMessage {
    pub fn user_text(content: impl Into<String>) -> Self {
        Self {
            role: USER_ROLE.to_owned(),
            content: content.into(),
            content_type: TEXT_CONTENT_TYPE.to_owned(),
        }
    }
}

/// Build the provider payload for one chat turn.
///
/// Context for multi-turn chats travels through `conversation_id`; the
/// payload never replays history and always carries exactly one user message.
pub fn build_chat_request(
    request: &MessageRequest,
    default_bot_id: Option<&str>,
) -> Result<ChatRequest, CozeApiError> {
    if request.content.trim().is_empty() {
        return Err(CozeApiError::invalid_request(
            "message content must not be empty",
        ));
    }

    let bot_id = non_blank(request.bot_id.as_deref())
        .or_else(|| non_blank(default_bot_id))
        .ok_or(CozeApiError::MissingBotId)?;
    let user_id = non_blank(request.user_id.as_deref()).unwrap_or(DEFAULT_USER_ID);

    Ok(ChatRequest {
        bot_id: bot_id.to_owned(),
        user_id: user_id.to_owned(),
        stream: request.stream,
        auto_save_history: request.auto_save_history,
        conversation_id: non_blank(request.conversation_id.as_deref()).map(ToOwned::to_owned),
        additional_messages: vec![AdditionalMessage::user_text(request.content.clone())],
    })
}

/// Wire payload for `POST /v3/chat/submit_tool_outputs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitToolOutputsRequest {
    pub chat_id: String,
    pub conversation_id: String,
    pub stream: bool,
    pub tool_outputs: Vec<ToolOutput>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
