use serde::{Deserialize, Serialize};

/// One finished question/answer exchange, as handed to a [`crate::HistorySink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub conversation_id: Option<String>,
    pub chat_id: Option<String>,
    pub user_id: String,
    pub bot_id: Option<String>,
    pub prompt: String,
    pub answer: String,
    #[serde(default)]
    pub tokens_used: u64,
}

/// A persisted turn: one JSON line in the history file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryRecord {
    pub id: String,
    pub ts: String,
    pub conversation_id: Option<String>,
    pub chat_id: Option<String>,
    pub user_id: String,
    pub bot_id: Option<String>,
    pub prompt: String,
    pub answer: String,
    #[serde(default)]
    pub tokens_used: u64,
}

impl HistoryRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, ts: impl Into<String>, turn: ConversationTurn) -> Self {
        Self {
            id: id.into(),
            ts: ts.into(),
            conversation_id: turn.conversation_id,
            chat_id: turn.chat_id,
            user_id: turn.user_id,
            bot_id: turn.bot_id,
            prompt: turn.prompt,
            answer: turn.answer,
            tokens_used: turn.tokens_used,
        }
    }
}
