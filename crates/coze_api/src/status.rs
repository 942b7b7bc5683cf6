use serde::{Deserialize, Serialize};

use crate::error::CozeApiError;

/// Chat status as reported by the provider.
///
/// The provider owns this state; the client only classifies what it reports.
/// `InProgress` is the only non-terminal state. A `RequiresAction` chat goes
/// back to `InProgress` after tool outputs are submitted, which is only
/// observable through a later retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    InProgress,
    Completed,
    Failed,
    RequiresAction,
}

impl ChatStatus {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.trim() {
            // The provider reports `created` before work starts.
            "created" | "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "requires_action" => Self::RequiresAction,
            _ => return None,
        })
    }

    /// Classify a raw status string. Unknown values are a protocol error,
    /// never coerced into one of the known states.
    pub fn classify(value: &str) -> Result<Self, CozeApiError> {
        Self::parse(value).ok_or_else(|| CozeApiError::UnknownStatus(value.to_owned()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RequiresAction => "requires_action",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl std::fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
