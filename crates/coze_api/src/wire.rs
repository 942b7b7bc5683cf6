//! Response shapes as the provider sends them. Every field is optional here;
//! required-field checks happen when converting into the public model.

use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::CozeApiError;
use crate::session::Usage;
use crate::tools::ToolCall;

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub code: i64,
    pub msg: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap `data`, turning a non-zero envelope code into a provider error.
    pub fn into_data(self) -> Result<T, CozeApiError> {
        if self.code != 0 {
            let message = self
                .msg
                .map(|msg| msg.trim().to_owned())
                .filter(|msg| !msg.is_empty())
                .unwrap_or_else(|| format!("provider returned code {}", self.code));
            return Err(CozeApiError::Provider {
                status: None,
                code: Some(self.code),
                message,
            });
        }
        self.data.ok_or(CozeApiError::MissingField("data"))
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireChat {
    pub id: Option<String>,
    pub conversation_id: Option<String>,
    pub bot_id: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<WireTimestamp>,
    pub completed_at: Option<WireTimestamp>,
    pub failed_at: Option<WireTimestamp>,
    pub last_error: Option<WireLastError>,
    pub required_action: Option<WireRequiredAction>,
    pub usage: Option<Usage>,
    pub messages: Option<Vec<WireMessage>>,
}

impl WireChat {
    pub fn last_error_message(&self) -> Option<String> {
        self.last_error
            .as_ref()
            .and_then(|error| error.msg.as_deref())
            .map(str::trim)
            .filter(|msg| !msg.is_empty())
            .map(ToOwned::to_owned)
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.required_action
            .as_ref()
            .and_then(|action| action.submit_tool_outputs.as_ref())
            .map(|outputs| {
                outputs
                    .tool_calls
                    .iter()
                    .map(WireToolCall::to_tool_call)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireTimestamp {
    Unix(i64),
    Text(String),
}

impl WireTimestamp {
    /// Zero and blank values mean "not set".
    pub fn to_datetime(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Unix(0) => None,
            Self::Unix(seconds) => OffsetDateTime::from_unix_timestamp(*seconds).ok(),
            Self::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                OffsetDateTime::parse(trimmed, &Rfc3339).ok().or_else(|| {
                    trimmed
                        .parse::<i64>()
                        .ok()
                        .filter(|seconds| *seconds > 0)
                        .and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok())
                })
            }
        }
    }
}

pub(crate) fn timestamp(value: &Option<WireTimestamp>) -> Option<OffsetDateTime> {
    value.as_ref().and_then(WireTimestamp::to_datetime)
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireLastError {
    pub msg: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRequiredAction {
    pub submit_tool_outputs: Option<WireSubmitToolOutputs>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireSubmitToolOutputs {
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub function: Option<WireFunction>,
}

impl WireToolCall {
    fn to_tool_call(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            kind: self.kind.clone(),
            name: self.function.as_ref().and_then(|f| f.name.clone()),
            arguments: self.function.as_ref().and_then(|f| f.arguments.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFunction {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMessage {
    pub id: Option<String>,
    pub role: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub content: Option<String>,
    pub content_type: Option<String>,
    pub created_at: Option<WireTimestamp>,
    pub updated_at: Option<WireTimestamp>,
}
