use log::info;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::client::{validate_chat_ids, CallOptions, CozeApiClient};
use crate::error::{CozeApiError, ErrorKind};
use crate::payload::SubmitToolOutputsRequest;
use crate::session::{ChatSnapshot, Usage};
use crate::status::ChatStatus;

/// A function call the agent asked the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    /// Raw JSON argument string, as sent by the provider.
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

impl ToolOutput {
    pub fn new(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
        }
    }
}

/// Provider's view of the chat after a tool-output submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub success: bool,
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
    pub usage: Option<Usage>,
    /// Answer text, when the continued chat produced one.
    pub content: Option<String>,
    pub required_tool_calls: Vec<ToolCall>,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl SubmitOutcome {
    fn from_snapshot(snapshot: ChatSnapshot) -> Self {
        let status = snapshot.status();
        let session = snapshot.session;
        Self {
            success: true,
            chat_id: session.chat_id,
            conversation_id: session.conversation_id,
            bot_id: session.bot_id,
            status: Some(status),
            created_at: session.created_at,
            completed_at: session.completed_at,
            failed_at: session.failed_at,
            usage: snapshot.usage,
            content: snapshot.last_assistant_message,
            required_tool_calls: snapshot.required_tool_calls,
            error_message: session.last_error,
            error_kind: None,
        }
    }
}

/// Check a submission before any I/O.
pub fn validate_submission(request: &SubmitToolOutputsRequest) -> Result<(), CozeApiError> {
    validate_chat_ids(&request.chat_id, &request.conversation_id)?;
    if request.tool_outputs.is_empty() {
        return Err(CozeApiError::invalid_request(
            "tool_outputs must contain at least one output",
        ));
    }
    if let Some(position) = request
        .tool_outputs
        .iter()
        .position(|output| output.tool_call_id.trim().is_empty())
    {
        return Err(CozeApiError::invalid_request(format!(
            "tool_outputs[{position}].tool_call_id must not be empty"
        )));
    }
    Ok(())
}

/// Resumes a chat paused in `requires_action`.
pub struct ToolOutputSubmitter<'a> {
    client: &'a CozeApiClient,
}

impl<'a> ToolOutputSubmitter<'a> {
    pub fn new(client: &'a CozeApiClient) -> Self {
        Self { client }
    }

    /// Validate and submit. With `stream` set, the continued chat is drained
    /// and its answer merged; stream failures are reported in the outcome
    /// rather than as `Err`.
    pub async fn submit(
        &self,
        request: &SubmitToolOutputsRequest,
        options: &CallOptions,
    ) -> Result<SubmitOutcome, CozeApiError> {
        validate_submission(request)?;

        if !request.stream {
            let snapshot = self.client.submit_tool_outputs(request, options).await?;
            info!(
                "tool outputs accepted for chat {}; status {}",
                snapshot.session.chat_id,
                snapshot.status()
            );
            return Ok(SubmitOutcome::from_snapshot(snapshot));
        }

        let merged = self
            .client
            .submit_tool_outputs_streaming(request, options)
            .await?
            .merged()
            .await;

        let aborted = merged.error_kind.is_some_and(|kind| {
            kind.is_transport_abort()
                || (kind == ErrorKind::Provider && merged.status != Some(ChatStatus::Failed))
        });
        let (success, error_message, error_kind) = if aborted {
            (false, merged.error_message.clone(), merged.error_kind)
        } else if merged.status.is_none() {
            (
                false,
                Some("stream ended without a chat status".to_owned()),
                Some(ErrorKind::Protocol),
            )
        } else {
            let failure = (merged.status == Some(ChatStatus::Failed))
                .then(|| merged.error_message.clone())
                .flatten();
            (true, failure, None)
        };

        info!(
            "tool output stream for chat {} finished (success: {success})",
            request.chat_id
        );
        Ok(SubmitOutcome {
            success,
            chat_id: merged.chat_id.unwrap_or_else(|| request.chat_id.clone()),
            conversation_id: merged
                .conversation_id
                .unwrap_or_else(|| request.conversation_id.clone()),
            bot_id: None,
            status: merged.status,
            created_at: None,
            completed_at: None,
            failed_at: None,
            usage: merged.usage,
            content: merged.success.then_some(merged.content),
            required_tool_calls: merged.tool_calls,
            error_message,
            error_kind,
        })
    }
}
