use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::events::{StreamEvent, StreamEventType};
use crate::poll::REQUIRES_ACTION;
use crate::session::{Usage, ANSWER_MESSAGE_TYPE, FOLLOW_UP_MESSAGE_TYPE};
use crate::status::ChatStatus;
use crate::tools::ToolCall;

/// Returned when a stream carried neither content nor an error.
pub const NO_CONTENT_SENTINEL: &str = "No valid response content";
pub const RESPONSE_ERROR_PREFIX: &str = "Response error: ";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStatistics {
    pub total_events: usize,
    pub delta_events: usize,
    /// Length of the merged content in characters.
    pub content_length: usize,
    pub suggestions: Vec<String>,
}

/// One coherent answer reduced from a finished event sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub content: String,
    pub success: bool,
    pub conversation_id: Option<String>,
    pub chat_id: Option<String>,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Last chat status reported in the stream, if any.
    pub status: Option<ChatStatus>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub statistics: MergeStatistics,
}

fn excess_newlines_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| Regex::new(r"\n{3,}").expect("newline regex must compile"))
}

/// Trim, normalize line endings to LF, and cap blank-line runs at one.
///
/// Idempotent: cleaning a cleaned string returns it unchanged.
pub fn clean_content(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let collapsed = excess_newlines_regex().replace_all(&normalized, "\n\n");
    collapsed.trim().to_owned()
}

/// Reduce an event sequence to one answer.
///
/// Order is taken from `arrival_sequence` only; timestamps are ignored.
/// Deltas win; otherwise the latest completed answer. Any error event marks
/// the merge failed and is reported, even when content arrived first; with no
/// content the error text becomes the answer. A chat paused in
/// `requires_action` without text succeeds with a fixed notice. A stream cut
/// short by the transport (network, timeout, cancellation) is failed even when
/// it carried partial content.
pub fn merge_events(events: &[StreamEvent]) -> MergeResult {
    let mut ordered = events.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|event| event.arrival_sequence);

    let deltas = ordered
        .iter()
        .filter(|event| event.is_delta() && !event.content.is_empty())
        .collect::<Vec<_>>();
    let mut content = deltas
        .iter()
        .map(|event| event.content.as_str())
        .collect::<String>();

    if content.is_empty() {
        if let Some(completed) = ordered
            .iter()
            .rev()
            .find(|event| is_answer_completion(event) && !event.content.is_empty())
        {
            content = completed.content.clone();
        }
    }

    let first_error = ordered.iter().find(|event| event.is_error());
    let last_chat_update = ordered
        .iter()
        .rev()
        .find(|event| event.event_type == StreamEventType::ChatUpdate && event.status.is_some());
    let status = last_chat_update.and_then(|event| event.status);
    let failed_chat = last_chat_update.filter(|event| event.status == Some(ChatStatus::Failed));
    let transport_abort = ordered.iter().find(|event| {
        event
            .error_kind
            .is_some_and(|kind| kind.is_transport_abort())
    });

    let has_content = !content.is_empty();
    let (raw, mut success, mut error_message, mut error_kind) = if has_content {
        match first_error {
            Some(error) => (
                content,
                false,
                Some(error.content.clone()),
                Some(error.error_kind.unwrap_or(ErrorKind::Provider)),
            ),
            None => (content, true, None, None),
        }
    } else if let Some(error) = first_error {
        (
            format!("{RESPONSE_ERROR_PREFIX}{}", error.content),
            false,
            Some(error.content.clone()),
            Some(error.error_kind.unwrap_or(ErrorKind::Provider)),
        )
    } else if let Some(failed) = failed_chat {
        let reason = if failed.content.is_empty() {
            "chat failed".to_owned()
        } else {
            failed.content.clone()
        };
        (
            format!("{RESPONSE_ERROR_PREFIX}{reason}"),
            false,
            Some(reason),
            Some(ErrorKind::Provider),
        )
    } else if status == Some(ChatStatus::RequiresAction) {
        (REQUIRES_ACTION.to_owned(), true, None, None)
    } else {
        (
            NO_CONTENT_SENTINEL.to_owned(),
            false,
            Some("stream produced no content".to_owned()),
            Some(ErrorKind::Protocol),
        )
    };

    if let Some(abort) = transport_abort {
        success = false;
        error_message = Some(abort.content.clone());
        error_kind = abort.error_kind;
    }

    let merged = clean_content(&raw);
    let conversation_id = ordered
        .iter()
        .rev()
        .find_map(|event| event.conversation_id.clone());
    let chat_id = ordered.iter().rev().find_map(|event| event.chat_id.clone());
    let tool_calls = last_chat_update
        .filter(|event| event.status == Some(ChatStatus::RequiresAction))
        .map(|event| event.tool_calls.clone())
        .unwrap_or_default();
    let usage = ordered.iter().rev().find_map(|event| event.usage);
    let suggestions = ordered
        .iter()
        .filter(|event| {
            event.event_type == StreamEventType::Completed
                && event.message_type.as_deref() == Some(FOLLOW_UP_MESSAGE_TYPE)
                && !event.content.trim().is_empty()
        })
        .map(|event| event.content.trim().to_owned())
        .collect::<Vec<_>>();

    let statistics = MergeStatistics {
        total_events: events.len(),
        delta_events: deltas.len(),
        content_length: merged.chars().count(),
        suggestions,
    };
    debug!(
        "merged {} delta events into {} characters (success: {success})",
        statistics.delta_events, statistics.content_length
    );

    MergeResult {
        content: merged,
        success,
        conversation_id,
        chat_id,
        error_message,
        error_kind,
        status,
        tool_calls,
        usage,
        statistics,
    }
}

fn is_answer_completion(event: &StreamEvent) -> bool {
    event.event_type == StreamEventType::Completed
        && event
            .message_type
            .as_deref()
            .map_or(true, |kind| kind == ANSWER_MESSAGE_TYPE)
}
