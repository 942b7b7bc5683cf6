use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::client::{await_or_cancel, CallOptions};
use crate::config::PollPolicy;
use crate::error::CozeApiError;
use crate::session::{ChatSnapshot, Usage};
use crate::status::ChatStatus;
use crate::tools::ToolCall;

pub const COMPLETED_WITHOUT_CONTENT: &str = "Response completed without content";
pub const PROCESSING_FAILED: &str = "Agent processing failed";
pub const REQUIRES_ACTION: &str = "Agent is waiting for tool outputs";

/// Source of chat snapshots for the poller.
#[async_trait]
pub trait ChatRetriever: Send + Sync {
    async fn retrieve_chat(
        &self,
        chat_id: &str,
        conversation_id: &str,
        options: &CallOptions,
    ) -> Result<ChatSnapshot, CozeApiError>;
}

/// Terminal state reached by a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Answered { content: String },
    CompletedEmpty,
    Failed { reason: Option<String> },
    RequiresAction { tool_calls: Vec<ToolCall> },
}

impl CompletionOutcome {
    pub fn status(&self) -> ChatStatus {
        match self {
            Self::Answered { .. } | Self::CompletedEmpty => ChatStatus::Completed,
            Self::Failed { .. } => ChatStatus::Failed,
            Self::RequiresAction { .. } => ChatStatus::RequiresAction,
        }
    }

    /// Text shown to callers: the answer, or a fixed message for the other states.
    pub fn display_text(&self) -> String {
        match self {
            Self::Answered { content } => content.clone(),
            Self::CompletedEmpty => COMPLETED_WITHOUT_CONTENT.to_owned(),
            Self::Failed { reason: Some(reason) } => format!("{PROCESSING_FAILED}: {reason}"),
            Self::Failed { reason: None } => PROCESSING_FAILED.to_owned(),
            Self::RequiresAction { .. } => REQUIRES_ACTION.to_owned(),
        }
    }

    fn from_snapshot(snapshot: ChatSnapshot) -> Option<Self> {
        match snapshot.status() {
            ChatStatus::InProgress => None,
            ChatStatus::Completed => Some(match snapshot.last_assistant_message {
                Some(content) => Self::Answered { content },
                None => Self::CompletedEmpty,
            }),
            ChatStatus::Failed => Some(Self::Failed {
                reason: snapshot.session.last_error,
            }),
            ChatStatus::RequiresAction => Some(Self::RequiresAction {
                tool_calls: snapshot.required_tool_calls,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub outcome: CompletionOutcome,
    /// Retrievals made, including the terminal one.
    pub attempts: u32,
    pub usage: Option<Usage>,
}

/// Poll retrieval at a fixed interval until the chat leaves `in_progress`.
///
/// Transient retrieval errors consume an attempt and are retried. Validation
/// errors, unknown statuses, cancellation and the caller's deadline end the
/// poll immediately. Exhausting the budget yields [`CozeApiError::PollTimeout`].
pub async fn wait_for_completion<R>(
    retriever: &R,
    chat_id: &str,
    conversation_id: &str,
    policy: PollPolicy,
    options: &CallOptions,
) -> Result<Completion, CozeApiError>
where
    R: ChatRetriever + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        options.check()?;

        match retriever
            .retrieve_chat(chat_id, conversation_id, options)
            .await
        {
            Ok(snapshot) => {
                let usage = snapshot.usage;
                let status = snapshot.status();
                if let Some(outcome) = CompletionOutcome::from_snapshot(snapshot) {
                    info!("chat {chat_id} reached {status} after {attempt} polls");
                    return Ok(Completion {
                        outcome,
                        attempts: attempt,
                        usage,
                    });
                }
                debug!("chat {chat_id} still in progress (poll {attempt}/{max_attempts})");
            }
            Err(error) if is_fatal(&error) => return Err(error),
            Err(error) => {
                warn!("poll {attempt}/{max_attempts} for chat {chat_id} failed: {error}");
            }
        }

        if attempt < max_attempts {
            await_or_cancel(tokio::time::sleep(policy.interval), options).await?;
        }
    }

    warn!("chat {chat_id} still not terminal after {max_attempts} polls");
    Err(CozeApiError::PollTimeout {
        attempts: max_attempts,
    })
}

fn is_fatal(error: &CozeApiError) -> bool {
    error.is_validation()
        || matches!(
            error,
            CozeApiError::Cancelled
                | CozeApiError::DeadlineExceeded
                | CozeApiError::UnknownStatus(_)
        )
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    };
    use std::time::Duration;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::session::{ChatMessage, ChatSession, MessageRole};

    struct ScriptedRetriever {
        script: Mutex<VecDeque<Result<ChatSnapshot, CozeApiError>>>,
        calls: AtomicU32,
    }

    impl ScriptedRetriever {
        fn new(script: Vec<Result<ChatSnapshot, CozeApiError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatRetriever for ScriptedRetriever {
        async fn retrieve_chat(
            &self,
            _chat_id: &str,
            _conversation_id: &str,
            _options: &CallOptions,
        ) -> Result<ChatSnapshot, CozeApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(snapshot(ChatStatus::InProgress, None)))
        }
    }

    fn snapshot(status: ChatStatus, answer: Option<&str>) -> ChatSnapshot {
        let messages = answer
            .map(|content| {
                vec![ChatMessage {
                    id: Some("m1".to_owned()),
                    role: MessageRole::Assistant,
                    kind: "answer".to_owned(),
                    content: content.to_owned(),
                    content_type: Some("text".to_owned()),
                    created_at: None,
                    updated_at: None,
                }]
            })
            .unwrap_or_default();
        ChatSnapshot {
            session: ChatSession {
                chat_id: "chat-1".to_owned(),
                conversation_id: "conv-1".to_owned(),
                bot_id: None,
                status,
                created_at: None,
                completed_at: None,
                failed_at: None,
                last_error: None,
            },
            messages,
            last_assistant_message: answer.map(ToOwned::to_owned),
            required_tool_calls: Vec::new(),
            usage: None,
        }
    }

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), max_attempts)
    }

    #[tokio::test]
    async fn stops_on_first_completed_snapshot() {
        let mut script = (0..5)
            .map(|_| Ok(snapshot(ChatStatus::InProgress, None)))
            .collect::<Vec<_>>();
        script.push(Ok(snapshot(ChatStatus::Completed, Some("OK"))));
        let retriever = ScriptedRetriever::new(script);

        let completion = wait_for_completion(
            &retriever,
            "chat-1",
            "conv-1",
            fast_policy(30),
            &CallOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            completion.outcome,
            CompletionOutcome::Answered {
                content: "OK".to_owned()
            }
        );
        assert_eq!(completion.attempts, 6);
        assert_eq!(retriever.calls(), 6);
    }

    #[tokio::test]
    async fn exhausting_the_budget_is_a_poll_timeout() {
        let retriever = ScriptedRetriever::new(Vec::new());

        let error = wait_for_completion(
            &retriever,
            "chat-1",
            "conv-1",
            fast_policy(4),
            &CallOptions::default(),
        )
        .await
        .unwrap_err();

        assert_matches!(error, CozeApiError::PollTimeout { attempts: 4 });
        assert_eq!(retriever.calls(), 4);
    }

    #[tokio::test]
    async fn transient_errors_consume_attempts_and_are_retried() {
        let retriever = ScriptedRetriever::new(vec![
            Err(CozeApiError::MissingField("data")),
            Ok(snapshot(ChatStatus::Completed, None)),
        ]);

        let completion = wait_for_completion(
            &retriever,
            "chat-1",
            "conv-1",
            fast_policy(3),
            &CallOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(completion.outcome, CompletionOutcome::CompletedEmpty);
        assert_eq!(completion.attempts, 2);
    }

    #[tokio::test]
    async fn unknown_status_stops_polling() {
        let retriever = ScriptedRetriever::new(vec![Err(CozeApiError::UnknownStatus(
            "queued".to_owned(),
        ))]);

        let error = wait_for_completion(
            &retriever,
            "chat-1",
            "conv-1",
            fast_policy(5),
            &CallOptions::default(),
        )
        .await
        .unwrap_err();

        assert_matches!(error, CozeApiError::UnknownStatus(status) if status == "queued");
        assert_eq!(retriever.calls(), 1);
    }

    #[tokio::test]
    async fn failed_chat_carries_reason() {
        let mut failed = snapshot(ChatStatus::Failed, None);
        failed.session.last_error = Some("quota exceeded".to_owned());
        let retriever = ScriptedRetriever::new(vec![Ok(failed)]);

        let completion = wait_for_completion(
            &retriever,
            "chat-1",
            "conv-1",
            fast_policy(5),
            &CallOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            completion.outcome.display_text(),
            "Agent processing failed: quota exceeded"
        );
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_retrieval() {
        let retriever = ScriptedRetriever::new(Vec::new());
        let signal = Arc::new(AtomicBool::new(true));
        let options = CallOptions::new().with_cancellation(signal);

        let error = wait_for_completion(&retriever, "chat-1", "conv-1", fast_policy(5), &options)
            .await
            .unwrap_err();

        assert_matches!(error, CozeApiError::Cancelled);
        assert_eq!(retriever.calls(), 0);
    }
}
