//! Collaborator-facing call surface over [`CozeApiClient`].
//!
//! Every operation returns a result record; only validation errors (bad
//! arguments or configuration, raised before any I/O) come back as `Err`.
//! Finished answers are handed to the optional [`HistorySink`] on a blocking
//! task and never influence the returned record.

use std::sync::Arc;

use chat_history::{ConversationTurn, HistorySink, JsonlHistoryStore};
use coze_api::payload::DEFAULT_USER_ID;
use coze_api::{
    CallOptions, ChatStatus, CompletionOutcome, CozeApiClient, CozeApiError, EventStream, MessageRequest,
    StreamEvent, SubmitToolOutputsRequest, ToolOutputSubmitter,
};
use tracing::{info, warn};

use crate::config::EnvConfig;
use crate::error::AgentError;
use crate::records::{ChatResponse, RetrieveChatResult, SubmitToolOutputsResult};

#[derive(Clone)]
pub struct AgentService {
    client: CozeApiClient,
    history: Option<Arc<dyn HistorySink>>,
}

impl AgentService {
    pub fn new(client: CozeApiClient) -> Self {
        Self {
            client,
            history: None,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    /// Build the client from environment configuration and open the history
    /// file when `COZE_HISTORY_PATH` is set.
    pub fn from_config(config: &EnvConfig) -> Result<Self, AgentError> {
        let service = Self::new(CozeApiClient::new(config.api_config())?);
        match &config.history_path {
            Some(path) => {
                let store = JsonlHistoryStore::open(path)?;
                info!("saving conversation history to {}", store.path().display());
                Ok(service.with_history(Arc::new(store)))
            }
            None => Ok(service),
        }
    }

    pub fn client(&self) -> &CozeApiClient {
        &self.client
    }

    /// Buffered send: the embedded answer when present, otherwise the polled
    /// completion.
    pub async fn send_message(
        &self,
        request: &MessageRequest,
        options: &CallOptions,
    ) -> Result<ChatResponse, CozeApiError> {
        self.send_buffered(request, options, request.auto_save_history)
            .await
    }

    /// Streaming send, drained into the ordered event list.
    pub async fn send_stream_message(
        &self,
        request: &MessageRequest,
        options: &CallOptions,
    ) -> Result<Vec<StreamEvent>, CozeApiError> {
        Ok(self.open_stream(request, options).await?.collect().await)
    }

    /// Streaming send returning the lazy, one-shot event sequence.
    pub async fn open_stream(
        &self,
        request: &MessageRequest,
        options: &CallOptions,
    ) -> Result<EventStream, CozeApiError> {
        self.client.send_streaming(request, options).await
    }

    /// Streaming send merged into one answer.
    pub async fn send_stream_merged(
        &self,
        request: &MessageRequest,
        options: &CallOptions,
    ) -> Result<ChatResponse, CozeApiError> {
        let merged = self.open_stream(request, options).await?.merged().await;
        let response = ChatResponse::from(merged);
        info!(
            "merged stream for conversation {:?}: success {}, {} chars",
            response.conversation_id,
            response.success,
            response.content.chars().count()
        );
        let paused = response.status == Some(ChatStatus::RequiresAction);
        if response.success && !paused && request.auto_save_history {
            self.save_turn(request, &response);
        }
        Ok(response)
    }

    /// Buffered send with the default agent, for callers that only have text.
    pub async fn quick_send(
        &self,
        content: &str,
        user_id: Option<&str>,
        options: &CallOptions,
    ) -> Result<ChatResponse, CozeApiError> {
        let request = MessageRequest::new(content).with_user_id(user_id.unwrap_or(DEFAULT_USER_ID));
        self.send_message(&request, options).await
    }

    pub async fn retrieve_chat(
        &self,
        chat_id: &str,
        conversation_id: &str,
        options: &CallOptions,
    ) -> Result<RetrieveChatResult, CozeApiError> {
        match self.client.retrieve(chat_id, conversation_id, options).await {
            Ok(snapshot) => Ok(RetrieveChatResult::from(snapshot)),
            Err(error) if error.is_validation() => Err(error),
            Err(error) => {
                warn!("retrieving chat {chat_id} failed: {error}");
                Ok(RetrieveChatResult::failure(chat_id, conversation_id, &error))
            }
        }
    }

    pub async fn submit_tool_outputs(
        &self,
        request: &SubmitToolOutputsRequest,
        options: &CallOptions,
    ) -> Result<SubmitToolOutputsResult, CozeApiError> {
        match ToolOutputSubmitter::new(&self.client)
            .submit(request, options)
            .await
        {
            Ok(outcome) => Ok(SubmitToolOutputsResult::from(outcome)),
            Err(error) if error.is_validation() => Err(error),
            Err(error) => {
                warn!(
                    "submitting tool outputs for chat {} failed: {error}",
                    request.chat_id
                );
                Ok(SubmitToolOutputsResult::failure(
                    &request.chat_id,
                    &request.conversation_id,
                    &error,
                ))
            }
        }
    }

    pub(crate) async fn send_buffered(
        &self,
        request: &MessageRequest,
        options: &CallOptions,
        record_history: bool,
    ) -> Result<ChatResponse, CozeApiError> {
        let started = match self.client.start_buffered(request, options).await {
            Ok(started) => started,
            Err(error) if error.is_validation() => return Err(error),
            Err(error) => {
                warn!("buffered send failed: {error}");
                return Ok(ChatResponse::failure(&error));
            }
        };

        let pending = started.clone();
        let chat = match self.client.finish_buffered(started, options).await {
            Ok(chat) => chat,
            Err(error) if error.is_validation() => return Err(error),
            Err(error) => {
                warn!("chat {} did not finish: {error}", pending.chat_id);
                return Ok(ChatResponse::failure_for_chat(&pending, &error));
            }
        };

        let answered = matches!(chat.outcome, CompletionOutcome::Answered { .. });
        info!(
            "chat {} finished as {} after {} polls",
            chat.chat_id,
            chat.outcome.status(),
            chat.poll_attempts
        );
        let response = ChatResponse::from(chat);
        if answered && record_history {
            self.save_turn(request, &response);
        }
        Ok(response)
    }

    fn save_turn(&self, request: &MessageRequest, response: &ChatResponse) {
        let Some(history) = self.history.clone() else {
            return;
        };

        let turn = ConversationTurn {
            conversation_id: response.conversation_id.clone(),
            chat_id: response.chat_id.clone(),
            user_id: request
                .user_id
                .clone()
                .filter(|user_id| !user_id.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_ID.to_owned()),
            bot_id: request
                .bot_id
                .clone()
                .or_else(|| self.client.config().default_bot_id().map(ToOwned::to_owned)),
            prompt: request.content.clone(),
            answer: response.content.clone(),
            tokens_used: response.tokens_used,
        };

        // Detached: the caller's result is already final.
        drop(tokio::task::spawn_blocking(move || {
            if let Err(error) = history.record(turn) {
                warn!("failed to save conversation turn: {error}");
            }
        }));
    }
}
