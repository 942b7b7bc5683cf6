use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::CozeApiConfig;
use crate::error::{error_from_status, CozeApiError};
use crate::headers::build_headers;
use crate::payload::{build_chat_request, ChatRequest, MessageRequest, SubmitToolOutputsRequest};
use crate::poll::{wait_for_completion, ChatRetriever, CompletionOutcome};
use crate::retry::{backoff_delay, is_retryable_status};
use crate::session::{last_assistant_answer, non_blank, ChatMessage, ChatSnapshot, Usage};
use crate::stream::EventStream;
use crate::url::{
    endpoint_url, is_http_url, CHAT_PATH, RETRIEVE_PATH, SUBMIT_TOOL_OUTPUTS_PATH,
};
use crate::wire::{Envelope, WireChat};

/// Optional cancellation signal shared across request, stream and poll loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Per-call cancellation and deadline.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub cancellation: Option<CancellationSignal>,
    pub deadline: Option<Instant>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.load(Ordering::Acquire))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub(crate) fn check(&self) -> Result<(), CozeApiError> {
        if self.is_cancelled() {
            return Err(CozeApiError::Cancelled);
        }
        if self.is_expired() {
            return Err(CozeApiError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Result of a buffered send, after the poller if the provider had no answer yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedChat {
    pub chat_id: String,
    pub conversation_id: String,
    pub bot_id: Option<String>,
    pub outcome: CompletionOutcome,
    pub usage: Option<Usage>,
    /// Number of retrievals made; 0 when the initial response carried the answer.
    pub poll_attempts: u32,
}

/// A chat the provider accepted, before any polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedChat {
    pub chat_id: String,
    pub conversation_id: String,
    pub bot_id: Option<String>,
    /// Answer embedded in the create response, if the provider finished already.
    pub answer: Option<String>,
    pub usage: Option<Usage>,
}

/// HTTP session client for the provider's chat endpoints.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct CozeApiClient {
    http: Client,
    config: CozeApiConfig,
}

impl CozeApiClient {
    pub fn new(config: CozeApiConfig) -> Result<Self, CozeApiError> {
        if config.api_key.trim().is_empty() {
            return Err(CozeApiError::MissingApiKey);
        }
        if !is_http_url(&config.base_url) {
            return Err(CozeApiError::InvalidBaseUrl(config.base_url.clone()));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().map_err(CozeApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &CozeApiConfig {
        &self.config
    }

    pub fn endpoint(&self, path: &str) -> String {
        endpoint_url(&self.config.base_url, path)
    }

    pub fn build_headers(&self, streaming: bool) -> Result<HeaderMap, CozeApiError> {
        let headers = build_headers(&self.config, streaming)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| CozeApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    CozeApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    /// Resolve a caller intent into the wire payload, forcing the transport mode.
    pub fn build_chat_request(
        &self,
        request: &MessageRequest,
        stream: bool,
    ) -> Result<ChatRequest, CozeApiError> {
        let mut payload = build_chat_request(request, self.config.default_bot_id())?;
        payload.stream = stream;
        Ok(payload)
    }

    fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        streaming: bool,
    ) -> Result<RequestBuilder, CozeApiError> {
        let mut request = self
            .http
            .post(self.endpoint(path))
            .headers(self.build_headers(streaming)?)
            .json(body);
        // Streaming bodies stay open as long as the provider talks; they are
        // bounded by the caller's deadline instead.
        if !streaming {
            if let Some(timeout) = self.config.timeout {
                request = request.timeout(timeout);
            }
        }
        Ok(request)
    }

    async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        options: &CallOptions,
    ) -> Result<T, CozeApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.post(path, body, false)?;
        let response = await_or_cancel(request.send(), options).await??;
        let status = response.status();
        let text = await_or_cancel(response.text(), options).await??;
        if !status.is_success() {
            warn!("POST {path} failed with HTTP {status}");
            return Err(error_from_status(status, &text));
        }
        debug!("POST {path} succeeded ({} bytes)", text.len());

        let envelope = serde_json::from_str::<Envelope<T>>(&text)?;
        envelope.into_data()
    }

    async fn open_stream<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: &CallOptions,
    ) -> Result<EventStream, CozeApiError> {
        let request = self.post(path, body, true)?;
        let response = match await_or_cancel(request.send(), options).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => return Ok(EventStream::failed(CozeApiError::from(error))),
            Err(error) => return Ok(EventStream::failed(error)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = match await_or_cancel(response.text(), options).await {
                Ok(Ok(body)) => body,
                Ok(Err(error)) => return Ok(EventStream::failed(CozeApiError::from(error))),
                Err(error) => return Ok(EventStream::failed(error)),
            };
            warn!("streaming POST {path} failed with HTTP {status}");
            return Ok(EventStream::failed(error_from_status(status, &body)));
        }

        Ok(EventStream::new(response, options.clone()))
    }

    /// Send one message and wait for the answer.
    ///
    /// Uses the answer embedded in the initial response when present;
    /// otherwise polls retrieval under the configured [`crate::PollPolicy`].
    pub async fn send_buffered(
        &self,
        request: &MessageRequest,
        options: &CallOptions,
    ) -> Result<BufferedChat, CozeApiError> {
        let started = self.start_buffered(request, options).await?;
        self.finish_buffered(started, options).await
    }

    /// First half of [`Self::send_buffered`]: create the chat and keep any
    /// answer the provider already embedded.
    pub async fn start_buffered(
        &self,
        request: &MessageRequest,
        options: &CallOptions,
    ) -> Result<StartedChat, CozeApiError> {
        let payload = self.build_chat_request(request, false)?;
        info!(
            "sending buffered chat message ({} chars) to bot {}",
            request.content.chars().count(),
            payload.bot_id
        );

        let chat = self
            .post_json::<_, WireChat>(CHAT_PATH, &payload, options)
            .await?;
        let chat_id = non_blank(chat.id.clone()).ok_or(CozeApiError::MissingField("id"))?;
        let conversation_id = non_blank(chat.conversation_id.clone())
            .ok_or(CozeApiError::MissingField("conversation_id"))?;

        let messages = chat
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(ChatMessage::from_wire)
            .collect::<Vec<_>>();
        let answer = last_assistant_answer(&messages).map(|message| message.content.clone());

        Ok(StartedChat {
            chat_id,
            conversation_id,
            bot_id: chat.bot_id,
            answer,
            usage: chat.usage,
        })
    }

    /// Second half of [`Self::send_buffered`]: return the embedded answer or
    /// poll until the chat reaches a terminal status.
    pub async fn finish_buffered(
        &self,
        started: StartedChat,
        options: &CallOptions,
    ) -> Result<BufferedChat, CozeApiError> {
        let StartedChat {
            chat_id,
            conversation_id,
            bot_id,
            answer,
            usage,
        } = started;

        if let Some(content) = answer {
            return Ok(BufferedChat {
                chat_id,
                conversation_id,
                bot_id,
                outcome: CompletionOutcome::Answered { content },
                usage,
                poll_attempts: 0,
            });
        }

        info!("initial response carried no answer; polling chat {chat_id}");
        let completion = wait_for_completion(
            self,
            &chat_id,
            &conversation_id,
            self.config.poll_policy,
            options,
        )
        .await?;

        Ok(BufferedChat {
            chat_id,
            conversation_id,
            bot_id,
            outcome: completion.outcome,
            usage: completion.usage.or(usage),
            poll_attempts: completion.attempts,
        })
    }

    /// Send one message and return its lazily decoded event sequence.
    ///
    /// HTTP failures before decoding surface as a single error event; only
    /// validation errors are returned as `Err`.
    pub async fn send_streaming(
        &self,
        request: &MessageRequest,
        options: &CallOptions,
    ) -> Result<EventStream, CozeApiError> {
        let payload = self.build_chat_request(request, true)?;
        info!(
            "opening chat stream ({} chars) to bot {}",
            request.content.chars().count(),
            payload.bot_id
        );
        self.open_stream(CHAT_PATH, &payload, options).await
    }

    /// Retrieve status and messages of one chat, retrying retryable provider
    /// statuses up to the configured budget.
    pub async fn retrieve(
        &self,
        chat_id: &str,
        conversation_id: &str,
        options: &CallOptions,
    ) -> Result<ChatSnapshot, CozeApiError> {
        self.retrieve_with_budget(chat_id, conversation_id, self.config.max_retries, options)
            .await
    }

    async fn retrieve_with_budget(
        &self,
        chat_id: &str,
        conversation_id: &str,
        max_retries: u32,
        options: &CallOptions,
    ) -> Result<ChatSnapshot, CozeApiError> {
        validate_chat_ids(chat_id, conversation_id)?;
        let headers = self.build_headers(false)?;

        let mut attempt = 0;
        loop {
            options.check()?;
            debug!("retrieving chat {chat_id} (attempt {})", attempt + 1);

            let mut request = self
                .http
                .get(self.endpoint(RETRIEVE_PATH))
                .headers(headers.clone())
                .query(&[("chat_id", chat_id), ("conversation_id", conversation_id)]);
            if let Some(timeout) = self.config.timeout {
                request = request.timeout(timeout);
            }

            let response = await_or_cancel(request.send(), options).await??;
            let status = response.status();
            let text = await_or_cancel(response.text(), options).await??;

            if status.is_success() {
                let envelope = serde_json::from_str::<Envelope<WireChat>>(&text)?;
                return ChatSnapshot::from_wire(envelope.into_data()?);
            }

            if attempt < max_retries && is_retryable_status(status, &text) {
                warn!("retrieval of chat {chat_id} got HTTP {status}; retrying");
                await_or_cancel(tokio::time::sleep(backoff_delay(attempt)), options).await?;
                attempt += 1;
                continue;
            }

            return Err(error_from_status(status, &text));
        }
    }

    /// Submit tool outputs and return the provider's updated chat (buffered).
    pub async fn submit_tool_outputs(
        &self,
        request: &SubmitToolOutputsRequest,
        options: &CallOptions,
    ) -> Result<ChatSnapshot, CozeApiError> {
        let mut payload = request.clone();
        payload.stream = false;
        info!(
            "submitting {} tool outputs for chat {}",
            payload.tool_outputs.len(),
            payload.chat_id
        );

        let mut chat = self
            .post_json::<_, WireChat>(SUBMIT_TOOL_OUTPUTS_PATH, &payload, options)
            .await?;
        if non_blank(chat.id.clone()).is_none() {
            chat.id = Some(payload.chat_id.clone());
        }
        if non_blank(chat.conversation_id.clone()).is_none() {
            chat.conversation_id = Some(payload.conversation_id.clone());
        }
        ChatSnapshot::from_wire(chat)
    }

    /// Submit tool outputs and stream the continued chat.
    pub async fn submit_tool_outputs_streaming(
        &self,
        request: &SubmitToolOutputsRequest,
        options: &CallOptions,
    ) -> Result<EventStream, CozeApiError> {
        let mut payload = request.clone();
        payload.stream = true;
        info!(
            "submitting {} tool outputs for chat {} (streaming)",
            payload.tool_outputs.len(),
            payload.chat_id
        );
        self.open_stream(SUBMIT_TOOL_OUTPUTS_PATH, &payload, options)
            .await
    }
}

#[async_trait]
impl ChatRetriever for CozeApiClient {
    /// Single attempt: inside the poller the poll budget is the retry budget.
    async fn retrieve_chat(
        &self,
        chat_id: &str,
        conversation_id: &str,
        options: &CallOptions,
    ) -> Result<ChatSnapshot, CozeApiError> {
        self.retrieve_with_budget(chat_id, conversation_id, 0, options)
            .await
    }
}

pub(crate) fn validate_chat_ids(chat_id: &str, conversation_id: &str) -> Result<(), CozeApiError> {
    if chat_id.trim().is_empty() {
        return Err(CozeApiError::invalid_request("chat_id must not be empty"));
    }
    if conversation_id.trim().is_empty() {
        return Err(CozeApiError::invalid_request(
            "conversation_id must not be empty",
        ));
    }
    Ok(())
}

/// Race `future` against the caller's cancellation signal and deadline.
///
/// Dropping the future on abort drops the in-flight request and releases its
/// connection.
pub(crate) async fn await_or_cancel<F>(
    future: F,
    options: &CallOptions,
) -> Result<F::Output, CozeApiError>
where
    F: Future,
{
    if options.cancellation.is_none() && options.deadline.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        options.check()?;

        let mut wait = CANCEL_POLL_INTERVAL;
        if let Some(deadline) = options.deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            wait = if options.cancellation.is_some() {
                wait.min(remaining)
            } else {
                remaining
            };
        }

        if let Ok(output) = tokio::time::timeout(wait, &mut future).await {
            if options.is_cancelled() {
                return Err(CozeApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_blank_api_key_before_any_io() {
        let error = CozeApiClient::new(CozeApiConfig::new("  ")).unwrap_err();
        assert!(matches!(error, CozeApiError::MissingApiKey));
    }

    #[test]
    fn new_rejects_non_http_base_url() {
        let config = CozeApiConfig::new("pat").with_base_url("ftp://example.com");
        assert!(matches!(
            CozeApiClient::new(config),
            Err(CozeApiError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn build_chat_request_forces_transport_mode() {
        let client =
            CozeApiClient::new(CozeApiConfig::new("pat").with_default_bot_id("bot")).unwrap();
        let request = MessageRequest::new("hi").with_stream(true);

        assert!(!client.build_chat_request(&request, false).unwrap().stream);
        assert!(client.build_chat_request(&request, true).unwrap().stream);
    }

    #[test]
    fn headers_carry_bearer_and_accept_mode() {
        let client = CozeApiClient::new(CozeApiConfig::new("pat-123")).unwrap();
        let buffered = client.build_headers(false).unwrap();
        let streaming = client.build_headers(true).unwrap();

        assert_eq!(buffered["authorization"], "Bearer pat-123");
        assert_eq!(buffered["accept"], "application/json");
        assert_eq!(streaming["accept"], "text/event-stream");
    }

    #[tokio::test]
    async fn cancelled_options_abort_before_awaiting() {
        let signal: CancellationSignal = Arc::new(AtomicBool::new(true));
        let options = CallOptions::new().with_cancellation(signal);
        let result = await_or_cancel(std::future::pending::<()>(), &options).await;
        assert!(matches!(result, Err(CozeApiError::Cancelled)));
    }

    #[tokio::test]
    async fn expired_deadline_yields_timeout() {
        let options = CallOptions::new().with_timeout(Duration::from_millis(20));
        let result = await_or_cancel(std::future::pending::<()>(), &options).await;
        assert!(matches!(result, Err(CozeApiError::DeadlineExceeded)));
    }
}
