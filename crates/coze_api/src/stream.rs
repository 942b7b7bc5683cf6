use std::collections::VecDeque;

use futures_util::stream::{self, Stream};
use log::{debug, warn};
use reqwest::Response;

use crate::client::{await_or_cancel, CallOptions};
use crate::error::CozeApiError;
use crate::events::StreamEvent;
use crate::merge::{merge_events, MergeResult};
use crate::sse::StreamDecoder;

/// Lazy, forward-only sequence of decoded events for one streaming call.
///
/// Events are produced as bytes arrive. Transport failures mid-stream and
/// cancellation surface as one final error event. The connection is dropped
/// as soon as the `[DONE]` sentinel is seen.
#[derive(Debug)]
pub struct EventStream {
    response: Option<Response>,
    decoder: StreamDecoder,
    pending: VecDeque<StreamEvent>,
    options: CallOptions,
}

impl EventStream {
    pub(crate) fn new(response: Response, options: CallOptions) -> Self {
        Self {
            response: Some(response),
            decoder: StreamDecoder::default(),
            pending: VecDeque::new(),
            options,
        }
    }

    /// A stream that yields a single error event and ends.
    pub(crate) fn failed(error: CozeApiError) -> Self {
        warn!("stream failed before decoding: {error}");
        let mut decoder = StreamDecoder::default();
        let event = decoder.fail(error.kind(), error.to_string());
        Self {
            response: None,
            decoder,
            pending: VecDeque::from([event]),
            options: CallOptions::default(),
        }
    }

    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.decoder.is_finished() {
                self.response = None;
                return None;
            }

            let response = self.response.as_mut()?;
            match await_or_cancel(response.chunk(), &self.options).await {
                Ok(Ok(Some(chunk))) => {
                    let events = self.decoder.feed(&chunk);
                    self.pending.extend(events);
                }
                Ok(Ok(None)) => {
                    debug!("stream body ended");
                    self.response = None;
                    let events = self.decoder.finish();
                    self.pending.extend(events);
                }
                Ok(Err(error)) => return Some(self.abort(CozeApiError::from(error))),
                Err(error) => return Some(self.abort(error)),
            }
        }
    }

    /// Drain the remaining events.
    pub async fn collect(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    /// Drain the remaining events and reduce them to one answer.
    pub async fn merged(self) -> MergeResult {
        let events = self.collect().await;
        merge_events(&events)
    }

    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send {
        stream::unfold(self, |mut events| async move {
            events.next_event().await.map(|event| (event, events))
        })
    }

    fn abort(&mut self, error: CozeApiError) -> StreamEvent {
        warn!("stream aborted: {error}");
        self.response = None;
        self.decoder.fail(error.kind(), error.to_string())
    }
}
