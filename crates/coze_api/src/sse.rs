use log::{debug, warn};
use serde_json::Value;

use crate::error::ErrorKind;
use crate::events::{
    StreamEvent, StreamEventType, CHAT_EVENT_PREFIX, DONE_EVENT, DONE_SENTINEL, ERROR_EVENT,
    MESSAGE_COMPLETED_EVENT, MESSAGE_DELTA_EVENT,
};
use crate::session::non_blank;
use crate::status::ChatStatus;
use crate::wire::WireChat;

/// Incremental decoder for the provider's `event:` / `data:` record stream.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode intact. After the `[DONE]`
/// sentinel (or any synthetic error) the decoder is finished and ignores
/// further input.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    pending_event: Option<String>,
    last_sequence: u64,
    accumulated: String,
    conversation_id: Option<String>,
    chat_id: Option<String>,
    finished: bool,
}

impl StreamDecoder {
    /// Feed arbitrary bytes and drain every event completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.buffer.extend_from_slice(bytes);
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw = self.buffer.drain(..=newline).collect::<Vec<u8>>();
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.decode_line(line.trim_end_matches(&['\r', '\n'][..])) {
                events.push(event);
            }
            if self.finished {
                self.buffer.clear();
                break;
            }
        }

        events
    }

    /// Flush a final record that was not newline-terminated (end of body).
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        if self.finished || rest.is_empty() {
            return Vec::new();
        }

        let line = String::from_utf8_lossy(&rest).into_owned();
        self.decode_line(line.trim_end_matches('\r'))
            .into_iter()
            .collect()
    }

    /// Emit a synthetic error event and stop decoding.
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) -> StreamEvent {
        self.finished = true;
        self.buffer.clear();
        let sequence = self.next_sequence();
        StreamEvent::error(kind, message, sequence)
            .with_ids(self.conversation_id.clone(), self.chat_id.clone())
    }

    /// Decode a complete body in one shot.
    pub fn decode_all(input: &[u8]) -> Vec<StreamEvent> {
        let mut decoder = Self::default();
        let mut events = decoder.feed(input);
        events.extend(decoder.finish());
        events
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Concatenated delta content received so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    fn next_sequence(&mut self) -> u64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    fn decode_line(&mut self, line: &str) -> Option<StreamEvent> {
        if let Some(name) = line.strip_prefix("event:") {
            self.pending_event = Some(name.trim().to_owned());
            return None;
        }

        let data = line.strip_prefix("data:")?.trim();
        let event_type = self.pending_event.take();
        if is_done_sentinel(data) || event_type.as_deref() == Some(DONE_EVENT) {
            return Some(self.done_event());
        }

        let Some(event_type) = event_type else {
            debug!("skipping data record without a preceding event line");
            return None;
        };

        let value = match serde_json::from_str::<Value>(data) {
            Ok(value) => value,
            Err(error) => {
                warn!("skipping malformed '{event_type}' record: {error}");
                return None;
            }
        };

        self.map_record(&event_type, value)
    }

    fn map_record(&mut self, event_type: &str, value: Value) -> Option<StreamEvent> {
        match event_type {
            MESSAGE_DELTA_EVENT => {
                let content = string_field(&value, "content").unwrap_or_default();
                self.accumulated.push_str(&content);
                Some(self.message_event(StreamEventType::Delta, content, &value))
            }
            MESSAGE_COMPLETED_EVENT => {
                let content = string_field(&value, "content").unwrap_or_default();
                Some(self.message_event(StreamEventType::Completed, content, &value))
            }
            ERROR_EVENT => {
                let content = string_field(&value, "msg")
                    .or_else(|| string_field(&value, "message"))
                    .unwrap_or_else(|| value.to_string());
                let sequence = self.next_sequence();
                Some(
                    StreamEvent::error(ErrorKind::Provider, content, sequence)
                        .with_ids(self.conversation_id.clone(), self.chat_id.clone()),
                )
            }
            name if name.starts_with(CHAT_EVENT_PREFIX) => self.chat_event(name, value),
            other => {
                debug!("ignoring stream event '{other}'");
                None
            }
        }
    }

    fn message_event(
        &mut self,
        event_type: StreamEventType,
        content: String,
        value: &Value,
    ) -> StreamEvent {
        self.remember_ids(
            string_field(value, "conversation_id"),
            string_field(value, "chat_id"),
        );
        let sequence = self.next_sequence();
        let mut event = StreamEvent::new(event_type, content, sequence)
            .with_ids(self.conversation_id.clone(), self.chat_id.clone());
        event.message_type = string_field(value, "type");
        event
    }

    fn chat_event(&mut self, name: &str, value: Value) -> Option<StreamEvent> {
        let chat = match serde_json::from_value::<WireChat>(value) {
            Ok(chat) => chat,
            Err(error) => {
                warn!("skipping malformed '{name}' record: {error}");
                return None;
            }
        };

        let status = chat
            .status
            .as_deref()
            .or_else(|| name.strip_prefix(CHAT_EVENT_PREFIX))
            .and_then(ChatStatus::parse);
        self.remember_ids(chat.conversation_id.clone(), chat.id.clone());

        let content = match status {
            Some(ChatStatus::Failed) => chat.last_error_message().unwrap_or_default(),
            _ => String::new(),
        };
        let sequence = self.next_sequence();
        let mut event = StreamEvent::new(StreamEventType::ChatUpdate, content, sequence)
            .with_ids(self.conversation_id.clone(), self.chat_id.clone());
        event.status = status;
        event.tool_calls = chat.tool_calls();
        event.usage = chat.usage;
        event.is_completed = status.is_some_and(|status| status.is_terminal());
        Some(event)
    }

    fn done_event(&mut self) -> StreamEvent {
        self.finished = true;
        self.buffer.clear();
        let sequence = self.next_sequence();
        StreamEvent::new(StreamEventType::Done, self.accumulated.clone(), sequence)
            .with_ids(self.conversation_id.clone(), self.chat_id.clone())
    }

    fn remember_ids(&mut self, conversation_id: Option<String>, chat_id: Option<String>) {
        if let Some(conversation_id) = non_blank(conversation_id) {
            self.conversation_id = Some(conversation_id);
        }
        if let Some(chat_id) = non_blank(chat_id) {
            self.chat_id = Some(chat_id);
        }
    }
}

fn is_done_sentinel(data: &str) -> bool {
    data == DONE_SENTINEL || data.trim_matches('"') == DONE_SENTINEL
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|value| value.as_str())
        .map(ToString::to_string)
}
