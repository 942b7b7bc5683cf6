//! Transport client for the Coze v3 conversational agent API.
//!
//! Covers buffered and SSE-streamed chat sends, chat retrieval with a
//! completion poller, tool-output submission, and the decoding and merging of
//! streamed events into one answer. Runtime concerns such as configuration
//! loading and history persistence live in the calling application.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod merge;
pub mod payload;
pub mod poll;
pub mod retry;
pub mod session;
pub mod sse;
pub mod status;
pub mod stream;
pub mod tools;
pub mod url;

mod wire;

pub use client::{BufferedChat, CallOptions, CancellationSignal, CozeApiClient, StartedChat};
pub use config::{CozeApiConfig, PollPolicy};
pub use error::{CozeApiError, ErrorKind};
pub use events::{StreamEvent, StreamEventType};
pub use merge::{clean_content, merge_events, MergeResult, MergeStatistics, NO_CONTENT_SENTINEL};
pub use payload::{build_chat_request, ChatRequest, MessageRequest, SubmitToolOutputsRequest};
pub use poll::{wait_for_completion, ChatRetriever, Completion, CompletionOutcome};
pub use session::{ChatMessage, ChatSession, ChatSnapshot, MessageRole, Usage};
pub use sse::StreamDecoder;
pub use status::ChatStatus;
pub use stream::EventStream;
pub use tools::{validate_submission, SubmitOutcome, ToolCall, ToolOutput, ToolOutputSubmitter};
pub use url::normalize_api_root;
