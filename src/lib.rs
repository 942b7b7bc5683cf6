//! Conversational agent service over the Coze v3 chat API.
//!
//! # Public API Overview
//! - [`AgentService`] is the call surface: buffered, streamed and merged
//!   sends, chat retrieval, tool-output submission and the health check.
//! - Results come back as plain records ([`ChatResponse`],
//!   [`RetrieveChatResult`], [`SubmitToolOutputsResult`]) carrying `success`,
//!   `error_message` and `error_kind`; only validation errors are `Err`.
//! - [`EnvConfig`] reads process configuration; [`init_logging`] installs the
//!   log subscriber.
//!
//! Transport lives in [`coze_api`]; history persistence in [`chat_history`].

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod records;
pub mod service;

pub use crate::config::{EnvConfig, LogFormat};
pub use crate::error::AgentError;
pub use crate::health::{HealthChecker, HEALTH_CHECK_MESSAGE, HEALTH_CHECK_USER};
pub use crate::logging::init_logging;
pub use crate::records::{ChatResponse, RetrieveChatResult, SubmitToolOutputsResult};
pub use crate::service::AgentService;

pub use chat_history;
pub use coze_api;
