use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-facing classification of a failure, carried on result records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Network,
    Timeout,
    PollTimeout,
    Protocol,
    Parse,
    Provider,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::PollTimeout => "poll_timeout",
            Self::Protocol => "protocol",
            Self::Parse => "parse",
            Self::Provider => "provider",
            Self::Cancelled => "cancelled",
        }
    }

    /// Kinds that abort a stream before the provider finished talking.
    pub fn is_transport_abort(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Cancelled)
    }
}

#[derive(Debug, Error)]
pub enum CozeApiError {
    #[error("API key is required")]
    MissingApiKey,

    #[error("no agent id in the request and no default agent id configured")]
    MissingBotId,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("deadline exceeded before the call completed")]
    DeadlineExceeded,

    #[error("HTTP {status} {body}")]
    Status { status: StatusCode, body: String },

    #[error("{}", provider_display(.status, .code, .message))]
    Provider {
        status: Option<StatusCode>,
        code: Option<i64>,
        message: String,
    },

    #[error("response is missing field '{0}'")]
    MissingField(&'static str),

    #[error("unrecognized chat status '{0}'")]
    UnknownStatus(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("no terminal chat status after {attempts} polling attempts")]
    PollTimeout { attempts: u32 },

    #[error("request was cancelled")]
    Cancelled,
}

impl CozeApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingApiKey
            | Self::MissingBotId
            | Self::InvalidRequest(_)
            | Self::InvalidBaseUrl(_)
            | Self::InvalidHeader(_) => ErrorKind::Validation,
            Self::Request(error) if error.is_timeout() => ErrorKind::Timeout,
            Self::Request(error) if error.is_decode() => ErrorKind::Parse,
            Self::Request(_) => ErrorKind::Network,
            Self::DeadlineExceeded => ErrorKind::Timeout,
            Self::Status { .. } | Self::MissingField(_) | Self::UnknownStatus(_) => {
                ErrorKind::Protocol
            }
            Self::Provider { .. } => ErrorKind::Provider,
            Self::Serde(_) => ErrorKind::Parse,
            Self::PollTimeout { .. } => ErrorKind::PollTimeout,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Programmer/integration errors raised before any I/O.
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

fn provider_display(status: &Option<StatusCode>, code: &Option<i64>, message: &str) -> String {
    let prefix = match (status, code) {
        (Some(status), Some(code)) => format!("HTTP {status} provider error {code}"),
        (Some(status), None) => format!("HTTP {status} provider error"),
        (None, Some(code)) => format!("provider error {code}"),
        (None, None) => "provider error".to_owned(),
    };
    format!("{prefix}: {message}")
}

/// Error body shapes the provider is known to send.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    pub code: Option<i64>,
    pub msg: Option<String>,
    pub message: Option<String>,
    pub error: Option<ErrorPayloadFields>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayloadFields {
    pub message: Option<String>,
}

impl ErrorPayload {
    pub fn message(&self) -> Option<&str> {
        self.msg
            .as_deref()
            .and_then(non_empty_string)
            .or_else(|| self.message.as_deref().and_then(non_empty_string))
            .or_else(|| {
                self.error
                    .as_ref()
                    .and_then(|error| error.message.as_deref())
                    .and_then(non_empty_string)
            })
    }
}

/// Extract the provider-supplied message from an error body, if it has one.
pub fn parse_error_message(body: &str) -> Option<String> {
    let payload = serde_json::from_str::<ErrorPayload>(body).ok()?;
    payload.message().map(ToOwned::to_owned)
}

/// Classify a non-2xx response: provider message when present, protocol error otherwise.
pub fn error_from_status(status: StatusCode, body: &str) -> CozeApiError {
    let payload = serde_json::from_str::<ErrorPayload>(body).ok();
    match payload.as_ref().and_then(ErrorPayload::message) {
        Some(message) => CozeApiError::Provider {
            status: Some(status),
            code: payload.as_ref().and_then(|payload| payload.code),
            message: message.to_owned(),
        },
        None => CozeApiError::Status {
            status,
            body: if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body.to_string()
            },
        },
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
