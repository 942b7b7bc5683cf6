use std::collections::BTreeMap;
use std::time::Duration;

use crate::retry::DEFAULT_MAX_RETRIES;
use crate::url::DEFAULT_COZE_BASE_URL;

/// Default per-call timeout applied to buffered requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Fixed delay between two completion polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Upper bound on completion polls for one buffered send.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;

/// Fixed-interval polling budget used when a buffered send has no answer yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

impl PollPolicy {
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Transport configuration for Coze API requests.
///
/// Read-only for the lifetime of a client; build a new client to change it.
#[derive(Debug, Clone)]
pub struct CozeApiConfig {
    /// Personal access token passed as `Authorization: Bearer`.
    pub api_key: String,
    /// Base URL; `/v3` is appended when missing.
    pub base_url: String,
    /// Agent used when a request does not name one.
    pub default_bot_id: Option<String>,
    /// Per-call timeout for buffered requests and connection setup.
    pub timeout: Option<Duration>,
    /// Retry budget for idempotent retrieval on retryable provider statuses.
    pub max_retries: u32,
    pub poll_policy: PollPolicy,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
}

impl Default for CozeApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_COZE_BASE_URL.to_string(),
            default_bot_id: None,
            timeout: Some(DEFAULT_TIMEOUT),
            max_retries: DEFAULT_MAX_RETRIES,
            poll_policy: PollPolicy::default(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
        }
    }
}

impl CozeApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_bot_id(mut self, bot_id: impl Into<String>) -> Self {
        self.default_bot_id = Some(bot_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_poll_policy(mut self, poll_policy: PollPolicy) -> Self {
        self.poll_policy = poll_policy;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra_headers.extend(headers);
        self
    }

    /// Configured default agent id, ignoring blank values.
    pub fn default_bot_id(&self) -> Option<&str> {
        self.default_bot_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}
