use std::collections::BTreeMap;

use crate::config::CozeApiConfig;
use crate::error::CozeApiError;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_USER_AGENT: &str = "user-agent";

pub const JSON_MEDIA_TYPE: &str = "application/json";
pub const EVENT_STREAM_MEDIA_TYPE: &str = "text/event-stream";

/// Build a deterministic header map for provider requests.
///
/// Extra headers are merged last and may override the defaults, except
/// `authorization`, which always carries the configured bearer token.
pub fn build_headers(
    config: &CozeApiConfig,
    streaming: bool,
) -> Result<BTreeMap<String, String>, CozeApiError> {
    let api_key = config.api_key.trim();
    if api_key.is_empty() {
        return Err(CozeApiError::MissingApiKey);
    }

    let mut headers = BTreeMap::new();
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        JSON_MEDIA_TYPE.to_owned(),
    );
    headers.insert(
        HEADER_ACCEPT.to_owned(),
        if streaming {
            EVENT_STREAM_MEDIA_TYPE
        } else {
            JSON_MEDIA_TYPE
        }
        .to_owned(),
    );

    let user_agent = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), user_agent);

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    headers.insert(
        HEADER_AUTHORIZATION.to_owned(),
        format!("Bearer {api_key}"),
    );

    Ok(headers)
}

fn default_user_agent() -> String {
    format!(
        "coze_api/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
