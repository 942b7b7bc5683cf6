/// Default base URL for Coze transport requests.
pub const DEFAULT_COZE_BASE_URL: &str = "https://api.coze.cn";

pub const CHAT_PATH: &str = "/chat";
pub const RETRIEVE_PATH: &str = "/chat/retrieve";
pub const SUBMIT_TOOL_OUTPUTS_PATH: &str = "/chat/submit_tool_outputs";

/// Normalize a base URL to the versioned API root.
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_COZE_BASE_URL`]
/// 2) keep a trailing `/v3` unchanged
/// 3) append `/v3` otherwise
pub fn normalize_api_root(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_COZE_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/v3") {
        return trimmed.to_string();
    }
    format!("{trimmed}/v3")
}

/// Join an endpoint path (e.g. [`CHAT_PATH`]) onto a normalized API root.
pub fn endpoint_url(base: &str, path: &str) -> String {
    let root = normalize_api_root(base);
    let path = path.trim_start_matches('/');
    format!("{root}/{path}")
}

/// Reject base URLs that reqwest could never send to.
pub fn is_http_url(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed.is_empty() || trimmed.starts_with("http://") || trimmed.starts_with("https://")
}
