//! Environment configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use coze_api::config::DEFAULT_TIMEOUT;
use coze_api::retry::DEFAULT_MAX_RETRIES;
use coze_api::CozeApiConfig;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub bot_id: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub history_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl EnvConfig {
    /// Read a `.env` file from the working directory (if any), then the process
    /// environment. Variables already set in the environment win.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    pub fn from_env() -> Self {
        Self {
            base_url: env_string_opt("COZE_BASE_URL"),
            api_key: env_string_opt("COZE_API_KEY"),
            bot_id: env_string_opt("COZE_BOT_ID"),
            timeout: Duration::from_secs(env_number(
                "COZE_TIMEOUT_SECS",
                DEFAULT_TIMEOUT.as_secs(),
            )),
            max_retries: env_number("COZE_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            history_path: env_string_opt("COZE_HISTORY_PATH").map(PathBuf::from),
            log_format: env_string_opt("COZE_LOG_FORMAT")
                .map(|value| LogFormat::parse(&value))
                .unwrap_or_default(),
        }
    }

    /// Transport configuration. A missing key stays empty so that client
    /// construction reports it.
    pub fn api_config(&self) -> CozeApiConfig {
        let mut config = CozeApiConfig::new(self.api_key.clone().unwrap_or_default())
            .with_timeout(self.timeout)
            .with_max_retries(self.max_retries);
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(bot_id) = &self.bot_id {
            config = config.with_default_bot_id(bot_id);
        }
        config
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value.trim().to_string())
        }
    })
}

fn env_number<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match env_string_opt(key) {
        None => default,
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!("ignoring invalid {key}={value}; using {default}");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{EnvConfig, LogFormat};
    use std::env;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    const KEYS: [&str; 7] = [
        "COZE_BASE_URL",
        "COZE_API_KEY",
        "COZE_BOT_ID",
        "COZE_TIMEOUT_SECS",
        "COZE_MAX_RETRIES",
        "COZE_HISTORY_PATH",
        "COZE_LOG_FORMAT",
    ];

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn clear_all() -> Vec<EnvGuard> {
        KEYS.iter().map(|key| set_env_guard(key, None)).collect()
    }

    #[test]
    fn env_defaults() {
        let _lock = env_lock();
        let _guards = clear_all();

        let config = EnvConfig::from_env();
        assert!(config.base_url.is_none());
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert!(config.history_path.is_none());
        assert_eq!(config.log_format, LogFormat::Text);

        let api = config.api_config();
        assert_eq!(api.api_key, "");
        assert_eq!(api.default_bot_id(), None);
    }

    #[test]
    fn env_values_flow_into_api_config() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard("COZE_BASE_URL", Some("https://api.coze.com"));
        let _g2 = set_env_guard("COZE_API_KEY", Some(" pat-xyz "));
        let _g3 = set_env_guard("COZE_BOT_ID", Some("7524702072735367168"));
        let _g4 = set_env_guard("COZE_TIMEOUT_SECS", Some("12"));
        let _g5 = set_env_guard("COZE_MAX_RETRIES", Some("5"));
        let _g6 = set_env_guard("COZE_LOG_FORMAT", Some("JSON"));

        let config = EnvConfig::from_env();
        assert_eq!(config.log_format, LogFormat::Json);

        let api = config.api_config();
        assert_eq!(api.api_key, "pat-xyz");
        assert_eq!(api.base_url, "https://api.coze.com");
        assert_eq!(api.default_bot_id(), Some("7524702072735367168"));
        assert_eq!(api.timeout, Some(Duration::from_secs(12)));
        assert_eq!(api.max_retries, 5);
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard("COZE_TIMEOUT_SECS", Some("soon"));
        let _g2 = set_env_guard("COZE_MAX_RETRIES", Some("-1"));

        let config = EnvConfig::from_env();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
    }
}
