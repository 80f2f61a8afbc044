//! Client configuration with documented defaults and env overrides.

use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 23188;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Request path appended to the socket URL, e.g. `"/ws"`. Empty by default.
    pub path: String,
    pub auto_reconnect: bool,
    /// Fixed wait before each reconnect attempt. Zero retries immediately.
    pub reconnect_delay: Duration,
    /// Consecutive failed attempts before retrying stops.
    pub max_reconnect_attempts: u32,
    /// Per-call timeout used by `Client::invoke`. Zero disables it.
    pub default_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            path: String::new(),
            auto_reconnect: true,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Build config from environment variables, falling back to defaults.
    ///
    /// - `ITOUCH_HOST`, `ITOUCH_PORT`, `ITOUCH_PATH`
    /// - `ITOUCH_AUTO_RECONNECT`: `true`/`false`
    /// - `ITOUCH_RECONNECT_DELAY_MS`
    /// - `ITOUCH_MAX_RECONNECT_ATTEMPTS`
    /// - `ITOUCH_TIMEOUT_SECS`
    ///
    /// Unparseable values are ignored rather than rejected.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("ITOUCH_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_owned()),
            port: env_parse("ITOUCH_PORT", DEFAULT_PORT),
            path: std::env::var("ITOUCH_PATH").unwrap_or_default(),
            auto_reconnect: env_parse("ITOUCH_AUTO_RECONNECT", true),
            reconnect_delay: Duration::from_millis(env_parse(
                "ITOUCH_RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY_MS,
            )),
            max_reconnect_attempts: env_parse(
                "ITOUCH_MAX_RECONNECT_ATTEMPTS",
                DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ),
            default_timeout_secs: env_parse("ITOUCH_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Socket URL for the configured target.
    #[must_use]
    pub fn url(&self) -> String {
        let path = if self.path.is_empty() || self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("ws://{}:{}{}", self.host, self.port, path)
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
