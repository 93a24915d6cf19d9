use std::env;
use std::str::FromStr;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use url::Url;

use crate::Result;
use crate::error::Error;

/// Environment variable holding the WebSocket endpoint URL.
pub const URL_VAR: &str = "WS_URL";
/// Environment variable holding the unique client identifier.
pub const IDENTIFIER_VAR: &str = "WS_IDENTIFIER";
/// Environment variable holding the ping target identifier.
pub const HOST_IDENTIFIER_VAR: &str = "WS_HOST_IDENTIFIER";
/// Environment variable holding the monitor target identifier.
pub const MONITOR_IDENTIFIER_VAR: &str = "WS_MONITOR_IDENTIFIER";
/// Environment variable toggling log output.
pub const LOG_VAR: &str = "WS_LOG";

const DEFAULT_MONITOR_IDENTIFIER: &str = "monitor";

const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(15);
const DEFAULT_RETRY_LIMIT: u32 = 1000;
const DEFAULT_QUEUE_CAPACITY: usize = 15_000;
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(300);
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Session identity and endpoint configuration.
///
/// Immutable once the session has started. Resolve it from the environment
/// with [`Config::from_env`] or construct it directly.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint URL (`ws://` or `wss://`)
    pub url: String,
    /// Unique client identifier, forwarded as the `identifier` header
    pub client_identifier: String,
    /// Identifier of the remote host that keepalive pongs are addressed to
    pub host_identifier: String,
    /// Identifier of the secondary status target. Empty disables monitor
    /// reporting.
    pub monitor_identifier: String,
    /// Whether the session installs a log subscriber on start
    pub log_enabled: bool,
}

impl Config {
    /// Build a configuration from explicit values.
    ///
    /// The monitor identifier defaults to `"monitor"`; set the field to an
    /// empty string afterwards to disable monitor reporting.
    pub fn new(
        url: impl Into<String>,
        client_identifier: impl Into<String>,
        host_identifier: impl Into<String>,
    ) -> Result<Self> {
        let url = url.into();
        validate_url(&url)?;

        Ok(Self {
            url,
            client_identifier: client_identifier.into(),
            host_identifier: host_identifier.into(),
            monitor_identifier: DEFAULT_MONITOR_IDENTIFIER.to_owned(),
            log_enabled: false,
        })
    }

    /// Resolve the configuration from environment variables.
    ///
    /// `WS_URL`, `WS_IDENTIFIER` and `WS_HOST_IDENTIFIER` are required;
    /// `WS_MONITOR_IDENTIFIER` defaults to `"monitor"` (an explicitly empty
    /// value disables monitor reporting) and `WS_LOG` defaults to `"false"`.
    pub fn from_env() -> Result<Self> {
        Self::resolve(|name| env::var(name).ok())
    }

    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = lookup(URL_VAR).ok_or_else(|| Error::missing_env(URL_VAR))?;
        validate_url(&url)?;
        let client_identifier =
            lookup(IDENTIFIER_VAR).ok_or_else(|| Error::missing_env(IDENTIFIER_VAR))?;
        let host_identifier =
            lookup(HOST_IDENTIFIER_VAR).ok_or_else(|| Error::missing_env(HOST_IDENTIFIER_VAR))?;
        let monitor_identifier = lookup(MONITOR_IDENTIFIER_VAR)
            .unwrap_or_else(|| DEFAULT_MONITOR_IDENTIFIER.to_owned());
        let log_enabled = lookup(LOG_VAR).is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Ok(Self {
            url,
            client_identifier,
            host_identifier,
            monitor_identifier,
            log_enabled,
        })
    }

    /// Whether a monitor status frame accompanies each keepalive pong.
    #[must_use]
    pub fn monitor_enabled(&self) -> bool {
        !self.monitor_identifier.is_empty()
    }
}

fn validate_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(Error::config(format!(
            "unsupported URL scheme {other:?}; expected ws or wss"
        ))),
    }
}

/// Rule applied when a frame is pushed onto a full outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame to make room for the new one
    #[default]
    DropOldest,
    /// Refuse the new frame and keep the queue untouched
    DropNewest,
}

impl FromStr for OverflowPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drop_oldest" => Ok(Self::DropOldest),
            "drop_newest" => Ok(Self::DropNewest),
            other => Err(Error::config(format!(
                "unknown overflow policy {other:?}; expected drop_oldest or drop_newest"
            ))),
        }
    }
}

/// Timing and capacity constants governing the session workers.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Bound on how long a single connection attempt may last
    pub connection_timeout: Duration,
    /// Delay before the first reconnect attempt
    pub retry_initial_delay: Duration,
    /// Cap on the exponential backoff delay
    pub retry_max_delay: Duration,
    /// Number of consecutive failed attempts before the session gives up
    pub retry_limit: u32,
    /// Maximum number of frames held in the outbound queue
    pub queue_capacity: usize,
    /// Rule applied when the outbound queue is full
    pub overflow_policy: OverflowPolicy,
    /// Per-worker join timeout during shutdown
    pub shutdown_grace: Duration,
    /// Period of the health checker audit
    pub health_interval: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            retry_initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
            retry_limit: DEFAULT_RETRY_LIMIT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            health_interval: DEFAULT_HEALTH_INTERVAL,
        }
    }
}

impl Tuning {
    /// Queue length above which the health checker raises a pressure alert.
    #[must_use]
    pub fn queue_pressure_threshold(&self) -> usize {
        self.queue_capacity / 10 * 9
    }
}

impl From<&Tuning> for ExponentialBackoff {
    fn from(tuning: &Tuning) -> Self {
        // Zero randomization keeps the delay sequence exactly
        // min(initial * 2^n, max).
        ExponentialBackoffBuilder::default()
            .with_initial_interval(tuning.retry_initial_delay)
            .with_max_interval(tuning.retry_max_delay)
            .with_multiplier(BACKOFF_MULTIPLIER)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use backoff::backoff::Backoff as _;

    use super::*;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_owned())
        }
    }

    #[test]
    fn resolve_requires_url() {
        let err = Config::resolve(lookup_from(&[
            ("WS_IDENTIFIER", "c-1"),
            ("WS_HOST_IDENTIFIER", "h-1"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("WS_URL"));
    }

    #[test]
    fn resolve_applies_monitor_default() {
        let config = Config::resolve(lookup_from(&[
            ("WS_URL", "ws://localhost:9/ws"),
            ("WS_IDENTIFIER", "c-1"),
            ("WS_HOST_IDENTIFIER", "h-1"),
        ]))
        .unwrap();

        assert_eq!(config.monitor_identifier, "monitor");
        assert!(config.monitor_enabled());
        assert!(!config.log_enabled);
    }

    #[test]
    fn empty_monitor_identifier_disables_reporting() {
        let config = Config::resolve(lookup_from(&[
            ("WS_URL", "ws://localhost:9/ws"),
            ("WS_IDENTIFIER", "c-1"),
            ("WS_HOST_IDENTIFIER", "h-1"),
            ("WS_MONITOR_IDENTIFIER", ""),
        ]))
        .unwrap();

        assert!(!config.monitor_enabled());
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        let err = Config::new("https://example.com", "c-1", "h-1").unwrap_err();

        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn overflow_policy_parses_known_values() {
        assert_eq!(
            "drop_oldest".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::DropOldest
        );
        assert_eq!(
            "drop_newest".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::DropNewest
        );
        assert!("drop_sideways".parse::<OverflowPolicy>().is_err());
    }

    #[test]
    fn backoff_sequence_doubles_up_to_the_cap() {
        let tuning = Tuning {
            retry_initial_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(4),
            ..Tuning::default()
        };
        let mut backoff: ExponentialBackoff = (&tuning).into();

        let delays: Vec<_> = (0..5).map(|_| backoff.next_backoff().unwrap()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn pressure_threshold_is_ninety_percent_of_capacity() {
        let tuning = Tuning {
            queue_capacity: 15_000,
            ..Tuning::default()
        };

        assert_eq!(tuning.queue_pressure_threshold(), 13_500);
    }
}
