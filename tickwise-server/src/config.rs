use std::{net::SocketAddr, str::FromStr, time::Duration};
use tracing::warn;
use url::Url;

/// Runtime settings of the streaming server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Time between two reports sent to one subscriber.
    pub stream_period: Duration,
    /// Pause after a failed evaluation before the next attempt.
    pub retry_delay: Duration,
    /// Bound on every upstream HTTP call (price, history, context, model).
    pub upstream_timeout: Duration,
    /// Background context refresh period.
    pub refresh_period: Duration,
    pub ml_url: Option<Url>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 9001)),
            stream_period: Duration::from_secs(1),
            retry_delay: Duration::from_secs(2),
            upstream_timeout: Duration::from_secs(4),
            refresh_period: Duration::from_secs(10),
            ml_url: None,
        }
    }
}

impl ServerConfig {
    /// Read `TICKWISE_*` environment variables, falling back to defaults on missing or
    /// malformed values.
    ///
    /// - `TICKWISE_ADDR` (default `0.0.0.0:9001`)
    /// - `TICKWISE_STREAM_PERIOD_MS` (default 1000)
    /// - `TICKWISE_RETRY_DELAY_MS` (default 2000)
    /// - `TICKWISE_UPSTREAM_TIMEOUT_MS` (default 4000)
    /// - `TICKWISE_REFRESH_PERIOD_MS` (default 10000)
    /// - `TICKWISE_ML_URL` (unset disables ML)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| match parse_var::<u64>(&lookup, key) {
            Some(0) => {
                warn!(key, "zero duration, using default");
                default
            }
            Some(ms) => Duration::from_millis(ms),
            None => default,
        };

        Self {
            addr: parse_var(&lookup, "TICKWISE_ADDR").unwrap_or(defaults.addr),
            stream_period: millis("TICKWISE_STREAM_PERIOD_MS", defaults.stream_period),
            retry_delay: millis("TICKWISE_RETRY_DELAY_MS", defaults.retry_delay),
            upstream_timeout: millis("TICKWISE_UPSTREAM_TIMEOUT_MS", defaults.upstream_timeout),
            refresh_period: millis("TICKWISE_REFRESH_PERIOD_MS", defaults.refresh_period),
            ml_url: parse_var(&lookup, "TICKWISE_ML_URL"),
        }
    }
}

/// `None` when `key` is unset or malformed; the latter is logged.
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(key, %raw, %error, "malformed setting, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_lookup() {
        struct TestCase {
            vars: Vec<(&'static str, &'static str)>,
            expected: ServerConfig,
        }

        let cases = vec![
            // TC0: nothing set
            TestCase {
                vars: vec![],
                expected: ServerConfig::default(),
            },
            // TC1: every value overridden
            TestCase {
                vars: vec![
                    ("TICKWISE_ADDR", "127.0.0.1:8080"),
                    ("TICKWISE_STREAM_PERIOD_MS", "500"),
                    ("TICKWISE_RETRY_DELAY_MS", " 3000 "),
                    ("TICKWISE_UPSTREAM_TIMEOUT_MS", "1500"),
                    ("TICKWISE_REFRESH_PERIOD_MS", "20000"),
                    ("TICKWISE_ML_URL", "http://localhost:8500/predict"),
                ],
                expected: ServerConfig {
                    addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
                    stream_period: Duration::from_millis(500),
                    retry_delay: Duration::from_secs(3),
                    upstream_timeout: Duration::from_millis(1500),
                    refresh_period: Duration::from_secs(20),
                    ml_url: Url::parse("http://localhost:8500/predict").ok(),
                },
            },
            // TC2: malformed and zero values fall back
            TestCase {
                vars: vec![
                    ("TICKWISE_ADDR", "not-an-addr"),
                    ("TICKWISE_STREAM_PERIOD_MS", "0"),
                    ("TICKWISE_RETRY_DELAY_MS", "-1"),
                    ("TICKWISE_ML_URL", "localhost without scheme"),
                ],
                expected: ServerConfig::default(),
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let vars = test.vars.into_iter().collect::<HashMap<_, _>>();
            let actual = ServerConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
