//! Client configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::app::PollConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is not valid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for talking to the comic service.
///
/// All fields have defaults suitable for a service running locally.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL including the `/api` prefix.
    pub api_url: String,
    /// Per-request timeout. Generation runs inside the request, so this is long.
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_max_failures: u32,
    /// `None` disables the overall polling deadline.
    pub poll_max_duration: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let poll = PollConfig::default();
        Self {
            api_url: "http://localhost:8000/api".to_string(),
            request_timeout: Duration::from_secs(300),
            poll_interval: poll.interval,
            poll_max_failures: poll.max_consecutive_failures,
            poll_max_duration: poll.max_duration,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                           | Default                      |
    /// |-----------------------------------|------------------------------|
    /// | `COMICGEN_API_URL`                | `http://localhost:8000/api`  |
    /// | `COMICGEN_REQUEST_TIMEOUT_SECS`   | `300`                        |
    /// | `COMICGEN_POLL_INTERVAL_MS`       | `2000`                       |
    /// | `COMICGEN_POLL_MAX_FAILURES`      | `5`                          |
    /// | `COMICGEN_POLL_MAX_DURATION_SECS` | `1800` (`0` disables)        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = match lookup("COMICGEN_API_URL") {
            Some(url) => {
                let url = url.trim().trim_end_matches('/').to_string();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid {
                        var: "COMICGEN_API_URL",
                        value: url,
                        reason: "expected an http(s) URL".to_string(),
                    });
                }
                url
            }
            None => defaults.api_url,
        };

        let request_timeout = match parse::<u64>(&lookup, "COMICGEN_REQUEST_TIMEOUT_SECS")? {
            Some(0) => return Err(zero("COMICGEN_REQUEST_TIMEOUT_SECS")),
            Some(secs) => Duration::from_secs(secs),
            None => defaults.request_timeout,
        };

        let poll_interval = match parse::<u64>(&lookup, "COMICGEN_POLL_INTERVAL_MS")? {
            Some(0) => return Err(zero("COMICGEN_POLL_INTERVAL_MS")),
            Some(ms) => Duration::from_millis(ms),
            None => defaults.poll_interval,
        };

        let poll_max_failures = match parse::<u32>(&lookup, "COMICGEN_POLL_MAX_FAILURES")? {
            Some(0) => return Err(zero("COMICGEN_POLL_MAX_FAILURES")),
            Some(n) => n,
            None => defaults.poll_max_failures,
        };

        let poll_max_duration = match parse::<u64>(&lookup, "COMICGEN_POLL_MAX_DURATION_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.poll_max_duration,
        };

        Ok(Self {
            api_url,
            request_timeout,
            poll_interval,
            poll_max_failures,
            poll_max_duration,
        })
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval,
            max_consecutive_failures: self.poll_max_failures,
            max_duration: self.poll_max_duration,
            ..PollConfig::default()
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        })
}

fn zero(var: &'static str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: "0".to_string(),
        reason: "must be greater than zero".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.api_url, "http://localhost:8000/api");
        assert_eq!(cfg.request_timeout, Duration::from_secs(300));
        assert_eq!(cfg.poll_config(), PollConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = load(&[
            ("COMICGEN_API_URL", "https://comics.example.com/api/"),
            ("COMICGEN_POLL_INTERVAL_MS", "500"),
            ("COMICGEN_POLL_MAX_FAILURES", "8"),
            ("COMICGEN_POLL_MAX_DURATION_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(cfg.api_url, "https://comics.example.com/api");
        let poll = cfg.poll_config();
        assert_eq!(poll.interval, Duration::from_millis(500));
        assert_eq!(poll.max_consecutive_failures, 8);
        assert_eq!(poll.max_duration, None);
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = load(&[("COMICGEN_POLL_INTERVAL_MS", "fast")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { var: "COMICGEN_POLL_INTERVAL_MS", .. }
        ));

        let err = load(&[("COMICGEN_POLL_MAX_FAILURES", "0")]).unwrap_err();
        assert_eq!(err, zero("COMICGEN_POLL_MAX_FAILURES"));
    }

    #[test]
    fn url_must_be_http() {
        assert!(load(&[("COMICGEN_API_URL", "localhost:8000")]).is_err());
    }
}
