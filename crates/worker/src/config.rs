use std::path::PathBuf;
use std::time::Duration;

use sical_broker::{BrokerConfig, DispatchConfig, RetryPolicy};
use sical_store::JobAreas;

/// A configuration value that is present but cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{var} must be {expected}, got '{value}'")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development against a
/// broker on `localhost`.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root of the job areas (default: `./input`).
    pub input_dir: PathBuf,
    /// Broker connection settings.
    pub broker: BrokerConfig,
    /// Reply deadline and connect retry policy.
    pub dispatch: DispatchConfig,
    /// Interval between passes. `None` runs a single pass and exits.
    pub poll_interval: Option<Duration>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default      |
    /// |-------------------------|--------------|
    /// | `SICAL_INPUT_DIR`       | `./input`    |
    /// | `RABBITMQ_HOST`         | `localhost`  |
    /// | `RABBITMQ_PORT`         | `5672`       |
    /// | `RABBITMQ_USER`         | `guest`      |
    /// | `RABBITMQ_PASS`         | `guest`      |
    /// | `RABBITMQ_VHOST`        | `/`          |
    /// | `RESPONSE_TIMEOUT_SECS` | `75`         |
    /// | `CONNECT_ATTEMPTS`      | `3`          |
    /// | `POLL_INTERVAL_SECS`    | unset        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let broker_defaults = BrokerConfig::default();
        let dispatch_defaults = DispatchConfig::default();

        let input_dir = lookup("SICAL_INPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./input"));

        let broker = BrokerConfig {
            host: lookup("RABBITMQ_HOST").unwrap_or(broker_defaults.host),
            port: parse(&lookup, "RABBITMQ_PORT", "a valid u16")?.unwrap_or(broker_defaults.port),
            user: lookup("RABBITMQ_USER").unwrap_or(broker_defaults.user),
            password: lookup("RABBITMQ_PASS").unwrap_or(broker_defaults.password),
            vhost: lookup("RABBITMQ_VHOST").unwrap_or(broker_defaults.vhost),
            ..broker_defaults
        };

        let reply_timeout = parse::<u64>(&lookup, "RESPONSE_TIMEOUT_SECS", "a whole number of seconds")?
            .map(Duration::from_secs)
            .unwrap_or(dispatch_defaults.reply_timeout);

        let retry = match parse::<u32>(&lookup, "CONNECT_ATTEMPTS", "a positive integer")? {
            Some(0) => {
                return Err(ConfigError {
                    var: "CONNECT_ATTEMPTS",
                    value: "0".into(),
                    expected: "a positive integer",
                })
            }
            Some(max_attempts) => RetryPolicy {
                max_attempts,
                ..RetryPolicy::default()
            },
            None => dispatch_defaults.retry,
        };

        let poll_interval = parse::<u64>(&lookup, "POLL_INTERVAL_SECS", "a whole number of seconds")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            input_dir,
            broker,
            dispatch: DispatchConfig {
                reply_timeout,
                retry,
                ..dispatch_defaults
            },
            poll_interval,
        })
    }

    pub fn areas(&self) -> JobAreas {
        JobAreas::under(&self.input_dir)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|_| ConfigError {
            var,
            value,
            expected,
        }),
    }
}
