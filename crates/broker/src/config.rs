//! Broker connection settings.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Connection settings for the RabbitMQ broker.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    /// Heartbeat interval negotiated with the broker, in seconds.
    pub heartbeat_secs: u16,
    /// TCP connect timeout, in milliseconds.
    pub connection_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5672,
            user: "guest".into(),
            password: "guest".into(),
            vhost: "/".into(),
            heartbeat_secs: 60,
            connection_timeout_ms: 5000,
        }
    }
}

impl BrokerConfig {
    /// AMQP URI for this configuration.
    pub fn amqp_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}?heartbeat={}&connection_timeout={}",
            encode_component(&self.user),
            encode_component(&self.password),
            self.host,
            self.port,
            encode_component(&self.vhost),
            self.heartbeat_secs,
            self.connection_timeout_ms,
        )
    }

    /// URI with the password masked, for logging.
    pub fn redacted_uri(&self) -> String {
        format!(
            "amqp://{}:***@{}:{}/{}",
            encode_component(&self.user),
            self.host,
            self.port,
            encode_component(&self.vhost),
        )
    }
}

/// Everything except RFC 3986 unreserved characters is escaped, so any
/// user, password or vhost survives inside the URI's userinfo and path.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, URI_COMPONENT).to_string()
}
