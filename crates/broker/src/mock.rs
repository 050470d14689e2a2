//! Deterministic in-process transport for test harnesses.
//!
//! [`MockTransport`] answers every call itself according to a
//! [`MockPolicy`] keyed by operation position. The position is read from
//! the `_NNN` suffix of the request's `op_id`, falling back to a running
//! call counter. Counters and published requests are shared through
//! [`MockStats`] so a test can keep inspecting them after handing the
//! transport to a dispatch client.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::messages::Envelope;
use crate::topology::{task_topology, DeclaredTopology, TASK_EXCHANGE};
use crate::transport::{Transport, TransportError};

/// Failure messages handed out in rotation, selected by `index % 5`.
pub const SIMULATED_ERRORS: [&str; 5] = [
    "Response timeout after 75 seconds",
    "Connection lost during processing",
    "SICAL service unavailable",
    "Validation error: Invalid tercero code",
    "Database constraint violation",
];

/// How the double answers a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockPolicy {
    AllSucceed,
    AllFail,
    /// Fail exactly the operation at this position.
    FailAt(usize),
    /// Coin flip per call.
    Random,
    /// Never reply.
    Hang,
}

impl Default for MockPolicy {
    fn default() -> Self {
        Self::FailAt(1)
    }
}

impl FromStr for MockPolicy {
    type Err = String;

    /// Accepts `all_success`, `all_fail`, `partial`, `fail_at:<n>`,
    /// `random` and `hang`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all_success" => Ok(Self::AllSucceed),
            "all_fail" => Ok(Self::AllFail),
            "partial" => Ok(Self::FailAt(1)),
            "random" => Ok(Self::Random),
            "hang" => Ok(Self::Hang),
            other => match other.strip_prefix("fail_at:") {
                Some(n) => n
                    .parse()
                    .map(Self::FailAt)
                    .map_err(|_| format!("Invalid fail_at index '{n}'")),
                None => Err(format!("Unknown mock policy '{other}'")),
            },
        }
    }
}

/// A request as seen by the double.
#[derive(Debug, Clone)]
pub struct PublishedRequest {
    pub routing_key: String,
    pub correlation_id: String,
    pub body: serde_json::Value,
}

/// Shared counters for one [`MockTransport`].
#[derive(Debug, Clone, Default)]
pub struct MockStats {
    connects: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    published: Arc<Mutex<Vec<PublishedRequest>>>,
}

impl MockStats {
    /// Successful `connect_topology` calls.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// `call` invocations, including rejected ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `close` calls that released a live session.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<PublishedRequest> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Scripted transport double.
pub struct MockTransport {
    policy: MockPolicy,
    latency: Duration,
    connect_failures: usize,
    connected: bool,
    topology: DeclaredTopology,
    stats: MockStats,
}

impl MockTransport {
    pub fn new(policy: MockPolicy) -> Self {
        Self {
            policy,
            latency: Duration::ZERO,
            connect_failures: 0,
            connected: false,
            topology: DeclaredTopology::default(),
            stats: MockStats::default(),
        }
    }

    /// Delay every answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next `count` connect attempts.
    pub fn with_connect_failures(mut self, count: usize) -> Self {
        self.connect_failures = count;
        self
    }

    /// Record into existing counters, so several transports built over
    /// time report into one place.
    pub fn with_stats(mut self, stats: MockStats) -> Self {
        self.stats = stats;
        self
    }

    /// Handle on the shared counters.
    pub fn stats(&self) -> MockStats {
        self.stats.clone()
    }

    /// Topology declared so far.
    pub fn topology(&self) -> &DeclaredTopology {
        &self.topology
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn should_succeed(&self, index: usize) -> bool {
        match self.policy {
            MockPolicy::AllSucceed => true,
            MockPolicy::AllFail => false,
            MockPolicy::FailAt(failing) => index != failing,
            MockPolicy::Random => rand::random::<bool>(),
            MockPolicy::Hang => true,
        }
    }
}

/// Position encoded in an `op_id` like `job.json_004`.
fn op_index(body: &serde_json::Value) -> Option<usize> {
    let op_id = body
        .pointer("/operation_data/operation/op_id")
        .and_then(|v| v.as_str())?;
    let (_, suffix) = op_id.rsplit_once('_')?;
    suffix.parse().ok()
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect_topology(&mut self) -> Result<(), TransportError> {
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(TransportError::ConnectionLost(
                "simulated broker outage".into(),
            ));
        }
        self.topology.apply_all(&task_topology());
        self.connected = true;
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(policy = ?self.policy, "Mock transport connected");
        Ok(())
    }

    async fn call(&mut self, envelope: &Envelope) -> Result<Vec<u8>, TransportError> {
        let call_number = self.stats.calls.fetch_add(1, Ordering::SeqCst);
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self
            .topology
            .route(TASK_EXCHANGE, &envelope.routing_key)
            .is_empty()
        {
            return Err(TransportError::Simulated(format!(
                "No queue bound for routing key '{}'",
                envelope.routing_key
            )));
        }

        let body: serde_json::Value =
            serde_json::from_slice(&envelope.body).unwrap_or(serde_json::Value::Null);
        let index = op_index(&body).unwrap_or(call_number);
        self.stats
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublishedRequest {
                routing_key: envelope.routing_key.clone(),
                correlation_id: envelope.correlation_id.clone(),
                body,
            });

        if self.policy == MockPolicy::Hang {
            std::future::pending::<()>().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.should_succeed(index) {
            let short_id: String = envelope.correlation_id.chars().take(8).collect();
            let reply = serde_json::json!({
                "status": "COMPLETED",
                "sical_id": format!("MOCK-SICAL-{short_id}"),
                "task_id": envelope.correlation_id,
                "processed_at": chrono::Utc::now().to_rfc3339(),
                "message": format!("Mock: {} operation completed successfully", envelope.routing_key),
            });
            Ok(reply.to_string().into_bytes())
        } else {
            let message = SIMULATED_ERRORS[index % SIMULATED_ERRORS.len()];
            tracing::debug!(index, message, "Mock transport simulating failure");
            Err(TransportError::Simulated(message.to_string()))
        }
    }

    async fn close(&mut self) {
        if self.connected {
            self.connected = false;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(op_id: &str) -> Envelope {
        let body = serde_json::json!({"operation_data": {"operation": {"op_id": op_id}}});
        Envelope {
            routing_key: "task.arqueo".into(),
            correlation_id: "0123456789".into(),
            body: serde_json::to_vec(&body).unwrap(),
        }
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("all_success".parse::<MockPolicy>(), Ok(MockPolicy::AllSucceed));
        assert_eq!("ALL_FAIL".parse::<MockPolicy>(), Ok(MockPolicy::AllFail));
        assert_eq!("partial".parse::<MockPolicy>(), Ok(MockPolicy::FailAt(1)));
        assert_eq!("fail_at:4".parse::<MockPolicy>(), Ok(MockPolicy::FailAt(4)));
        assert_eq!("random".parse::<MockPolicy>(), Ok(MockPolicy::Random));
        assert_eq!("hang".parse::<MockPolicy>(), Ok(MockPolicy::Hang));
        assert!("fail_at:x".parse::<MockPolicy>().is_err());
        assert!("sometimes".parse::<MockPolicy>().is_err());
    }

    #[test]
    fn index_read_from_op_id_suffix() {
        let body = serde_json::json!({"operation_data": {"operation": {"op_id": "a_b.json_012"}}});
        assert_eq!(op_index(&body), Some(12));
        assert_eq!(op_index(&serde_json::json!({})), None);
    }

    #[tokio::test]
    async fn call_before_connect_is_rejected() {
        let mut mock = MockTransport::new(MockPolicy::AllSucceed);
        assert!(matches!(
            mock.call(&envelope("j_000")).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn fail_at_policy_fails_only_that_position() {
        let mut mock = MockTransport::new(MockPolicy::FailAt(2));
        mock.connect_topology().await.unwrap();

        assert!(mock.call(&envelope("j_000")).await.is_ok());
        assert!(mock.call(&envelope("j_001")).await.is_ok());
        match mock.call(&envelope("j_002")).await {
            Err(TransportError::Simulated(msg)) => assert_eq!(msg, SIMULATED_ERRORS[2]),
            other => panic!("Expected simulated failure, got {other:?}"),
        }
        assert_eq!(mock.stats().calls(), 3);
    }

    #[tokio::test]
    async fn random_policy_answers_from_the_known_outcomes() {
        let mut mock = MockTransport::new(MockPolicy::Random);
        mock.connect_topology().await.unwrap();

        for i in 0..20 {
            match mock.call(&envelope(&format!("j_{i:03}"))).await {
                Ok(reply) => {
                    let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
                    assert_eq!(value["status"], "COMPLETED");
                }
                Err(TransportError::Simulated(msg)) => {
                    assert_eq!(msg, SIMULATED_ERRORS[i % SIMULATED_ERRORS.len()]);
                }
                Err(other) => panic!("Unexpected error {other:?}"),
            }
        }
        assert_eq!(mock.stats().calls(), 20);
    }

    #[tokio::test]
    async fn success_reply_is_completed_json() {
        let mut mock = MockTransport::new(MockPolicy::AllSucceed);
        mock.connect_topology().await.unwrap();
        let reply = mock.call(&envelope("j_000")).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(value["status"], "COMPLETED");
        assert_eq!(value["sical_id"], "MOCK-SICAL-01234567");
    }

    #[tokio::test]
    async fn reconnecting_keeps_topology_idempotent() {
        let mut mock = MockTransport::new(MockPolicy::AllSucceed);
        mock.connect_topology().await.unwrap();
        let first = mock.topology().clone();
        mock.close().await;
        mock.connect_topology().await.unwrap();
        assert_eq!(mock.topology(), &first);
        assert_eq!(mock.stats().connects(), 2);
        assert_eq!(mock.stats().closes(), 1);
    }

    #[tokio::test]
    async fn scripted_connect_failures() {
        let mut mock = MockTransport::new(MockPolicy::AllSucceed).with_connect_failures(1);
        assert!(mock.connect_topology().await.is_err());
        assert!(mock.connect_topology().await.is_ok());
        assert_eq!(mock.stats().connects(), 1);
    }

    #[tokio::test]
    async fn shared_stats_accumulate_across_instances() {
        let stats = MockStats::default();
        for _ in 0..2 {
            let mut mock = MockTransport::new(MockPolicy::AllSucceed).with_stats(stats.clone());
            mock.connect_topology().await.unwrap();
            mock.call(&envelope("j_000")).await.unwrap();
            mock.close().await;
        }
        assert_eq!((stats.connects(), stats.calls(), stats.closes()), (2, 2, 2));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut mock = MockTransport::new(MockPolicy::AllSucceed);
        mock.close().await;
        mock.connect_topology().await.unwrap();
        mock.close().await;
        mock.close().await;
        assert_eq!(mock.stats().closes(), 1);
    }
}
