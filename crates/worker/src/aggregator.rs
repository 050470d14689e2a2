//! Sequential dispatch of a job's operations and aggregation of outcomes.

use sical_broker::{DispatchClient, Transport};
use sical_core::{JobResult, OperationResult, OperationSpec};

/// Dispatch every operation in order and classify the job.
///
/// Exactly one call is made per operation and at most one is in flight at a
/// time. A failed call is recorded against its operation and dispatch moves
/// on to the next one; nothing here is fatal.
pub async fn dispatch_all<T: Transport>(
    client: &mut DispatchClient<T>,
    operations: &[OperationSpec],
) -> JobResult {
    let total = operations.len();
    let mut results = Vec::with_capacity(total);

    for op in operations {
        let result = match client.send(op).await {
            Ok(response) => OperationResult::answered(op, response),
            Err(e) => OperationResult::errored(op, e.to_string()),
        };
        log_progress(op, &result, total);
        results.push(result);
    }

    JobResult::from_results(results)
}

fn log_progress(op: &OperationSpec, result: &OperationResult, total: usize) {
    let target = op.target().unwrap_or("-");
    if result.succeeded() {
        tracing::info!(
            op_id = %op.op_id,
            tipo = %op.kind,
            caja = target,
            "[{}/{total}] {} OK",
            op.index + 1,
            op.kind,
        );
    } else {
        tracing::warn!(
            op_id = %op.op_id,
            tipo = %op.kind,
            caja = target,
            status = result.status.as_str(),
            error = result.error.as_deref().unwrap_or("no error text"),
            "[{}/{total}] {} FAILED",
            op.index + 1,
            op.kind,
        );
    }
}

#[cfg(test)]
mod tests {
    use sical_broker::mock::{MockPolicy, MockTransport, SIMULATED_ERRORS};
    use sical_broker::{DispatchConfig, RetryPolicy};
    use sical_core::{format_op_id, DispatchStatus, JobStatus, OperationKind};

    use super::*;

    fn ops(count: usize) -> Vec<OperationSpec> {
        (0..count)
            .map(|index| OperationSpec {
                index,
                op_id: format_op_id("job.json", index),
                kind: if index % 2 == 0 {
                    OperationKind::Arqueo
                } else {
                    OperationKind::Gasto
                },
                fields: serde_json::Map::new(),
            })
            .collect()
    }

    fn client(policy: MockPolicy) -> DispatchClient<MockTransport> {
        DispatchClient::new(
            MockTransport::new(policy),
            DispatchConfig {
                retry: RetryPolicy::immediate(1),
                ..DispatchConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn one_call_per_operation_in_order() {
        let mut client = client(MockPolicy::AllSucceed);
        let stats = client.transport().stats();

        let job = dispatch_all(&mut client, &ops(4)).await;
        assert_eq!(job.overall_status, JobStatus::Completed);
        assert_eq!(stats.calls(), 4);

        let routed: Vec<_> = stats.published().into_iter().map(|p| p.routing_key).collect();
        assert_eq!(routed, ["task.arqueo", "task.gasto", "task.arqueo", "task.gasto"]);
    }

    #[tokio::test]
    async fn middle_failure_does_not_stop_dispatch() {
        let mut client = client(MockPolicy::FailAt(1));
        let job = dispatch_all(&mut client, &ops(3)).await;

        assert_eq!(job.overall_status, JobStatus::Partial);
        assert_eq!((job.succeeded, job.failed), (2, 1));
        let failed = &job.results[1];
        assert_eq!(failed.status, DispatchStatus::Failed);
        assert!(failed.response.is_none());
        assert_eq!(
            failed.error.as_deref(),
            Some(format!("Transport error: {}", SIMULATED_ERRORS[1]).as_str())
        );
        assert_eq!(client.transport().stats().calls(), 3);
    }

    #[tokio::test]
    async fn every_failure_is_failed_job() {
        let mut client = client(MockPolicy::AllFail);
        let job = dispatch_all(&mut client, &ops(2)).await;
        assert_eq!(job.overall_status, JobStatus::Failed);
        assert_eq!(job.failed, 2);
    }

    #[tokio::test]
    async fn empty_job_completes_without_calls() {
        let mut client = client(MockPolicy::AllFail);
        let job = dispatch_all(&mut client, &[]).await;
        assert_eq!(job.overall_status, JobStatus::Completed);
        assert_eq!(client.transport().stats().calls(), 0);
    }
}
