//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{json, Value};
use sical_broker::mock::{MockPolicy, MockStats, MockTransport};
use sical_broker::{DispatchConfig, RetryPolicy};
use sical_store::{JobAreas, JobStore, TerminalArea};
use sical_worker::JobRunner;
use tempfile::TempDir;

/// A throwaway input directory with all four areas.
pub struct Fixture {
    _dir: TempDir,
    pub store: JobStore,
    pub stats: MockStats,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = JobStore::open(JobAreas::under(dir.path())).expect("open store");
        Self {
            _dir: dir,
            store,
            stats: MockStats::default(),
        }
    }

    pub fn areas(&self) -> &JobAreas {
        self.store.areas()
    }

    /// Drop a job document into the pending area.
    pub fn write_job(&self, name: &str, body: &Value) {
        let path = self.areas().pending.join(name);
        std::fs::write(path, serde_json::to_vec_pretty(body).unwrap()).unwrap();
    }

    pub fn write_raw(&self, name: &str, body: &str) {
        std::fs::write(self.areas().pending.join(name), body).unwrap();
    }

    /// Runner whose transports answer according to `policy` and report into
    /// this fixture's counters.
    pub fn runner(&self, policy: MockPolicy) -> JobRunner<impl FnMut() -> MockTransport> {
        self.runner_with(policy, 0, fast_dispatch())
    }

    pub fn runner_with(
        &self,
        policy: MockPolicy,
        connect_failures: usize,
        dispatch: DispatchConfig,
    ) -> JobRunner<impl FnMut() -> MockTransport> {
        let stats = self.stats.clone();
        JobRunner::new(self.store.clone(), dispatch, move || {
            MockTransport::new(policy)
                .with_stats(stats.clone())
                .with_connect_failures(connect_failures)
        })
    }

    pub fn path_in(&self, area: TerminalArea, name: &str) -> PathBuf {
        self.areas().terminal(area).join(name)
    }

    /// Parsed `_results.json` companion for `job` in `area`.
    pub fn results(&self, area: TerminalArea, job: &str) -> Value {
        let stem = job.strip_suffix(".json").unwrap_or(job);
        let path = self.path_in(area, &format!("{stem}_results.json"));
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap()
    }

    /// Every directory currently holding `job`.
    pub fn locations(&self, job: &str) -> Vec<PathBuf> {
        sical_store::locate(self.areas(), job)
    }
}

/// No waiting between connect attempts and a short reply deadline.
pub fn fast_dispatch() -> DispatchConfig {
    DispatchConfig {
        reply_timeout: Duration::from_secs(2),
        retry: RetryPolicy::immediate(2),
        ..DispatchConfig::default()
    }
}

/// Job document with one operation per `(tipo, caja)` pair.
pub fn job(ops: &[(&str, &str)]) -> Value {
    let operaciones: Vec<Value> = ops
        .iter()
        .map(|(tipo, caja)| {
            json!({
                "tipo": tipo,
                "detalle": {
                    "caja": caja,
                    "tercero": "B35000000",
                    "fecha": "2025-03-14",
                    "importe": 10.5
                }
            })
        })
        .collect();
    json!({
        "num_operaciones": ops.len(),
        "liquido_operaciones": 10.5 * ops.len() as f64,
        "bank_movement": {
            "id": "MOV-1",
            "caja": "200",
            "fecha": "2025-03-14",
            "concepto": "TRANSFERENCIA RECIBIDA",
            "importe": 31.5,
            "saldo": 1200.0
        },
        "operaciones": operaciones
    })
}

/// The three-operation job used by most scenarios.
pub fn three_op_job() -> Value {
    job(&[("arqueo", "200"), ("gasto", "201"), ("ado220", "202")])
}
