//! Operation kinds, executor task types, and the per-operation spec.

use serde::{Deserialize, Serialize};

use crate::types::FieldMap;

// ---------------------------------------------------------------------------
// OperationKind
// ---------------------------------------------------------------------------

/// Operation kind as written by the accounting front-end (`tipo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Cash count / income entry.
    Arqueo,
    /// Generic expense entry.
    Gasto,
    /// ADO 220 expense document.
    Ado220,
    /// PMP 450 payment document.
    Pmp450,
}

impl OperationKind {
    /// Every kind the dispatch core accepts.
    pub const ALL: [OperationKind; 4] = [Self::Arqueo, Self::Gasto, Self::Ado220, Self::Pmp450];

    /// Wire name (`tipo` value).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arqueo => "arqueo",
            Self::Gasto => "gasto",
            Self::Ado220 => "ado220",
            Self::Pmp450 => "pmp450",
        }
    }

    /// Parse a `tipo` value. Returns `None` for anything unrecognized.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "arqueo" => Some(Self::Arqueo),
            "gasto" => Some(Self::Gasto),
            "ado220" => Some(Self::Ado220),
            "pmp450" => Some(Self::Pmp450),
            _ => None,
        }
    }

    /// Executor task type that handles this kind.
    pub fn task_type(self) -> TaskType {
        match self {
            Self::Arqueo => TaskType::Arqueo,
            Self::Gasto | Self::Ado220 | Self::Pmp450 => TaskType::Gasto,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskType
// ---------------------------------------------------------------------------

/// Executor-side task type. Each one owns a durable queue on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Arqueo,
    Gasto,
}

impl TaskType {
    /// Every task type, in declaration order.
    pub const ALL: [TaskType; 2] = [Self::Arqueo, Self::Gasto];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arqueo => "arqueo",
            Self::Gasto => "gasto",
        }
    }

    /// Routing key used when publishing to the task exchange.
    pub fn routing_key(self) -> String {
        format!("task.{}", self.as_str())
    }

    /// Name of the durable queue bound under [`routing_key`](Self::routing_key).
    pub fn queue_name(self) -> String {
        format!("sical_queue.{}", self.as_str())
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OperationSpec
// ---------------------------------------------------------------------------

/// Keys the executors read from every operation. Arqueo uses
/// `fecha_ingreso` through `texto_sical`; expense kinds use `fecha` through
/// `aplicaciones`.
pub const EXECUTOR_FIELDS: [&str; 11] = [
    "caja",
    "tercero",
    "fecha_ingreso",
    "naturaleza",
    "final",
    "texto_sical",
    "fecha",
    "fpago",
    "tpago",
    "texto",
    "aplicaciones",
];

/// Build an operation id: `<job_id>_<index>` with the index zero-padded to
/// three digits.
pub fn format_op_id(job_id: &str, index: usize) -> String {
    format!("{job_id}_{index:03}")
}

/// One independently dispatchable operation.
///
/// Built by [`decompose`](crate::decompose::decompose); immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    /// Position in the job's operation list.
    pub index: usize,
    pub op_id: String,
    pub kind: OperationKind,
    /// Detail fields plus any job-level context copied in.
    pub fields: FieldMap,
}

impl OperationSpec {
    pub fn task_type(&self) -> TaskType {
        self.kind.task_type()
    }

    /// Cash register / account the operation targets, when present.
    pub fn target(&self) -> Option<&str> {
        self.fields.get("caja").and_then(|v| v.as_str())
    }

    /// Operation object sent to the executor.
    ///
    /// Every key in [`EXECUTOR_FIELDS`] is present, `null` when the detail
    /// lacks it. `fecha_ingreso` defaults to the detail's `fecha`. Other
    /// detail fields pass through. `op_id` and `tipo` always win over
    /// same-named detail fields.
    pub fn payload(&self) -> serde_json::Value {
        let mut payload = self.fields.clone();
        for key in EXECUTOR_FIELDS {
            payload.entry(key).or_insert(serde_json::Value::Null);
        }
        if payload.get("fecha_ingreso").map_or(true, |v| v.is_null()) {
            let fecha = payload.get("fecha").cloned().unwrap_or_default();
            payload.insert("fecha_ingreso".into(), fecha);
        }
        payload.insert("op_id".into(), self.op_id.clone().into());
        payload.insert("tipo".into(), self.kind.as_str().into());
        serde_json::Value::Object(payload)
    }
}
