//! Job decomposition: one job file into an ordered list of operations.

use crate::error::CoreError;
use crate::job::JobFile;
use crate::operation::{format_op_id, OperationKind, OperationSpec};

/// Expand a job into its operations.
///
/// Index is the position in the source list. Job-level bank context is
/// copied into every operation so each one stands on its own at the
/// executor. Fails on the first unrecognized `tipo`.
pub fn decompose(job: &JobFile) -> Result<Vec<OperationSpec>, CoreError> {
    let context = job
        .bank_movement
        .as_ref()
        .map(|bank| bank.context_fields())
        .unwrap_or_default();

    job.operations
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let kind = OperationKind::from_name(&record.kind).ok_or_else(|| {
                CoreError::UnknownOperationKind {
                    index,
                    tipo: record.kind.clone(),
                }
            })?;

            let mut fields = record.detail.clone();
            for (key, value) in &context {
                fields.insert(key.clone(), value.clone());
            }

            Ok(OperationSpec {
                index,
                op_id: format_op_id(&job.id, index),
                kind,
                fields,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn job(json: &str) -> JobFile {
        JobFile::parse("batch.json", json.as_bytes()).unwrap()
    }

    #[test]
    fn indexes_follow_source_order() {
        let job = job(
            r#"{"operaciones":[
                {"tipo":"arqueo","detalle":{"caja":"200"}},
                {"tipo":"ado220","detalle":{"caja":"201"}},
                {"tipo":"gasto","detalle":{"caja":"202"}}
            ]}"#,
        );
        let ops = decompose(&job).unwrap();
        assert_eq!(ops.len(), 3);
        for (i, op) in ops.iter().enumerate() {
            assert_eq!(op.index, i);
            assert_eq!(op.op_id, format!("batch.json_{i:03}"));
        }
        assert_eq!(ops[1].kind, OperationKind::Ado220);
        assert_eq!(ops[2].target(), Some("202"));
    }

    #[test]
    fn decomposition_is_deterministic() {
        let job = job(r#"{"operaciones":[{"tipo":"arqueo","detalle":{"a":1}}]}"#);
        assert_eq!(decompose(&job).unwrap(), decompose(&job).unwrap());
    }

    #[test]
    fn bank_context_copied_into_every_operation() {
        let job = job(
            r#"{
                "bank_movement": {"id": "m-9", "importe": 120.0, "concepto": "PAGO"},
                "operaciones": [
                    {"tipo":"arqueo","detalle":{}},
                    {"tipo":"gasto","detalle":{}}
                ]
            }"#,
        );
        let ops = decompose(&job).unwrap();
        for op in &ops {
            assert_eq!(op.fields["bank_movement_id"], "m-9");
            assert_eq!(op.fields["bank_importe"], 120.0);
            assert_eq!(op.fields["bank_concepto"], "PAGO");
        }
    }

    #[test]
    fn no_bank_context_means_no_bank_fields() {
        let job = job(r#"{"operaciones":[{"tipo":"arqueo","detalle":{"caja":"1"}}]}"#);
        let ops = decompose(&job).unwrap();
        assert!(!ops[0].fields.contains_key("bank_movement_id"));
        assert_eq!(ops[0].fields.len(), 1);
    }

    #[test]
    fn unknown_kind_fails_with_position() {
        let job = job(
            r#"{"operaciones":[
                {"tipo":"arqueo","detalle":{}},
                {"tipo":"transferencia","detalle":{}}
            ]}"#,
        );
        assert_matches!(
            decompose(&job),
            Err(CoreError::UnknownOperationKind { index: 1, ref tipo }) if tipo == "transferencia"
        );
    }

    #[test]
    fn empty_job_has_no_operations() {
        let job = job(r#"{"operaciones":[]}"#);
        assert!(decompose(&job).unwrap().is_empty());
    }
}
