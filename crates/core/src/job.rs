//! Job file model.
//!
//! A job file is the JSON document the accounting front-end drops into the
//! pending area. Field names on the wire are the front-end's (`operaciones`,
//! `tipo`, `detalle`); the Rust side uses English names.

use serde::{Deserialize, Serialize};

use crate::types::FieldMap;

/// One parsed job file.
///
/// Read once and never mutated; the store relocates the file itself after
/// processing.
#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    /// Source filename, e.g. `mov_0042.json`. Set by the loader, not part of
    /// the document.
    #[serde(skip)]
    pub id: String,

    /// Operations in the order they must be dispatched.
    #[serde(rename = "operaciones")]
    pub operations: Vec<OperationRecord>,

    /// Operation count as declared by the producer. Informational only, kept
    /// raw so an oddly typed value never rejects the job.
    #[serde(rename = "num_operaciones", default)]
    pub declared_count: Option<serde_json::Value>,

    /// Net amount of all operations as declared by the producer. Raw for the
    /// same reason as `declared_count`.
    #[serde(rename = "liquido_operaciones", default)]
    pub declared_total: Option<serde_json::Value>,

    /// Bank movement the operations were derived from, if any.
    #[serde(default)]
    pub bank_movement: Option<BankMovement>,
}

/// A single operation entry as it appears in the job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Operation kind discriminator, e.g. `"arqueo"` or `"ado220"`.
    #[serde(rename = "tipo")]
    pub kind: String,

    /// Business fields. Opaque to the dispatch core.
    #[serde(rename = "detalle")]
    pub detail: FieldMap,
}

/// Originating bank movement shared by every operation in a job.
///
/// Values are kept as raw JSON since the producer's column types vary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankMovement {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub caja: Option<serde_json::Value>,
    #[serde(default)]
    pub fecha: Option<serde_json::Value>,
    #[serde(default)]
    pub concepto: Option<serde_json::Value>,
    #[serde(default)]
    pub importe: Option<serde_json::Value>,
    #[serde(default)]
    pub saldo: Option<serde_json::Value>,
}

impl JobFile {
    /// Parse a job document and tag it with its source filename.
    pub fn parse(id: impl Into<String>, bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut job: JobFile = serde_json::from_slice(bytes)?;
        job.id = id.into();
        Ok(job)
    }

    /// `num_operaciones` as a count, if it is a non-negative integer or a
    /// string holding one.
    pub fn count_hint(&self) -> Option<u64> {
        match self.declared_count.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// `liquido_operaciones` as an amount, if it is a number or a string
    /// holding one.
    pub fn total_hint(&self) -> Option<f64> {
        match self.declared_total.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl BankMovement {
    /// Context fields copied into every derived operation.
    ///
    /// Missing attributes are emitted as `null` so the executor always sees
    /// the same key set.
    pub fn context_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        let pairs = [
            ("bank_movement_id", &self.id),
            ("bank_caja", &self.caja),
            ("bank_fecha", &self.fecha),
            ("bank_concepto", &self.concepto),
            ("bank_importe", &self.importe),
            ("bank_saldo", &self.saldo),
        ];
        for (key, value) in pairs {
            fields.insert(
                key.to_string(),
                value.clone().unwrap_or(serde_json::Value::Null),
            );
        }
        fields
    }

    /// Short human label used in log lines.
    pub fn concept_preview(&self) -> Option<String> {
        let concept = self.concepto.as_ref()?.as_str()?;
        Some(concept.chars().take(50).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_job() {
        let json = br#"{"operaciones":[{"tipo":"arqueo","detalle":{"caja":"200"}}]}"#;
        let job = JobFile::parse("job.json", json).unwrap();
        assert_eq!(job.id, "job.json");
        assert_eq!(job.operations.len(), 1);
        assert_eq!(job.operations[0].kind, "arqueo");
        assert_eq!(job.operations[0].detail["caja"], "200");
        assert!(job.bank_movement.is_none());
        assert!(job.declared_count.is_none());
    }

    #[test]
    fn parse_job_with_metadata() {
        let json = br#"{
            "num_operaciones": 2,
            "liquido_operaciones": 150.5,
            "bank_movement": {"id": 7, "caja": "201", "concepto": "TRANSFER"},
            "operaciones": [
                {"tipo": "arqueo", "detalle": {}},
                {"tipo": "ado220", "detalle": {"aplicaciones": [{"importe": 10}]}}
            ]
        }"#;
        let job = JobFile::parse("mov.json", json).unwrap();
        assert_eq!(job.count_hint(), Some(2));
        assert_eq!(job.total_hint(), Some(150.5));
        let bank = job.bank_movement.unwrap();
        assert_eq!(bank.id, Some(serde_json::json!(7)));
        assert!(bank.saldo.is_none());
    }

    #[test]
    fn oddly_typed_metadata_does_not_reject_the_job() {
        let json = br#"{
            "num_operaciones": "1",
            "liquido_operaciones": "12,50",
            "operaciones": [{"tipo": "arqueo", "detalle": {}}]
        }"#;
        let job = JobFile::parse("odd.json", json).unwrap();
        assert_eq!(job.operations.len(), 1);
        assert_eq!(job.count_hint(), Some(1));
        assert!(job.declared_total.is_some());
        assert_eq!(job.total_hint(), None);

        let json = br#"{"num_operaciones": -3, "liquido_operaciones": null,
                        "operaciones": []}"#;
        let job = JobFile::parse("neg.json", json).unwrap();
        assert_eq!(job.count_hint(), None);
        assert_eq!(job.total_hint(), None);
    }

    #[test]
    fn missing_operations_list_is_rejected() {
        assert!(JobFile::parse("x.json", br#"{"num_operaciones": 1}"#).is_err());
    }

    #[test]
    fn operation_without_detail_is_rejected() {
        assert!(JobFile::parse("x.json", br#"{"operaciones":[{"tipo":"arqueo"}]}"#).is_err());
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(JobFile::parse("x.json", b"{not json").is_err());
    }

    #[test]
    fn context_fields_cover_every_attribute() {
        let bank = BankMovement {
            id: Some(serde_json::json!("m-1")),
            importe: Some(serde_json::json!(-42.1)),
            ..Default::default()
        };
        let fields = bank.context_fields();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields["bank_movement_id"], "m-1");
        assert_eq!(fields["bank_importe"], -42.1);
        assert!(fields["bank_caja"].is_null());
    }

    #[test]
    fn concept_preview_truncates() {
        let bank = BankMovement {
            concepto: Some(serde_json::json!("x".repeat(80))),
            ..Default::default()
        };
        assert_eq!(bank.concept_preview().unwrap().len(), 50);
    }
}
