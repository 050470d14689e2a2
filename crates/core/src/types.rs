/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Free-form JSON object passed through to the executor untouched.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;
