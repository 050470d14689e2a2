#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown operation type '{tipo}' at index {index}")]
    UnknownOperationKind { index: usize, tipo: String },
}
