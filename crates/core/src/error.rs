use crate::constants::{CALCULATION_FAILED_MESSAGE, CQL_ERRORS_MESSAGE};

#[derive(Debug, thiserror::Error)]
pub enum CqmError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("user {user} may not edit measure {measure_id}")]
    Forbidden { user: String, measure_id: String },
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize {}: {source}", .path.display())]
    Deserialization {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("FHIR error: {0}")]
    Fhir(#[from] fhir::FhirError),
    #[error("invalid text: {0}")]
    Text(#[from] cqm_types::TextError),

    #[error("{}", CQL_ERRORS_MESSAGE)]
    CqlErrors,
    #[error("test case execution is already in progress")]
    ExecutionInProgress,
    #[error("{}", CALCULATION_FAILED_MESSAGE)]
    Calculation(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type CqmResult<T> = std::result::Result<T, CqmError>;
