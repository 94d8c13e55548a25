//! FHIR and calculation-engine boundary support for the CQM workbench.
//!
//! This crate provides **wire models** and **format/translation helpers** for everything that
//! crosses the boundary to the external measure calculation engine and the FHIR validation
//! server:
//! - measure population codes as understood by the engine
//! - calculation output (per patient, per group, per statement/population results)
//! - measure and patient bundle construction
//! - HAPI operation outcomes returned when a test case bundle is validated
//!
//! This crate focuses on:
//! - FHIR semantic alignment (without FHIR REST transport)
//! - strict JSON serialisation/deserialisation
//! - translation between engine shapes and simple domain primitives
//!
//! It does not evaluate CQL or interpret FHIR resources beyond what bundle shaping needs.

pub mod bundle;
pub mod execution;
pub mod operation_outcome;
pub mod population_code;

// Re-export public wire and domain-level types
pub use bundle::{build_measure_bundle, build_patient_bundle, BundlePopulation, MeasureBundleInput};
pub use execution::{
    parse_calculation_output, CalculationOutput, DetailedGroupResult, ExecutionResult,
    FinalResult, PopulationResult, RawValue, Relevance, StatementResult,
};
pub use operation_outcome::{
    outcome_is_valid, HapiOperationOutcome, OutcomeIssue, OutcomeResponse, ValidationIssue,
};
pub use population_code::MeasurePopulationCode;

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
