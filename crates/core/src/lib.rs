//! # CQM Core
//!
//! Core business logic for the CQM test case workbench.
//!
//! This crate contains pure data operations and file-backed storage:
//! - flattening engine output into per-statement counts ([`flatten`])
//! - comparing engine population results with test case expectations ([`comparison`])
//! - pass statistics across a measure's test cases ([`stats`])
//! - batched calculation and serialized execution runs ([`calculation`], [`execution`])
//! - measure and test case storage under `CQM_DATA_DIR` ([`repositories`])
//!
//! **No API concerns**: HTTP servers and command-line handling belong in `api-rest` and
//! `cqm-cli`.

pub mod calculation;
pub mod comparison;
pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod flatten;
pub mod measure;
pub mod population;
pub mod repositories;
pub mod stats;
pub mod test_case;
pub mod validation;

pub use calculation::{
    CalculationRequest, CalculationService, Calculator, PatientBundle, RecordedCalculator,
};
pub use comparison::{apply_execution, compare_test_case, Comparison};
pub use config::{resolve_data_dir, CoreConfig};
pub use error::{CqmError, CqmResult};
pub use execution::{ExecutionRun, ExecutionService};
pub use flatten::{
    flatten_results, statement_count, statement_coverage, FlattenedResults, StatementCounts,
    StatementCoverage,
};
pub use measure::{Acl, Group, Measure, Population};
pub use population::{
    populations_for_scoring, propagate_population_change, MeasureScoring, PopulationType,
};
pub use repositories::{MeasureService, TestCaseService};
pub use stats::{aggregate, PassingStats};
pub use test_case::{
    ExecutionStatus, ExpectedValue, GroupPopulation, PopulationExpectedValue, StratificationValue,
    TestCase,
};

// Re-export the boundary types callers need alongside core results.
pub use fhir::{parse_calculation_output, CalculationOutput, DetailedGroupResult, ExecutionResult};
