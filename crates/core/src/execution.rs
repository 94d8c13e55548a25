//! Test case execution runs.
//!
//! A run calculates every executable test case of a measure in one batched engine call, compares
//! each test case's expectations with its results and summarises the outcome. Runs are
//! all-or-nothing: the updated test cases are only handed back once every step has succeeded, so
//! a failed run leaves the caller's statuses untouched.

use crate::calculation::CalculationService;
use crate::comparison::apply_execution;
use crate::flatten::{flatten_results, FlattenedResults};
use crate::measure::Measure;
use crate::stats::{aggregate, PassingStats};
use crate::test_case::TestCase;
use crate::{CqmError, CqmResult};
use fhir::DetailedGroupResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything an execution run produced.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRun {
    /// Test cases with refreshed `actual` values and execution status, in input order.
    pub test_cases: Vec<TestCase>,
    /// Engine group results keyed by test case id.
    pub detailed_results: BTreeMap<String, Vec<DetailedGroupResult>>,
    pub flattened: FlattenedResults,
    pub stats: PassingStats,
}

/// Runs test cases against measures, one run at a time.
#[derive(Clone)]
pub struct ExecutionService {
    calculation: CalculationService,
    in_flight: Arc<AtomicBool>,
}

/// Releases the in-flight flag when the run ends, whichever way it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> CqmResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CqmError::ExecutionInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ExecutionService {
    pub fn new(calculation: CalculationService) -> Self {
        Self {
            calculation,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A service calculating through `calculation` that shares this service's run guard.
    ///
    /// Used when each request brings its own calculator but runs must still be serialized.
    pub fn with_calculation(&self, calculation: CalculationService) -> Self {
        Self {
            calculation,
            in_flight: self.in_flight.clone(),
        }
    }

    /// True while a run is in progress.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Execute every test case of `measure`.
    ///
    /// Test cases marked `Invalid` are not calculated and keep their status.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `CqmError::CqlErrors` if the measure CQL has errors,
    /// - `CqmError::ExecutionInProgress` if another run has not finished,
    /// - `CqmError::Calculation` if the engine call fails.
    pub fn execute_all(
        &self,
        measure: &Measure,
        test_cases: &[TestCase],
    ) -> CqmResult<ExecutionRun> {
        ensure_executable(measure)?;
        let _guard = RunGuard::acquire(&self.in_flight)?;

        let executable: Vec<TestCase> = test_cases
            .iter()
            .filter(|tc| tc.is_executable())
            .cloned()
            .collect();
        tracing::info!(
            measure_id = %measure.id,
            "executing {} of {} test cases",
            executable.len(),
            test_cases.len()
        );

        let output = self.calculation.calculate_test_cases(measure, &executable)?;

        let detailed_results: BTreeMap<String, Vec<DetailedGroupResult>> = output
            .results()
            .iter()
            .map(|r| {
                (
                    r.patient_id.clone(),
                    r.detailed_results.clone().unwrap_or_default(),
                )
            })
            .collect();

        let updated: Vec<TestCase> = test_cases
            .iter()
            .map(|tc| {
                if !tc.is_executable() {
                    return tc.clone();
                }
                let next = apply_execution(tc, detailed_results.get(&tc.id).map(Vec::as_slice));
                tracing::debug!(test_case_id = %tc.id, status = %next.execution_status, "compared");
                next
            })
            .collect();

        let stats = aggregate(&updated);
        tracing::info!(
            measure_id = %measure.id,
            "execution finished: {}% passing ({})",
            stats.pass_percentage,
            stats.pass_fail_ratio
        );

        Ok(ExecutionRun {
            test_cases: updated,
            flattened: flatten_results(output.results.as_deref()),
            detailed_results,
            stats,
        })
    }

    /// Calculate a single test case and return its results for the first measure group.
    ///
    /// # Errors
    ///
    /// Same as [`ExecutionService::execute_all`].
    pub fn execute_one(
        &self,
        measure: &Measure,
        test_case: &TestCase,
    ) -> CqmResult<Option<DetailedGroupResult>> {
        ensure_executable(measure)?;
        let _guard = RunGuard::acquire(&self.in_flight)?;

        let output = self
            .calculation
            .calculate_test_cases(measure, std::slice::from_ref(test_case))?;

        Ok(output
            .results()
            .iter()
            .find(|r| r.patient_id == test_case.id)
            .and_then(|r| r.detailed_results.as_deref())
            .and_then(<[DetailedGroupResult]>::first)
            .cloned())
    }
}

fn ensure_executable(measure: &Measure) -> CqmResult<()> {
    if measure.cql_errors {
        tracing::warn!(measure_id = %measure.id, "refusing to execute measure with CQL errors");
        return Err(CqmError::CqlErrors);
    }
    Ok(())
}
