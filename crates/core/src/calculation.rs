//! Calculation of test cases against a measure.
//!
//! The measure logic itself is evaluated by an external engine. This module shapes the engine
//! request (one measure bundle plus one patient bundle per test case) and hides the engine behind
//! the [`Calculator`] trait so runs can be replayed from captured output.

use crate::measure::Measure;
use crate::test_case::TestCase;
use crate::{CqmError, CqmResult};
use fhir::{build_measure_bundle, build_patient_bundle, parse_calculation_output, CalculationOutput};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// A patient bundle submitted for calculation, keyed by the test case it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct PatientBundle {
    /// Test case id, also stamped onto every Patient resource in `bundle`.
    pub patient_id: String,
    pub bundle: Value,
}

/// Everything the engine needs for one batched calculation.
#[derive(Clone, Debug, PartialEq)]
pub struct CalculationRequest {
    pub measure_bundle: Value,
    pub patient_bundles: Vec<PatientBundle>,
    pub measurement_period_start: Option<String>,
    pub measurement_period_end: Option<String>,
}

impl CalculationRequest {
    pub fn patient_ids(&self) -> impl Iterator<Item = &str> {
        self.patient_bundles.iter().map(|p| p.patient_id.as_str())
    }
}

/// The seam to the measure calculation engine.
pub trait Calculator: Send + Sync {
    fn calculate(&self, request: &CalculationRequest) -> CqmResult<CalculationOutput>;
}

/// Replays previously captured engine output.
///
/// Only results for patients named in the request are returned, so excluded test cases never
/// receive a result.
#[derive(Clone, Debug, Default)]
pub struct RecordedCalculator {
    output: CalculationOutput,
}

impl RecordedCalculator {
    pub fn new(output: CalculationOutput) -> Self {
        Self { output }
    }

    /// Load captured output from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `CqmError::FileRead` if the file cannot be read, or `CqmError::Fhir` if it is not
    /// valid engine output.
    pub fn from_file(path: &Path) -> CqmResult<Self> {
        let text = std::fs::read_to_string(path).map_err(CqmError::FileRead)?;
        Ok(Self::new(parse_calculation_output(&text)?))
    }
}

impl Calculator for RecordedCalculator {
    fn calculate(&self, request: &CalculationRequest) -> CqmResult<CalculationOutput> {
        let requested: HashSet<&str> = request.patient_ids().collect();
        let results = self
            .output
            .results()
            .iter()
            .filter(|r| requested.contains(r.patient_id.as_str()))
            .cloned()
            .collect();
        Ok(CalculationOutput::new(results))
    }
}

/// Builds calculation requests and invokes the configured [`Calculator`].
#[derive(Clone)]
pub struct CalculationService {
    calculator: Arc<dyn Calculator>,
}

impl CalculationService {
    pub fn new(calculator: Arc<dyn Calculator>) -> Self {
        Self { calculator }
    }

    /// Calculate every given test case against `measure` in one engine call.
    ///
    /// # Errors
    ///
    /// Any failure, whether shaping a bundle or inside the engine, is reported as
    /// `CqmError::Calculation` so callers can show a single message.
    pub fn calculate_test_cases(
        &self,
        measure: &Measure,
        test_cases: &[TestCase],
    ) -> CqmResult<CalculationOutput> {
        let request = build_request(measure, test_cases).map_err(into_calculation_error)?;
        tracing::debug!(
            measure_id = %measure.id,
            patients = request.patient_bundles.len(),
            "submitting calculation"
        );
        self.calculator
            .calculate(&request)
            .map_err(into_calculation_error)
    }
}

fn build_request(measure: &Measure, test_cases: &[TestCase]) -> CqmResult<CalculationRequest> {
    let patient_bundles = test_cases
        .iter()
        .map(|tc| -> CqmResult<PatientBundle> {
            let bundle = match tc.json.as_deref().filter(|j| !j.trim().is_empty()) {
                Some(text) => build_patient_bundle(text, &tc.id)?,
                None => empty_bundle(),
            };
            Ok(PatientBundle {
                patient_id: tc.id.clone(),
                bundle,
            })
        })
        .collect::<CqmResult<Vec<_>>>()?;

    Ok(CalculationRequest {
        measure_bundle: build_measure_bundle(&measure.bundle_input()),
        patient_bundles,
        measurement_period_start: measure.measurement_period_start.clone(),
        measurement_period_end: measure.measurement_period_end.clone(),
    })
}

fn empty_bundle() -> Value {
    json!({ "resourceType": "Bundle", "type": "collection", "entry": [] })
}

fn into_calculation_error(err: CqmError) -> CqmError {
    match err {
        CqmError::Calculation(_) => err,
        other => {
            tracing::error!("calculation failed: {}", other);
            CqmError::Calculation(Box::new(other))
        }
    }
}
