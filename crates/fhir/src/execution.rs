//! Calculation engine output wire models.
//!
//! The external engine evaluates a measure bundle against a batch of patient bundles and reports,
//! per patient and per measure group:
//! - `statementResults`: the raw value each CQL statement produced
//! - `populationResults`: whether the patient landed in each population, plus observations
//!
//! The engine emits many more keys than are modelled here (clause results, evaluated resources,
//! HTML highlighting). Unknown keys are ignored; only the shapes the workbench relies on are
//! strict.

use crate::{FhirError, FhirResult, MeasurePopulationCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level engine response.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalculationOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ExecutionResult>>,
}

impl CalculationOutput {
    /// Wraps a batch of per-patient results.
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: Some(results),
        }
    }

    /// Returns the per-patient results, treating an absent list as empty.
    pub fn results(&self) -> &[ExecutionResult] {
        self.results.as_deref().unwrap_or_default()
    }
}

/// Results for a single patient (one test case).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub patient_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_results: Option<Vec<DetailedGroupResult>>,
}

/// Results for one measure group of one patient.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetailedGroupResult {
    pub group_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_results: Option<Vec<StatementResult>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population_results: Option<Vec<PopulationResult>>,
}

/// The outcome of evaluating a single CQL statement.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatementResult {
    pub statement_name: String,

    #[serde(default)]
    pub library_name: String,

    #[serde(default)]
    pub raw: RawValue,

    #[serde(rename = "final", default)]
    pub final_result: FinalResult,

    #[serde(default)]
    pub relevance: Relevance,
}

/// The raw value a statement evaluated to.
///
/// The engine reports whatever the CQL produced: nothing, a boolean, a list of resources, or
/// (rarely) some other scalar or object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(from = "Option<Value>", into = "Option<Value>")]
pub enum RawValue {
    /// Absent or `null`.
    #[default]
    Undefined,
    Boolean(bool),
    List(Vec<Value>),
    /// Any other JSON value (number, string, object).
    Scalar(Value),
}

impl From<Option<Value>> for RawValue {
    fn from(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => RawValue::Undefined,
            Some(Value::Bool(b)) => RawValue::Boolean(b),
            Some(Value::Array(items)) => RawValue::List(items),
            Some(other) => RawValue::Scalar(other),
        }
    }
}

impl From<RawValue> for Option<Value> {
    fn from(value: RawValue) -> Self {
        match value {
            RawValue::Undefined => None,
            RawValue::Boolean(b) => Some(Value::Bool(b)),
            RawValue::List(items) => Some(Value::Array(items)),
            RawValue::Scalar(other) => Some(other),
        }
    }
}

/// Final clause/statement result as reported by the engine.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum FinalResult {
    #[default]
    #[serde(rename = "NA")]
    Na,
    #[serde(rename = "UNHIT")]
    Unhit,
    #[serde(rename = "TRUE")]
    True,
    #[serde(rename = "FALSE")]
    False,
}

/// Whether a statement was relevant to the population outcome.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum Relevance {
    #[default]
    #[serde(rename = "NA")]
    Na,
    #[serde(rename = "TRUE")]
    True,
    #[serde(rename = "FALSE")]
    False,
}

/// Membership outcome for one population.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PopulationResult {
    /// Wire population code, e.g. `initial-population`.
    pub population_type: String,

    pub result: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<Vec<Value>>,
}

impl PopulationResult {
    /// Parsed population code, if the engine reported a known one.
    pub fn code(&self) -> Option<MeasurePopulationCode> {
        MeasurePopulationCode::from_wire(&self.population_type)
    }

    /// The first observation as a number.
    ///
    /// Only the first observation takes part in expectation checks.
    pub fn first_observation(&self) -> Option<f64> {
        self.observations
            .as_ref()
            .and_then(|obs| obs.first())
            .and_then(Value::as_f64)
    }
}

/// Parse engine output from JSON text.
///
/// Accepts either `{"results": [...]}` or a bare results array. This uses
/// `serde_path_to_error` so schema mismatches name the failing field (e.g.
/// `results[0].detailedResults[0].groupId`).
///
/// # Errors
///
/// Returns [`FhirError::Translation`] when the text is not valid engine output.
pub fn parse_calculation_output(json_text: &str) -> FhirResult<CalculationOutput> {
    let value: Value = serde_json::from_str(json_text)?;

    if value.is_array() {
        let results: Vec<ExecutionResult> = deserialize_at_path(value)?;
        return Ok(CalculationOutput::new(results));
    }

    deserialize_at_path(value)
}

fn deserialize_at_path<T: serde::de::DeserializeOwned>(value: Value) -> FhirResult<T> {
    serde_path_to_error::deserialize(value).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        FhirError::Translation(format!("calculation output schema mismatch at {path}: {source}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_values_dispatch_on_shape() {
        let statement: StatementResult = serde_json::from_value(json!({
            "statementName": "ippDef",
            "libraryName": "MeasureLib",
            "raw": [{}, {}],
            "final": "TRUE",
            "relevance": "TRUE"
        }))
        .unwrap();
        assert_eq!(statement.raw, RawValue::List(vec![json!({}), json!({})]));
        assert_eq!(statement.final_result, FinalResult::True);

        let missing: StatementResult =
            serde_json::from_value(json!({ "statementName": "denomDef" })).unwrap();
        assert_eq!(missing.raw, RawValue::Undefined);
        assert_eq!(missing.relevance, Relevance::Na);

        let null: StatementResult =
            serde_json::from_value(json!({ "statementName": "x", "raw": null })).unwrap();
        assert_eq!(null.raw, RawValue::Undefined);

        let scalar: StatementResult =
            serde_json::from_value(json!({ "statementName": "x", "raw": 3 })).unwrap();
        assert_eq!(scalar.raw, RawValue::Scalar(json!(3)));
    }

    #[test]
    fn parses_output_with_population_results() {
        let text = r#"{
            "results": [{
                "patientId": "tc-1",
                "detailedResults": [{
                    "groupId": "group1",
                    "statementResults": [],
                    "populationResults": [
                        { "populationType": "initial-population", "result": true },
                        { "populationType": "measure-observation", "result": true, "observations": [12, 4] }
                    ],
                    "html": "<div/>"
                }],
                "evaluatedResource": []
            }]
        }"#;

        let output = parse_calculation_output(text).unwrap();
        let group = &output.results()[0].detailed_results.as_ref().unwrap()[0];
        let populations = group.population_results.as_ref().unwrap();
        assert_eq!(
            populations[0].code(),
            Some(MeasurePopulationCode::InitialPopulation)
        );
        assert_eq!(populations[1].first_observation(), Some(12.0));
    }

    #[test]
    fn parses_bare_results_array() {
        let output = parse_calculation_output(r#"[{ "patientId": "P111" }]"#).unwrap();
        assert_eq!(output.results().len(), 1);
        assert!(output.results()[0].detailed_results.is_none());
    }

    #[test]
    fn reports_path_of_schema_mismatch() {
        let err = parse_calculation_output(r#"[{ "patientId": 7 }]"#).unwrap_err();
        match err {
            FhirError::Translation(msg) => assert!(msg.contains("patientId"), "{msg}"),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_results_is_empty() {
        let output = parse_calculation_output("{}").unwrap();
        assert!(output.results().is_empty());
    }
}
