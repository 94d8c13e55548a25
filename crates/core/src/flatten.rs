//! Flattening of raw engine output into per-statement counts.
//!
//! The engine reports, per patient and per group, the raw value every CQL statement produced.
//! Coverage display only needs to know how many times a statement produced something, so each
//! raw value is reduced to a count:
//!
//! ```text
//! patientId -> groupId -> statementName -> count
//! ```

use fhir::{ExecutionResult, RawValue};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Statement counts keyed by statement name.
pub type StatementCounts = BTreeMap<String, u64>;

/// Flattened engine output: `patientId -> groupId -> statementName -> count`.
pub type FlattenedResults = BTreeMap<String, BTreeMap<String, StatementCounts>>;

/// Reduce a raw statement value to a count.
///
/// Lists count their elements and booleans count as 1 or 0, so both land in the same integer
/// domain. Other scalars count 1 when truthy.
pub fn statement_count(raw: &RawValue) -> u64 {
    match raw {
        RawValue::Undefined => 0,
        RawValue::Boolean(b) => u64::from(*b),
        RawValue::List(items) => items.len() as u64,
        RawValue::Scalar(value) => u64::from(is_truthy(value)),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Flatten engine output.
///
/// Every patient in the input gets an entry, even without detailed results, and every group gets
/// an entry under its patient, even without statement results. Absent or empty input yields an
/// empty map. A statement name repeated within a group keeps its last count.
pub fn flatten_results(results: Option<&[ExecutionResult]>) -> FlattenedResults {
    let mut flattened = FlattenedResults::new();

    for result in results.unwrap_or_default() {
        let groups = flattened.entry(result.patient_id.clone()).or_default();

        for group in result.detailed_results.as_deref().unwrap_or_default() {
            let statements = groups.entry(group.group_id.clone()).or_default();

            for statement in group.statement_results.as_deref().unwrap_or_default() {
                statements.insert(
                    statement.statement_name.clone(),
                    statement_count(&statement.raw),
                );
            }
        }
    }

    flattened
}

/// Which statements of one group produced a value for at least one patient.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementCoverage {
    pub group_id: String,
    pub covered: Vec<String>,
    pub uncovered: Vec<String>,
    pub percentage: u32,
}

/// Summarise statement coverage of `group_id` across every patient.
pub fn statement_coverage(flattened: &FlattenedResults, group_id: &str) -> StatementCoverage {
    let mut covered = BTreeSet::new();
    let mut seen = BTreeSet::new();

    for statements in flattened.values().filter_map(|groups| groups.get(group_id)) {
        for (name, count) in statements {
            seen.insert(name.clone());
            if *count > 0 {
                covered.insert(name.clone());
            }
        }
    }

    let total = seen.len();
    let percentage = if total == 0 {
        0
    } else {
        ((covered.len() as f64 * 100.0) / total as f64).round() as u32
    };

    StatementCoverage {
        group_id: group_id.to_owned(),
        uncovered: seen.difference(&covered).cloned().collect(),
        covered: covered.into_iter().collect(),
        percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir::{DetailedGroupResult, FinalResult, Relevance, StatementResult};
    use serde_json::json;

    fn statement(name: &str, raw: RawValue) -> StatementResult {
        StatementResult {
            statement_name: name.into(),
            library_name: "MeasureLib".into(),
            raw,
            final_result: FinalResult::Na,
            relevance: Relevance::Na,
        }
    }

    fn patient(id: &str, statements: Option<Vec<StatementResult>>) -> ExecutionResult {
        ExecutionResult {
            patient_id: id.into(),
            detailed_results: Some(vec![DetailedGroupResult {
                group_id: "group1".into(),
                statement_results: statements,
                population_results: None,
            }]),
        }
    }

    #[test]
    fn absent_and_empty_input_flatten_to_empty_map() {
        assert!(flatten_results(None).is_empty());
        assert!(flatten_results(Some(&[])).is_empty());
    }

    #[test]
    fn patients_without_detailed_results_still_appear() {
        for detailed_results in [None, Some(vec![])] {
            let input = vec![ExecutionResult {
                patient_id: "P111".into(),
                detailed_results,
            }];
            let output = flatten_results(Some(input.as_slice()));
            assert_eq!(output.len(), 1);
            assert!(output["P111"].is_empty());
        }
    }

    #[test]
    fn groups_without_statement_results_still_appear() {
        for statements in [None, Some(vec![])] {
            let output = flatten_results(Some(&[patient("P111", statements)]));
            assert_eq!(output.len(), 1);
            assert_eq!(output["P111"].len(), 1);
            assert!(output["P111"]["group1"].is_empty());
        }
    }

    #[test]
    fn undefined_raw_counts_zero() {
        let output = flatten_results(Some(&[patient(
            "P111",
            Some(vec![statement("ippDef", RawValue::Undefined)]),
        )]));
        assert_eq!(output["P111"]["group1"].len(), 1);
        assert_eq!(output["P111"]["group1"]["ippDef"], 0);
    }

    #[test]
    fn list_raw_counts_elements() {
        let output = flatten_results(Some(&[patient(
            "P111",
            Some(vec![
                statement("ippDef", RawValue::List(vec![json!({}), json!({})])),
                statement("denomDef", RawValue::List(vec![json!({})])),
            ]),
        )]));
        let group = &output["P111"]["group1"];
        assert_eq!(group.len(), 2);
        assert_eq!(group["ippDef"], 2);
        assert_eq!(group["denomDef"], 1);
    }

    #[test]
    fn boolean_raw_counts_one_or_zero() {
        let output = flatten_results(Some(&[patient(
            "P111",
            Some(vec![
                statement("ippDef", RawValue::Boolean(true)),
                statement("denomDef", RawValue::Boolean(false)),
            ]),
        )]));
        let group = &output["P111"]["group1"];
        assert_eq!(group["ippDef"], 1);
        assert_eq!(group["denomDef"], 0);
    }

    #[test]
    fn scalar_raw_counts_truthiness() {
        assert_eq!(statement_count(&RawValue::Scalar(json!(0))), 0);
        assert_eq!(statement_count(&RawValue::Scalar(json!(7.5))), 1);
        assert_eq!(statement_count(&RawValue::Scalar(json!(""))), 0);
        assert_eq!(statement_count(&RawValue::Scalar(json!("x"))), 1);
        assert_eq!(statement_count(&RawValue::Scalar(json!({}))), 1);
    }

    #[test]
    fn repeated_statement_name_keeps_last_count() {
        let output = flatten_results(Some(&[patient(
            "P111",
            Some(vec![
                statement("ippDef", RawValue::Boolean(true)),
                statement("ippDef", RawValue::List(vec![])),
            ]),
        )]));
        assert_eq!(output["P111"]["group1"]["ippDef"], 0);
    }

    #[test]
    fn coverage_counts_statements_hit_by_any_patient() {
        let output = flatten_results(Some(&[
            patient(
                "P1",
                Some(vec![
                    statement("ipp", RawValue::Boolean(true)),
                    statement("denom", RawValue::Boolean(false)),
                    statement("num", RawValue::Undefined),
                ]),
            ),
            patient(
                "P2",
                Some(vec![
                    statement("ipp", RawValue::Boolean(false)),
                    statement("denom", RawValue::List(vec![json!({})])),
                    statement("num", RawValue::Undefined),
                ]),
            ),
        ]));

        let coverage = statement_coverage(&output, "group1");
        assert_eq!(coverage.covered, vec!["denom".to_string(), "ipp".to_string()]);
        assert_eq!(coverage.uncovered, vec!["num".to_string()]);
        assert_eq!(coverage.percentage, 67);

        assert_eq!(statement_coverage(&output, "missing").percentage, 0);
    }
}
