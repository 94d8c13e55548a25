//! Comparison of engine population results against declared expectations.
//!
//! The comparison is pure: it never mutates the caller's test case, it returns updated
//! expectation values (with `actual` filled in) alongside the verdict.

use crate::test_case::{
    ExecutionStatus, ExpectedValue, PopulationExpectedValue, StratificationValue, TestCase,
};
use fhir::{DetailedGroupResult, PopulationResult};

/// Verdict for one test case plus the expectation values with computed `actual`s.
#[derive(Clone, Debug, PartialEq)]
pub struct Comparison {
    pub status: ExecutionStatus,
    pub population_values: Vec<PopulationExpectedValue>,
}

/// Compare engine population results with a test case's expectations.
///
/// Each population result is matched to the first expectation whose population code equals the
/// result's `populationType`; unmatched results are ignored, and expectations the engine never
/// reported keep their previous `actual`.
///
/// Measure, measure population, numerator and denominator observations share the
/// `measure-observation` code, so every observation result is checked against the first
/// observation expectation in the list; later observation expectations are never matched.
///
/// Membership populations record the engine result as `actual` and pass when it equals the
/// expectation. Observation populations pass when the expectation, read as a number, equals the
/// first observation. Every population result is visited so all `actual`s are filled in, but
/// once the verdict fails it stays failed. Stratifications are only checked while the verdict
/// still passes; any stratification whose expectation differs from its actual fails it.
pub fn compare_test_case(
    population_results: &[PopulationResult],
    population_values: &[PopulationExpectedValue],
    stratification_values: Option<&[StratificationValue]>,
) -> Comparison {
    let mut values = population_values.to_vec();
    let mut passed = true;

    for result in population_results {
        let Some(value) = values
            .iter_mut()
            .find(|v| v.name.fhir_code().to_wire() == result.population_type)
        else {
            continue;
        };

        let matches = if value.name.is_observation() {
            observation_matches(&value.expected, result)
        } else {
            value.actual = ExpectedValue::Boolean(result.result);
            value.expected.matches_result(result.result)
        };
        passed = passed && matches;
    }

    if passed {
        passed = stratification_values
            .unwrap_or_default()
            .iter()
            .all(|s| s.expected == s.actual);
    }

    Comparison {
        status: ExecutionStatus::from_verdict(passed),
        population_values: values,
    }
}

fn observation_matches(expected: &ExpectedValue, result: &PopulationResult) -> bool {
    match (expected.as_number(), result.first_observation()) {
        (Some(expected), Some(observed)) => expected == observed,
        _ => false,
    }
}

/// Apply an execution's detailed results to a test case, returning the updated test case.
///
/// Only the first measure group is inspected. When the engine produced no population results for
/// it, or the test case declares no population values, the test case comes back unchanged.
pub fn apply_execution(
    test_case: &TestCase,
    detailed_results: Option<&[DetailedGroupResult]>,
) -> TestCase {
    let mut next = test_case.clone();

    let population_results = detailed_results
        .and_then(|groups| groups.first())
        .and_then(|group| group.population_results.as_deref());

    let Some(group) = next.group_populations.first_mut() else {
        return next;
    };
    let (Some(population_results), Some(population_values)) =
        (population_results, group.population_values.as_deref())
    else {
        return next;
    };

    let comparison = compare_test_case(
        population_results,
        population_values,
        group.stratification_values.as_deref(),
    );

    group.population_values = Some(comparison.population_values);
    next.execution_status = comparison.status;
    next
}
