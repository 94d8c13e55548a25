//! Test case model.
//!
//! A test case pairs a FHIR patient bundle with the outcomes its author expects for each measure
//! population. `actual` values and `execution_status` are session state: they are recomputed by
//! every execution run and never persisted.

use crate::measure::Measure;
use crate::population::{MeasureScoring, PopulationType};
use chrono::{DateTime, Utc};
use fhir::{HapiOperationOutcome, ValidationIssue};
use serde::{Deserialize, Deserializer, Serialize};

/// An expected (or computed) population outcome.
///
/// Boolean-basis measures use `Boolean`; observations and non-boolean population bases use
/// numbers, which the UI may submit as text.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ExpectedValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl Default for ExpectedValue {
    fn default() -> Self {
        ExpectedValue::Boolean(false)
    }
}

impl ExpectedValue {
    /// Strict equality against an engine membership result.
    pub fn matches_result(&self, result: bool) -> bool {
        matches!(self, ExpectedValue::Boolean(b) if *b == result)
    }

    /// Numeric reading of the value. Blank text reads as 0; unparseable text has no value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ExpectedValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            ExpectedValue::Number(n) => Some(*n),
            ExpectedValue::Text(t) => {
                let t = t.trim();
                if t.is_empty() {
                    Some(0.0)
                } else {
                    t.parse::<f64>().ok()
                }
            }
        }
    }
}

/// Reads an absent or `null` value as [`ExpectedValue::default`].
fn null_as_default<'de, D>(deserializer: D) -> Result<ExpectedValue, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ExpectedValue>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<bool> for ExpectedValue {
    fn from(value: bool) -> Self {
        ExpectedValue::Boolean(value)
    }
}

impl From<f64> for ExpectedValue {
    fn from(value: f64) -> Self {
        ExpectedValue::Number(value)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationExpectedValue {
    pub name: PopulationType,

    #[serde(default, deserialize_with = "null_as_default")]
    pub expected: ExpectedValue,

    #[serde(default, deserialize_with = "null_as_default")]
    pub actual: ExpectedValue,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StratificationValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub expected: ExpectedValue,

    #[serde(default, deserialize_with = "null_as_default")]
    pub actual: ExpectedValue,
}

/// Expectations for one measure group.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPopulation {
    #[serde(default)]
    pub group_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<MeasureScoring>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population_values: Option<Vec<PopulationExpectedValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stratification_values: Option<Vec<StratificationValue>>,
}

/// Outcome of the latest execution run for a test case.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ExecutionStatus {
    /// Not executed yet.
    #[default]
    #[serde(rename = "NA")]
    Na,
    /// The test case bundle failed external validation and cannot be executed.
    #[serde(rename = "Invalid")]
    Invalid,
    #[serde(rename = "pass")]
    Pass,
    #[serde(rename = "fail")]
    Fail,
}

impl ExecutionStatus {
    /// True for statuses produced by an execution run.
    pub fn is_executed(self) -> bool {
        matches!(self, ExecutionStatus::Pass | ExecutionStatus::Fail)
    }

    pub fn from_verdict(passed: bool) -> Self {
        if passed {
            ExecutionStatus::Pass
        } else {
            ExecutionStatus::Fail
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Na => "NA",
            ExecutionStatus::Invalid => "Invalid",
            ExecutionStatus::Pass => "pass",
            ExecutionStatus::Fail => "fail",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub series: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<DateTime<Utc>>,

    /// Patient bundle JSON as edited by the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hapi_operation_outcome: Option<HapiOperationOutcome>,

    #[serde(default)]
    pub group_populations: Vec<GroupPopulation>,

    #[serde(default)]
    pub execution_status: ExecutionStatus,
}

impl TestCase {
    /// Status a freshly loaded test case starts a session with.
    pub fn initial_status(&self) -> ExecutionStatus {
        if fhir::outcome_is_valid(self.hapi_operation_outcome.as_ref()) {
            ExecutionStatus::Na
        } else {
            ExecutionStatus::Invalid
        }
    }

    /// Reset the session status to [`TestCase::initial_status`].
    pub fn reset_status(&mut self) {
        self.execution_status = self.initial_status();
    }

    /// Invalid test cases are never sent to the calculator.
    pub fn is_executable(&self) -> bool {
        self.execution_status != ExecutionStatus::Invalid
    }

    /// Validation errors reported by the FHIR server for this test case's bundle.
    pub fn validation_errors(&self) -> Vec<ValidationIssue> {
        self.hapi_operation_outcome
            .as_ref()
            .map(HapiOperationOutcome::validation_errors)
            .unwrap_or_default()
    }

    /// Expectations for the first measure group; the only group execution inspects.
    pub fn first_group(&self) -> Option<&GroupPopulation> {
        self.group_populations.first()
    }

    /// Line the group expectations up with the measure's current groups.
    ///
    /// Existing expectations are kept for groups that still exist; groups new to the measure are
    /// seeded with every population unchecked; expectations for removed groups are dropped.
    pub fn align_group_populations(&mut self, measure: &Measure) {
        let existing = std::mem::take(&mut self.group_populations);
        self.group_populations = measure
            .groups
            .iter()
            .map(|group| {
                existing
                    .iter()
                    .find(|gp| Some(gp.group_id.as_str()) == group.id.as_deref())
                    .cloned()
                    .unwrap_or_else(|| group.seed_group_population())
            })
            .collect();
    }
}
