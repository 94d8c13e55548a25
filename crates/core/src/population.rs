//! Measure population types and the rules that relate them.
//!
//! Population types are the internal (camelCase) names test cases declare expectations against.
//! The calculation engine reports results using [`MeasurePopulationCode`] wire codes, so every
//! population type maps to exactly one code.

use crate::test_case::{ExpectedValue, PopulationExpectedValue};
use fhir::MeasurePopulationCode;
use serde::{Deserialize, Serialize};

/// A population a test case can declare an expected outcome for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PopulationType {
    InitialPopulation,
    Numerator,
    NumeratorExclusion,
    Denominator,
    DenominatorExclusion,
    DenominatorException,
    MeasurePopulation,
    MeasurePopulationExclusion,
    MeasureObservation,
    MeasurePopulationObservation,
    NumeratorObservation,
    DenominatorObservation,
}

impl PopulationType {
    pub const ALL: [PopulationType; 12] = [
        PopulationType::InitialPopulation,
        PopulationType::Numerator,
        PopulationType::NumeratorExclusion,
        PopulationType::Denominator,
        PopulationType::DenominatorExclusion,
        PopulationType::DenominatorException,
        PopulationType::MeasurePopulation,
        PopulationType::MeasurePopulationExclusion,
        PopulationType::MeasureObservation,
        PopulationType::MeasurePopulationObservation,
        PopulationType::NumeratorObservation,
        PopulationType::DenominatorObservation,
    ];

    /// The engine's population code for this type.
    pub fn fhir_code(self) -> MeasurePopulationCode {
        match self {
            PopulationType::InitialPopulation => MeasurePopulationCode::InitialPopulation,
            PopulationType::Numerator => MeasurePopulationCode::Numerator,
            PopulationType::NumeratorExclusion => MeasurePopulationCode::NumeratorExclusion,
            PopulationType::Denominator => MeasurePopulationCode::Denominator,
            PopulationType::DenominatorExclusion => MeasurePopulationCode::DenominatorExclusion,
            PopulationType::DenominatorException => MeasurePopulationCode::DenominatorException,
            PopulationType::MeasurePopulation => MeasurePopulationCode::MeasurePopulation,
            PopulationType::MeasurePopulationExclusion => {
                MeasurePopulationCode::MeasurePopulationExclusion
            }
            PopulationType::MeasureObservation
            | PopulationType::MeasurePopulationObservation
            | PopulationType::NumeratorObservation
            | PopulationType::DenominatorObservation => MeasurePopulationCode::MeasureObservation,
        }
    }

    /// Observation populations carry numeric values rather than membership booleans.
    pub fn is_observation(self) -> bool {
        matches!(
            self,
            PopulationType::MeasureObservation
                | PopulationType::MeasurePopulationObservation
                | PopulationType::NumeratorObservation
                | PopulationType::DenominatorObservation
        )
    }

    /// Short code shown in population tables.
    pub fn display_code(self) -> &'static str {
        match self {
            PopulationType::InitialPopulation => "IP",
            PopulationType::Numerator => "NUMER",
            PopulationType::NumeratorExclusion => "NUMEX",
            PopulationType::Denominator => "DENOM",
            PopulationType::DenominatorExclusion => "DENEX",
            PopulationType::DenominatorException => "DENEXCEP",
            PopulationType::MeasurePopulation => "MSRPOPL",
            PopulationType::MeasurePopulationExclusion => "MSRPOPLEX",
            PopulationType::MeasureObservation => "OBSERV",
            PopulationType::MeasurePopulationObservation => "MSRPOPLOBSERV",
            PopulationType::NumeratorObservation => "NUMEROBSERV",
            PopulationType::DenominatorObservation => "DENOMOBSERV",
        }
    }

    /// Human readable name, as used for bundle population displays.
    pub fn display_name(self) -> &'static str {
        match self {
            PopulationType::InitialPopulation => "Initial Population",
            PopulationType::Numerator => "Numerator",
            PopulationType::NumeratorExclusion => "Numerator Exclusion",
            PopulationType::Denominator => "Denominator",
            PopulationType::DenominatorExclusion => "Denominator Exclusion",
            PopulationType::DenominatorException => "Denominator Exception",
            PopulationType::MeasurePopulation => "Measure Population",
            PopulationType::MeasurePopulationExclusion => "Measure Population Exclusion",
            PopulationType::MeasureObservation => "Measure Observation",
            PopulationType::MeasurePopulationObservation => "Measure Population Observation",
            PopulationType::NumeratorObservation => "Numerator Observation",
            PopulationType::DenominatorObservation => "Denominator Observation",
        }
    }

    /// The population a patient must belong to before belonging to this one.
    fn parent(self, scoring: Option<MeasureScoring>) -> Option<PopulationType> {
        match self {
            PopulationType::Denominator | PopulationType::MeasurePopulation => {
                Some(PopulationType::InitialPopulation)
            }
            PopulationType::Numerator if scoring == Some(MeasureScoring::Ratio) => {
                Some(PopulationType::InitialPopulation)
            }
            PopulationType::Numerator
            | PopulationType::DenominatorExclusion
            | PopulationType::DenominatorException => Some(PopulationType::Denominator),
            PopulationType::NumeratorExclusion => Some(PopulationType::Numerator),
            PopulationType::MeasurePopulationExclusion => Some(PopulationType::MeasurePopulation),
            PopulationType::InitialPopulation
            | PopulationType::MeasureObservation
            | PopulationType::MeasurePopulationObservation
            | PopulationType::NumeratorObservation
            | PopulationType::DenominatorObservation => None,
        }
    }

    fn depends_on(self, other: PopulationType, scoring: Option<MeasureScoring>) -> bool {
        let mut current = self.parent(scoring);
        while let Some(parent) = current {
            if parent == other {
                return true;
            }
            current = parent.parent(scoring);
        }
        false
    }
}

impl std::fmt::Display for PopulationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// How a measure group is scored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum MeasureScoring {
    Cohort,
    Proportion,
    Ratio,
    #[serde(rename = "Continuous Variable")]
    ContinuousVariable,
}

/// Populations a group with this scoring may define, in display order.
pub fn populations_for_scoring(scoring: MeasureScoring) -> &'static [PopulationType] {
    match scoring {
        MeasureScoring::Cohort => &[PopulationType::InitialPopulation],
        MeasureScoring::Proportion => &[
            PopulationType::InitialPopulation,
            PopulationType::Denominator,
            PopulationType::DenominatorExclusion,
            PopulationType::Numerator,
            PopulationType::NumeratorExclusion,
            PopulationType::DenominatorException,
        ],
        MeasureScoring::Ratio => &[
            PopulationType::InitialPopulation,
            PopulationType::Denominator,
            PopulationType::DenominatorExclusion,
            PopulationType::Numerator,
            PopulationType::NumeratorExclusion,
        ],
        MeasureScoring::ContinuousVariable => &[
            PopulationType::InitialPopulation,
            PopulationType::MeasurePopulation,
            PopulationType::MeasurePopulationExclusion,
            PopulationType::MeasureObservation,
        ],
    }
}

/// Re-derive expectations after the user toggles the boolean expectation of `changed`.
///
/// Checking a population checks every population it depends on (a numerator patient is also in
/// the denominator and initial population). Unchecking a population unchecks every population
/// that depends on it. Numeric expectations are never touched.
pub fn propagate_population_change(
    values: &[PopulationExpectedValue],
    changed: PopulationType,
    scoring: Option<MeasureScoring>,
) -> Vec<PopulationExpectedValue> {
    let mut next = values.to_vec();

    let Some(ExpectedValue::Boolean(checked)) = values
        .iter()
        .find(|v| v.name == changed)
        .map(|v| &v.expected)
    else {
        return next;
    };
    let checked = *checked;

    for value in next.iter_mut() {
        if !matches!(value.expected, ExpectedValue::Boolean(_)) {
            continue;
        }
        let related = if checked {
            changed.depends_on(value.name, scoring)
        } else {
            value.name.depends_on(changed, scoring)
        };
        if related {
            value.expected = ExpectedValue::Boolean(checked);
        }
    }

    next
}
