//! Measure population codes.
//!
//! These are the codes from `http://terminology.hl7.org/CodeSystem/measure-population` that the
//! calculation engine reports in `populationResults[].populationType` and expects on
//! `Measure.group.population.code`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Code system for measure population codes.
pub const MEASURE_POPULATION_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/measure-population";

/// A measure population code as used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeasurePopulationCode {
    InitialPopulation,
    Numerator,
    NumeratorExclusion,
    Denominator,
    DenominatorExclusion,
    DenominatorException,
    MeasurePopulation,
    MeasurePopulationExclusion,
    MeasureObservation,
}

impl MeasurePopulationCode {
    /// Every code, in the order the engine reports populations.
    pub const ALL: [MeasurePopulationCode; 9] = [
        MeasurePopulationCode::InitialPopulation,
        MeasurePopulationCode::Denominator,
        MeasurePopulationCode::DenominatorExclusion,
        MeasurePopulationCode::DenominatorException,
        MeasurePopulationCode::Numerator,
        MeasurePopulationCode::NumeratorExclusion,
        MeasurePopulationCode::MeasurePopulation,
        MeasurePopulationCode::MeasurePopulationExclusion,
        MeasurePopulationCode::MeasureObservation,
    ];

    /// Convert to the wire format string.
    pub fn to_wire(self) -> &'static str {
        match self {
            MeasurePopulationCode::InitialPopulation => "initial-population",
            MeasurePopulationCode::Numerator => "numerator",
            MeasurePopulationCode::NumeratorExclusion => "numerator-exclusion",
            MeasurePopulationCode::Denominator => "denominator",
            MeasurePopulationCode::DenominatorExclusion => "denominator-exclusion",
            MeasurePopulationCode::DenominatorException => "denominator-exception",
            MeasurePopulationCode::MeasurePopulation => "measure-population",
            MeasurePopulationCode::MeasurePopulationExclusion => "measure-population-exclusion",
            MeasurePopulationCode::MeasureObservation => "measure-observation",
        }
    }

    /// Parse from the wire format string.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "initial-population" => Some(MeasurePopulationCode::InitialPopulation),
            "numerator" => Some(MeasurePopulationCode::Numerator),
            "numerator-exclusion" => Some(MeasurePopulationCode::NumeratorExclusion),
            "denominator" => Some(MeasurePopulationCode::Denominator),
            "denominator-exclusion" => Some(MeasurePopulationCode::DenominatorExclusion),
            "denominator-exception" => Some(MeasurePopulationCode::DenominatorException),
            "measure-population" => Some(MeasurePopulationCode::MeasurePopulation),
            "measure-population-exclusion" => {
                Some(MeasurePopulationCode::MeasurePopulationExclusion)
            }
            "measure-observation" => Some(MeasurePopulationCode::MeasureObservation),
            _ => None,
        }
    }
}

impl std::fmt::Display for MeasurePopulationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_wire())
    }
}

impl Serialize for MeasurePopulationCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_wire())
    }
}

impl<'de> Deserialize<'de> for MeasurePopulationCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MeasurePopulationCode::from_wire(&s).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown measure population code '{s}'"))
        })
    }
}
