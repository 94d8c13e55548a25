//! Measure model.
//!
//! Only the parts of a measure the workbench needs: its CQL logic, measurement period, groups
//! with their population criteria, and ownership/sharing information.

use crate::constants::SHARED_WITH_ROLE;
use crate::population::{populations_for_scoring, MeasureScoring, PopulationType};
use crate::test_case::{ExpectedValue, GroupPopulation, PopulationExpectedValue};
use fhir::{BundlePopulation, MeasureBundleInput};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub measure_name: String,

    #[serde(default)]
    pub cql_library_name: String,

    #[serde(default)]
    pub cql: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elm_json: Option<String>,

    #[serde(default)]
    pub cql_errors: bool,

    /// ISO 8601 date, passed through to the calculator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_period_start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_period_end: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(default)]
    pub acls: Vec<Acl>,

    #[serde(default)]
    pub groups: Vec<Group>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Acl {
    pub user_id: String,

    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub scoring: MeasureScoring,

    #[serde(default)]
    pub populations: Vec<Population>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population_basis: Option<String>,
}

/// A population criterion: which CQL definition decides membership.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Population {
    pub name: PopulationType,

    #[serde(default)]
    pub definition: String,
}

impl Measure {
    /// The creator and users the measure is shared with may edit it and its test cases.
    pub fn can_edit(&self, user: &str) -> bool {
        self.created_by.as_deref() == Some(user)
            || self.acls.iter().any(|acl| {
                acl.user_id == user && acl.roles.iter().any(|r| r == SHARED_WITH_ROLE)
            })
    }

    /// Inputs for [`fhir::build_measure_bundle`].
    pub fn bundle_input(&self) -> MeasureBundleInput<'_> {
        MeasureBundleInput {
            cql_library_name: &self.cql_library_name,
            cql: &self.cql,
            elm_json: self.elm_json.as_deref(),
            groups: self
                .groups
                .iter()
                .map(|group| {
                    group
                        .populations
                        .iter()
                        .map(|p| BundlePopulation {
                            code: p.name.fhir_code(),
                            display: p.name.display_name(),
                            expression: &p.definition,
                        })
                        .collect()
                })
                .collect(),
        }
    }

    /// Group expectations for a brand new test case of this measure.
    pub fn seed_group_populations(&self) -> Vec<GroupPopulation> {
        self.groups.iter().map(Group::seed_group_population).collect()
    }
}

impl Group {
    /// Populations allowed by the scoring that this group actually defines, in display order.
    pub fn populations_for_scoring(&self) -> Vec<PopulationType> {
        populations_for_scoring(self.scoring)
            .iter()
            .copied()
            .filter(|name| {
                self.populations
                    .iter()
                    .any(|p| p.name == *name && !p.definition.trim().is_empty())
            })
            .collect()
    }

    /// Expectations for this group with every population unchecked.
    pub fn seed_group_population(&self) -> GroupPopulation {
        GroupPopulation {
            group_id: self.id.clone().unwrap_or_default(),
            scoring: Some(self.scoring),
            population_values: Some(
                self.populations_for_scoring()
                    .into_iter()
                    .map(|name| PopulationExpectedValue {
                        name,
                        expected: ExpectedValue::Boolean(false),
                        actual: ExpectedValue::Boolean(false),
                    })
                    .collect(),
            ),
            stratification_values: None,
        }
    }
}
