//! Test case storage.
//!
//! Test cases are stored one JSON document per test case, grouped by measure:
//!
//! ```text
//! <data_dir>/test-cases/<measure_id>/<test_case_id>.json
//! ```
//!
//! Execution state (`actual` values and `executionStatus`) belongs to a session, so it is
//! cleared before writing and recomputed from the stored validation outcome on every load.

use super::helpers::{json_path, read_all, read_existing, write_json};
use super::measures::MeasureService;
use crate::config::CoreConfig;
use crate::test_case::{ExecutionStatus, ExpectedValue, TestCase};
use crate::validation::{sanitize_test_case, validate_id};
use crate::CqmResult;
use chrono::Utc;
use cqm_types::truncate_input;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

const TEST_CASE: &str = "test case";

/// Title length used in log lines.
const LOGGED_TITLE_LENGTH: usize = 40;

/// Service for creating, reading and updating test cases.
#[derive(Clone, Debug)]
pub struct TestCaseService {
    cfg: Arc<CoreConfig>,
    measures: MeasureService,
}

impl TestCaseService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            measures: MeasureService::new(cfg.clone()),
            cfg,
        }
    }

    fn test_case_path(&self, measure_id: &str, id: &str) -> CqmResult<PathBuf> {
        validate_id("measure", measure_id)?;
        validate_id(TEST_CASE, id)?;
        Ok(json_path(&self.cfg.measure_test_cases_dir(measure_id), id))
    }

    /// Creates a test case for a measure.
    ///
    /// A new id and creation timestamps are assigned, user-entered text is validated and
    /// trimmed, and group expectations are lined up with the measure's groups (new groups are
    /// seeded with every population unchecked).
    ///
    /// # Errors
    ///
    /// Returns `CqmError::NotFound` if the measure does not exist, or a validation error for bad
    /// input.
    pub fn create_test_case(
        &self,
        measure_id: &str,
        mut test_case: TestCase,
    ) -> CqmResult<TestCase> {
        let measure = self.measures.fetch_measure(measure_id)?;
        sanitize_test_case(&mut test_case)?;

        let now = Utc::now();
        test_case.id = Uuid::new_v4().to_string();
        test_case.created_at = Some(now);
        test_case.last_modified_at = Some(now);
        test_case.align_group_populations(&measure);

        let path = self.test_case_path(measure_id, &test_case.id)?;
        write_json(&path, &storable(&test_case))?;
        tracing::info!(
            measure_id = %measure_id,
            test_case_id = %test_case.id,
            "test case created: {}",
            truncate_input(&test_case.title, LOGGED_TITLE_LENGTH)
        );

        Ok(loaded(storable(&test_case)))
    }

    /// Loads one test case.
    ///
    /// # Errors
    ///
    /// Returns `CqmError::NotFound` if it does not exist.
    pub fn get_test_case(&self, measure_id: &str, id: &str) -> CqmResult<TestCase> {
        read_existing(&self.test_case_path(measure_id, id)?, TEST_CASE, id).map(loaded)
    }

    /// Lists a measure's test cases, oldest first.
    ///
    /// A measure without stored test cases yields an empty list; documents that fail to parse are
    /// logged and skipped.
    pub fn get_test_cases_by_measure_id(&self, measure_id: &str) -> CqmResult<Vec<TestCase>> {
        validate_id("measure", measure_id)?;
        let mut test_cases: Vec<TestCase> =
            read_all(&self.cfg.measure_test_cases_dir(measure_id))?;
        test_cases.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(test_cases.into_iter().map(loaded).collect())
    }

    /// Replaces a stored test case.
    ///
    /// Creation metadata is kept from the stored copy; the modification timestamp is refreshed.
    ///
    /// # Errors
    ///
    /// Returns `CqmError::NotFound` if the measure or test case does not exist, or a validation
    /// error for bad input.
    pub fn update_test_case(
        &self,
        measure_id: &str,
        id: &str,
        mut test_case: TestCase,
    ) -> CqmResult<TestCase> {
        let measure = self.measures.fetch_measure(measure_id)?;
        let existing = self.get_test_case(measure_id, id)?;
        sanitize_test_case(&mut test_case)?;

        test_case.id = existing.id;
        test_case.created_by = existing.created_by;
        test_case.created_at = existing.created_at;
        test_case.last_modified_at = Some(Utc::now());
        test_case.align_group_populations(&measure);

        write_json(&self.test_case_path(measure_id, id)?, &storable(&test_case))?;
        Ok(loaded(storable(&test_case)))
    }

    /// Distinct, non-blank series names used by a measure's test cases, sorted.
    pub fn get_test_case_series_for_measure(&self, measure_id: &str) -> CqmResult<Vec<String>> {
        let series: BTreeSet<String> = self
            .get_test_cases_by_measure_id(measure_id)?
            .into_iter()
            .map(|tc| tc.series.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(series.into_iter().collect())
    }
}

/// Copy of `test_case` without session state.
fn storable(test_case: &TestCase) -> TestCase {
    let mut stored = test_case.clone();
    stored.execution_status = ExecutionStatus::Na;
    for group in &mut stored.group_populations {
        for value in group.population_values.iter_mut().flatten() {
            value.actual = ExpectedValue::Boolean(false);
        }
    }
    stored
}

fn loaded(mut test_case: TestCase) -> TestCase {
    test_case.reset_status();
    test_case
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{Group, Measure, Population};
    use crate::population::{MeasureScoring, PopulationType};
    use crate::CqmError;
    use fhir::HapiOperationOutcome;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        cfg: Arc<CoreConfig>,
        measure_id: String,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let cfg = Arc::new(CoreConfig::new(dir.path().to_path_buf()).unwrap());
        let measure = MeasureService::new(cfg.clone())
            .create_measure(Measure {
                measure_name: "Office Visit".into(),
                groups: vec![Group {
                    id: Some("g1".into()),
                    scoring: MeasureScoring::Proportion,
                    populations: vec![
                        Population {
                            name: PopulationType::InitialPopulation,
                            definition: "ipp".into(),
                        },
                        Population {
                            name: PopulationType::Denominator,
                            definition: "denom".into(),
                        },
                        Population {
                            name: PopulationType::Numerator,
                            definition: "num".into(),
                        },
                    ],
                    population_basis: Some("Boolean".into()),
                }],
                ..Default::default()
            })
            .unwrap();
        Fixture {
            _dir: dir,
            cfg,
            measure_id: measure.id,
        }
    }

    fn new_test_case(title: &str, series: &str) -> TestCase {
        TestCase {
            title: title.into(),
            series: series.into(),
            json: Some(r#"{"resourceType":"Bundle","entry":[]}"#.into()),
            ..Default::default()
        }
    }

    #[test]
    fn create_assigns_identity_and_seeds_groups() {
        let fx = fixture();
        let svc = TestCaseService::new(fx.cfg.clone());

        let created = svc
            .create_test_case(&fx.measure_id, new_test_case(" IPP Pass ", "SeriesA"))
            .unwrap();

        assert!(!created.id.is_empty());
        assert_eq!(created.title, "IPP Pass");
        assert!(created.created_at.is_some());
        assert_eq!(created.execution_status, ExecutionStatus::Na);

        let group = created.first_group().unwrap();
        assert_eq!(group.group_id, "g1");
        assert_eq!(group.population_values.as_ref().unwrap().len(), 3);

        assert_eq!(
            svc.get_test_case(&fx.measure_id, &created.id).unwrap(),
            created
        );
    }

    #[test]
    fn create_for_unknown_measure_is_not_found() {
        let fx = fixture();
        let svc = TestCaseService::new(fx.cfg.clone());
        let err = svc
            .create_test_case("unknown", new_test_case("t", ""))
            .unwrap_err();
        assert!(matches!(err, CqmError::NotFound { kind: "measure", .. }));
    }

    #[test]
    fn session_state_is_not_persisted() {
        let fx = fixture();
        let svc = TestCaseService::new(fx.cfg.clone());
        let created = svc
            .create_test_case(&fx.measure_id, new_test_case("t", ""))
            .unwrap();

        let mut executed = created.clone();
        executed.execution_status = ExecutionStatus::Pass;
        if let Some(values) = executed.group_populations[0].population_values.as_mut() {
            values[0].expected = ExpectedValue::Boolean(true);
            values[0].actual = ExpectedValue::Boolean(true);
        }

        let updated = svc
            .update_test_case(&fx.measure_id, &created.id, executed)
            .unwrap();
        assert_eq!(updated.execution_status, ExecutionStatus::Na);
        let values = updated.group_populations[0].population_values.as_ref().unwrap();
        assert_eq!(values[0].expected, ExpectedValue::Boolean(true));
        assert_eq!(values[0].actual, ExpectedValue::Boolean(false));
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn invalid_outcome_loads_as_invalid() {
        let fx = fixture();
        let svc = TestCaseService::new(fx.cfg.clone());
        let mut tc = new_test_case("t", "");
        tc.hapi_operation_outcome = Some(HapiOperationOutcome {
            code: 422,
            message: None,
            outcome_response: None,
        });

        let created = svc.create_test_case(&fx.measure_id, tc).unwrap();
        assert_eq!(created.execution_status, ExecutionStatus::Invalid);

        let listed = svc.get_test_cases_by_measure_id(&fx.measure_id).unwrap();
        assert_eq!(listed[0].execution_status, ExecutionStatus::Invalid);
    }

    #[test]
    fn listing_missing_measure_directory_is_empty() {
        let fx = fixture();
        let svc = TestCaseService::new(fx.cfg.clone());
        assert!(svc.get_test_cases_by_measure_id("nothing-here").unwrap().is_empty());
    }

    #[test]
    fn listing_skips_corrupt_documents() {
        let fx = fixture();
        let svc = TestCaseService::new(fx.cfg.clone());
        svc.create_test_case(&fx.measure_id, new_test_case("ok", ""))
            .unwrap();
        fs::write(
            fx.cfg.measure_test_cases_dir(&fx.measure_id).join("broken.json"),
            "{not json",
        )
        .unwrap();

        let listed = svc.get_test_cases_by_measure_id(&fx.measure_id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "ok");
    }

    #[test]
    fn listing_keeps_observation_and_null_expectations() {
        let fx = fixture();
        let svc = TestCaseService::new(fx.cfg.clone());
        let dir = fx.cfg.measure_test_cases_dir(&fx.measure_id);
        fs::create_dir_all(&dir).unwrap();

        let documents = [
            ("ok", r#"{"name": "initialPopulation", "expected": true}"#),
            ("obs", r#"{"name": "measurePopulationObservation", "expected": "3"}"#),
            ("nul", r#"{"name": "initialPopulation", "expected": null, "actual": null}"#),
        ];
        for (id, value) in documents {
            let doc = format!(
                r#"{{"id": "{id}", "title": "{id}", "groupPopulations": [{{"groupId": "g1", "populationValues": [{value}]}}]}}"#
            );
            fs::write(dir.join(format!("{id}.json")), doc).unwrap();
        }

        let listed = svc.get_test_cases_by_measure_id(&fx.measure_id).unwrap();
        let ids: Vec<&str> = listed.iter().map(|tc| tc.id.as_str()).collect();
        assert_eq!(ids, vec!["nul", "obs", "ok"]);

        let obs = svc.get_test_case(&fx.measure_id, "obs").unwrap();
        let values = obs.group_populations[0].population_values.as_ref().unwrap();
        assert!(values[0].name.is_observation());

        let nul = svc.get_test_case(&fx.measure_id, "nul").unwrap();
        let values = nul.group_populations[0].population_values.as_ref().unwrap();
        assert_eq!(values[0].expected, ExpectedValue::Boolean(false));
    }

    #[test]
    fn series_are_distinct_sorted_and_non_blank() {
        let fx = fixture();
        let svc = TestCaseService::new(fx.cfg.clone());
        for (title, series) in [("a", "SeriesB"), ("b", "SeriesA"), ("c", ""), ("d", "SeriesB")] {
            svc.create_test_case(&fx.measure_id, new_test_case(title, series))
                .unwrap();
        }

        assert_eq!(
            svc.get_test_case_series_for_measure(&fx.measure_id).unwrap(),
            vec!["SeriesA".to_string(), "SeriesB".to_string()]
        );
    }

    #[test]
    fn updating_missing_test_case_is_not_found() {
        let fx = fixture();
        let svc = TestCaseService::new(fx.cfg.clone());
        let err = svc
            .update_test_case(&fx.measure_id, "missing", new_test_case("t", ""))
            .unwrap_err();
        assert!(matches!(err, CqmError::NotFound { kind: "test case", .. }));
    }
}
