//! Measure storage.
//!
//! Measures are stored one JSON document per measure:
//!
//! ```text
//! <data_dir>/measures/<measure_id>.json
//! ```

use super::helpers::{json_path, read_all, read_existing, write_json};
use crate::config::CoreConfig;
use crate::measure::{Group, Measure};
use crate::validation::validate_id;
use crate::{CqmError, CqmResult};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

const MEASURE: &str = "measure";
const GROUP: &str = "group";

/// Service for reading and updating stored measures.
#[derive(Clone, Debug)]
pub struct MeasureService {
    cfg: Arc<CoreConfig>,
}

impl MeasureService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    fn measure_path(&self, id: &str) -> CqmResult<PathBuf> {
        validate_id(MEASURE, id)?;
        Ok(json_path(&self.cfg.measures_dir(), id))
    }

    /// Loads a measure by id.
    ///
    /// # Errors
    ///
    /// Returns `CqmError::NotFound` if no such measure is stored.
    pub fn fetch_measure(&self, id: &str) -> CqmResult<Measure> {
        read_existing(&self.measure_path(id)?, MEASURE, id)
    }

    /// Lists stored measures, optionally only those created by `created_by`.
    ///
    /// Documents that fail to parse are logged and skipped.
    pub fn fetch_measures(&self, created_by: Option<&str>) -> CqmResult<Vec<Measure>> {
        let mut measures: Vec<Measure> = read_all(&self.cfg.measures_dir())?;
        if let Some(user) = created_by {
            measures.retain(|m| m.created_by.as_deref() == Some(user));
        }
        Ok(measures)
    }

    /// Stores a new measure, assigning ids to the measure and its groups where missing.
    ///
    /// # Errors
    ///
    /// Returns `CqmError::InvalidInput` if a measure with the same id already exists.
    pub fn create_measure(&self, mut measure: Measure) -> CqmResult<Measure> {
        if measure.id.trim().is_empty() {
            measure.id = Uuid::new_v4().to_string();
        }
        for group in &mut measure.groups {
            group.id.get_or_insert_with(|| Uuid::new_v4().to_string());
        }

        let path = self.measure_path(&measure.id)?;
        if path.exists() {
            return Err(CqmError::InvalidInput(format!(
                "measure {} already exists",
                measure.id
            )));
        }

        write_json(&path, &measure)?;
        tracing::info!(measure_id = %measure.id, "measure created");
        Ok(measure)
    }

    /// Replaces a stored measure.
    ///
    /// When `user` is given they must be allowed to edit the stored measure.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `CqmError::NotFound` if the measure does not exist,
    /// - `CqmError::InvalidInput` if `measure.id` does not match `id`,
    /// - `CqmError::Forbidden` if `user` may not edit the measure.
    pub fn update_measure(
        &self,
        id: &str,
        mut measure: Measure,
        user: Option<&str>,
    ) -> CqmResult<Measure> {
        if !measure.id.is_empty() && measure.id != id {
            return Err(CqmError::InvalidInput(
                "measure id does not match the request path".into(),
            ));
        }

        let existing = self.fetch_measure(id)?;
        ensure_can_edit(&existing, user)?;

        measure.id = id.to_owned();
        // ownership is not editable
        measure.created_by = existing.created_by;
        for group in &mut measure.groups {
            group.id.get_or_insert_with(|| Uuid::new_v4().to_string());
        }

        write_json(&self.measure_path(id)?, &measure)?;
        Ok(measure)
    }

    /// Adds a group to a measure, assigning it a new id.
    ///
    /// # Errors
    ///
    /// Returns `CqmError::NotFound` if the measure does not exist, or `CqmError::Forbidden` if
    /// `user` may not edit it.
    pub fn create_group(
        &self,
        measure_id: &str,
        mut group: Group,
        user: Option<&str>,
    ) -> CqmResult<Group> {
        let mut measure = self.fetch_measure(measure_id)?;
        ensure_can_edit(&measure, user)?;

        group.id = Some(Uuid::new_v4().to_string());
        measure.groups.push(group.clone());

        write_json(&self.measure_path(measure_id)?, &measure)?;
        tracing::info!(measure_id = %measure_id, group_id = ?group.id, "group created");
        Ok(group)
    }

    /// Replaces the measure group with the same id as `group`.
    ///
    /// # Errors
    ///
    /// Returns `CqmError::NotFound` if the measure or the group does not exist, and
    /// `CqmError::InvalidInput` if `group` carries no id.
    pub fn update_group(
        &self,
        measure_id: &str,
        group: Group,
        user: Option<&str>,
    ) -> CqmResult<Group> {
        let group_id = group
            .id
            .clone()
            .ok_or_else(|| CqmError::InvalidInput("group id is required".into()))?;

        let mut measure = self.fetch_measure(measure_id)?;
        ensure_can_edit(&measure, user)?;

        let slot = measure
            .groups
            .iter_mut()
            .find(|g| g.id.as_deref() == Some(group_id.as_str()))
            .ok_or(CqmError::NotFound {
                kind: GROUP,
                id: group_id,
            })?;
        *slot = group.clone();

        write_json(&self.measure_path(measure_id)?, &measure)?;
        Ok(group)
    }
}

fn ensure_can_edit(measure: &Measure, user: Option<&str>) -> CqmResult<()> {
    match user {
        Some(user) if !measure.can_edit(user) => Err(CqmError::Forbidden {
            user: user.to_owned(),
            measure_id: measure.id.clone(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::Population;
    use crate::population::{MeasureScoring, PopulationType};
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> MeasureService {
        MeasureService::new(Arc::new(
            CoreConfig::new(dir.path().to_path_buf()).unwrap(),
        ))
    }

    fn cohort_group() -> Group {
        Group {
            id: None,
            scoring: MeasureScoring::Cohort,
            populations: vec![Population {
                name: PopulationType::InitialPopulation,
                definition: "ipp".into(),
            }],
            population_basis: None,
        }
    }

    fn measure(name: &str, owner: &str) -> Measure {
        Measure {
            measure_name: name.into(),
            created_by: Some(owner.into()),
            groups: vec![cohort_group()],
            ..Default::default()
        }
    }

    #[test]
    fn create_assigns_ids_and_persists() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let created = svc.create_measure(measure("Office Visit", "alice")).unwrap();
        assert!(!created.id.is_empty());
        assert!(created.groups[0].id.is_some());

        assert_eq!(svc.fetch_measure(&created.id).unwrap(), created);
        assert!(dir
            .path()
            .join("measures")
            .join(format!("{}.json", created.id))
            .is_file());
    }

    #[test]
    fn fetch_missing_measure_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = service(&dir).fetch_measure("missing").unwrap_err();
        assert!(matches!(err, CqmError::NotFound { kind: "measure", .. }));
    }

    #[test]
    fn fetch_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let err = service(&dir).fetch_measure("../secrets").unwrap_err();
        assert!(matches!(err, CqmError::InvalidInput(_)));
    }

    #[test]
    fn fetch_measures_filters_by_creator() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        svc.create_measure(measure("A", "alice")).unwrap();
        svc.create_measure(measure("B", "bob")).unwrap();

        assert_eq!(svc.fetch_measures(None).unwrap().len(), 2);
        let mine = svc.fetch_measures(Some("bob")).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].measure_name, "B");
    }

    #[test]
    fn update_keeps_owner_and_checks_rights() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let created = svc.create_measure(measure("A", "alice")).unwrap();

        let mut edit = created.clone();
        edit.measure_name = "A2".into();
        edit.created_by = Some("mallory".into());

        let err = svc
            .update_measure(&created.id, edit.clone(), Some("mallory"))
            .unwrap_err();
        assert!(matches!(err, CqmError::Forbidden { .. }));

        let updated = svc
            .update_measure(&created.id, edit, Some("alice"))
            .unwrap();
        assert_eq!(updated.measure_name, "A2");
        assert_eq!(updated.created_by.as_deref(), Some("alice"));

        let mismatched = Measure {
            id: "other".into(),
            ..Default::default()
        };
        assert!(matches!(
            svc.update_measure(&created.id, mismatched, None),
            Err(CqmError::InvalidInput(_))
        ));
    }

    #[test]
    fn groups_can_be_created_and_updated() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let created = svc.create_measure(measure("A", "alice")).unwrap();

        let group = svc.create_group(&created.id, cohort_group(), None).unwrap();
        let group_id = group.id.clone().unwrap();

        let mut changed = group.clone();
        changed.population_basis = Some("Encounter".into());
        svc.update_group(&created.id, changed, None).unwrap();

        let stored = svc.fetch_measure(&created.id).unwrap();
        assert_eq!(stored.groups.len(), 2);
        let stored_group = stored
            .groups
            .iter()
            .find(|g| g.id.as_deref() == Some(group_id.as_str()))
            .unwrap();
        assert_eq!(stored_group.population_basis.as_deref(), Some("Encounter"));
    }

    #[test]
    fn updating_unknown_group_is_not_found() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let created = svc.create_measure(measure("A", "alice")).unwrap();

        let mut unknown = cohort_group();
        unknown.id = Some("nope".into());
        assert!(matches!(
            svc.update_group(&created.id, unknown, None),
            Err(CqmError::NotFound { kind: "group", .. })
        ));

        assert!(matches!(
            svc.update_group(&created.id, cohort_group(), None),
            Err(CqmError::InvalidInput(_))
        ));
    }
}
