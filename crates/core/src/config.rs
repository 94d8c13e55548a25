//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.

use crate::constants::{DEFAULT_DATA_DIR, MEASURES_DIR_NAME, TEST_CASES_DIR_NAME};
use crate::{CqmError, CqmResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `CqmError::InvalidInput` if `data_dir` is empty.
    pub fn new(data_dir: PathBuf) -> CqmResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(CqmError::InvalidInput("data_dir cannot be empty".into()));
        }

        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn measures_dir(&self) -> PathBuf {
        self.data_dir.join(MEASURES_DIR_NAME)
    }

    pub fn test_cases_dir(&self) -> PathBuf {
        self.data_dir.join(TEST_CASES_DIR_NAME)
    }

    /// Directory holding the test cases of one measure.
    pub fn measure_test_cases_dir(&self, measure_id: &str) -> PathBuf {
        self.test_cases_dir().join(measure_id)
    }
}

/// Resolve the data directory from an optional override value (typically `CQM_DATA_DIR`).
///
/// Blank overrides fall back to [`DEFAULT_DATA_DIR`].
pub fn resolve_data_dir(value: Option<String>) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_storage_directories() {
        let cfg = CoreConfig::new(PathBuf::from("/srv/cqm")).unwrap();
        assert_eq!(cfg.measures_dir(), PathBuf::from("/srv/cqm/measures"));
        assert_eq!(
            cfg.measure_test_cases_dir("m1"),
            PathBuf::from("/srv/cqm/test-cases/m1")
        );
    }

    #[test]
    fn rejects_empty_data_dir() {
        assert!(matches!(
            CoreConfig::new(PathBuf::new()),
            Err(CqmError::InvalidInput(_))
        ));
    }

    #[test]
    fn resolve_data_dir_falls_back_to_default() {
        assert_eq!(resolve_data_dir(None), PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(
            resolve_data_dir(Some("  ".into())),
            PathBuf::from(DEFAULT_DATA_DIR)
        );
        assert_eq!(
            resolve_data_dir(Some("/data".into())),
            PathBuf::from("/data")
        );
    }
}
