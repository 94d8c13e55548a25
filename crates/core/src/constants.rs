//! Constants used throughout the CQM core crate.
//!
//! This module contains path and filename constants plus the user-facing messages that other
//! layers surface verbatim.

/// Default directory for measure and test case storage when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "cqm_data";

/// Directory name for stored measures.
pub const MEASURES_DIR_NAME: &str = "measures";

/// Directory name for stored test cases (one subdirectory per measure).
pub const TEST_CASES_DIR_NAME: &str = "test-cases";

/// Extension for stored JSON documents.
pub const JSON_EXTENSION: &str = "json";

/// Maximum length of a test case title, description or series.
pub const MAX_TEXT_LENGTH: usize = 250;

/// ACL role granting edit rights on a shared measure.
pub const SHARED_WITH_ROLE: &str = "SHARED_WITH";

/// Shown when execution is attempted against a measure whose CQL has errors.
pub const CQL_ERRORS_MESSAGE: &str =
    "Cannot execute test cases while errors exist in the measure CQL!";

/// Shown when the external calculation fails for any reason.
pub const CALCULATION_FAILED_MESSAGE: &str = "Unable to calculate test case.";
