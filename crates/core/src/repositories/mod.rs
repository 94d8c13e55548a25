//! File-backed repositories.
//!
//! Measures and their test cases are stored as JSON documents under the configured data
//! directory. See [`measures`] and [`test_cases`] for the layout.

mod helpers;
pub mod measures;
pub mod test_cases;

pub use measures::MeasureService;
pub use test_cases::TestCaseService;
