//! Pass statistics across a measure's test cases.

use crate::test_case::{ExecutionStatus, TestCase};
use serde::{Deserialize, Serialize};

/// Summary shown above the test case list after an execution run.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassingStats {
    pub pass_percentage: u32,
    pub pass_fail_ratio: String,
}

impl Default for PassingStats {
    fn default() -> Self {
        Self {
            pass_percentage: 0,
            pass_fail_ratio: "0/0".to_string(),
        }
    }
}

/// Aggregate pass/fail counts.
///
/// Only executed test cases (`pass` or `fail`) are considered; `NA` and `Invalid` are ignored.
/// The percentage rounds half up and is `0` when nothing was considered.
pub fn aggregate(test_cases: &[TestCase]) -> PassingStats {
    let (pass, considered) = test_cases
        .iter()
        .filter(|tc| tc.execution_status.is_executed())
        .fold((0u32, 0u32), |(pass, considered), tc| {
            let passed = u32::from(tc.execution_status == ExecutionStatus::Pass);
            (pass + passed, considered + 1)
        });

    if considered == 0 {
        return PassingStats::default();
    }

    // integer half-up rounding of 100 * pass / considered
    let pass_percentage = (200 * pass + considered) / (2 * considered);

    PassingStats {
        pass_percentage,
        pass_fail_ratio: format!("{pass}/{considered}"),
    }
}
