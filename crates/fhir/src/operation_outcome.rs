//! HAPI FHIR operation outcomes.
//!
//! When a test case is saved, its bundle is validated by an external HAPI FHIR server and the
//! outcome is stored alongside the test case. A failed outcome marks the test case as invalid
//! for execution and produces a list of validation errors for display.

use serde::{Deserialize, Serialize};

/// Operation outcome attached to a stored test case.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HapiOperationOutcome {
    pub code: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_response: Option<OutcomeResponse>,
}

/// FHIR `OperationOutcome` body as returned by the server.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<Vec<OutcomeIssue>>,
}

/// A single issue inside an `OperationOutcome`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

/// A validation error ready for display, keyed by its position.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub key: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    pub diagnostics: String,
}

/// Status codes for which the server reports structured issues.
const ISSUE_CODES: [u16; 4] = [400, 409, 412, 422];

impl HapiOperationOutcome {
    /// True when the server accepted the bundle (200 or 201).
    pub fn is_success(&self) -> bool {
        self.code == 200 || self.code == 201
    }

    /// Validation errors to show for this outcome. Empty when the outcome is a success.
    pub fn validation_errors(&self) -> Vec<ValidationIssue> {
        if self.is_success() {
            return Vec::new();
        }

        let issues = self
            .outcome_response
            .as_ref()
            .and_then(|r| r.issue.as_ref());

        if let (true, Some(issues)) = (ISSUE_CODES.contains(&self.code), issues) {
            return issues
                .iter()
                .enumerate()
                .map(|(key, issue)| ValidationIssue {
                    key,
                    severity: issue.severity.clone(),
                    diagnostics: issue.diagnostics.clone().unwrap_or_default(),
                })
                .collect();
        }

        let diagnostics = self
            .outcome_response
            .as_ref()
            .and_then(|r| r.text.clone())
            .filter(|t| !t.is_empty())
            .or_else(|| self.message.clone().filter(|m| !m.is_empty()))
            .unwrap_or_else(|| {
                format!(
                    "HAPI FHIR returned error code {} but no discernible error message",
                    self.code
                )
            });

        vec![ValidationIssue {
            key: 0,
            severity: None,
            diagnostics,
        }]
    }
}

/// True when a test case with this (optional) outcome may be executed.
pub fn outcome_is_valid(outcome: Option<&HapiOperationOutcome>) -> bool {
    outcome.map_or(true, HapiOperationOutcome::is_success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_outcomes_have_no_errors() {
        let outcome = HapiOperationOutcome {
            code: 201,
            ..Default::default()
        };
        assert!(outcome.is_success());
        assert!(outcome.validation_errors().is_empty());
        assert!(outcome_is_valid(None));
        assert!(outcome_is_valid(Some(&outcome)));
    }

    #[test]
    fn structured_issues_are_listed() {
        let outcome: HapiOperationOutcome = serde_json::from_value(json!({
            "code": 422,
            "outcomeResponse": {
                "resourceType": "OperationOutcome",
                "issue": [
                    { "severity": "error", "diagnostics": "Patient.birthDate invalid" },
                    { "severity": "warning", "diagnostics": "Unknown extension" }
                ]
            }
        }))
        .unwrap();

        let errors = outcome.validation_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].key, 1);
        assert_eq!(errors[0].diagnostics, "Patient.birthDate invalid");
        assert!(!outcome_is_valid(Some(&outcome)));
    }

    #[test]
    fn falls_back_to_text_then_message_then_generic() {
        let with_text = HapiOperationOutcome {
            code: 500,
            message: Some("server said no".into()),
            outcome_response: Some(OutcomeResponse {
                text: Some("bundle rejected".into()),
                ..Default::default()
            }),
        };
        assert_eq!(with_text.validation_errors()[0].diagnostics, "bundle rejected");

        let with_message = HapiOperationOutcome {
            code: 500,
            message: Some("server said no".into()),
            outcome_response: None,
        };
        assert_eq!(with_message.validation_errors()[0].diagnostics, "server said no");

        let bare = HapiOperationOutcome {
            code: 400,
            ..Default::default()
        };
        assert_eq!(
            bare.validation_errors()[0].diagnostics,
            "HAPI FHIR returned error code 400 but no discernible error message"
        );
    }
}
