//! Input validation utilities.
//!
//! This module contains functions for validating user inputs to ensure they meet
//! safety and correctness requirements before being stored.

use crate::constants::MAX_TEXT_LENGTH;
use crate::test_case::TestCase;
use crate::{CqmError, CqmResult};
use cqm_types::{bounded_text, NonEmptyText};
use serde_json::Value;

/// Strips markup from user-entered text.
///
/// Unsafe elements and attributes (scripts, event handlers) are removed; the `<`, `>` and `&`
/// escapes left behind in plain text are turned back into characters.
pub fn sanitize_user_input(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    ammonia::clean(input)
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Validates and normalises user-editable test case fields in place.
///
/// Title, description and series are stripped of markup, trimmed and limited to
/// [`MAX_TEXT_LENGTH`] characters.
/// The title must not be blank. The patient bundle, when present and not blank, must be a JSON
/// object.
///
/// # Errors
///
/// Returns `CqmError::Text` for a blank title or over-long text, and `CqmError::InvalidInput` for
/// a bundle that is not a JSON object.
pub fn sanitize_test_case(test_case: &mut TestCase) -> CqmResult<()> {
    let title = sanitize_user_input(&test_case.title);
    test_case.title = NonEmptyText::bounded(title, MAX_TEXT_LENGTH)?.into_inner();
    test_case.description =
        bounded_text(&sanitize_user_input(&test_case.description), MAX_TEXT_LENGTH)?;
    test_case.series = bounded_text(&sanitize_user_input(&test_case.series), MAX_TEXT_LENGTH)?;

    if let Some(json) = test_case.json.as_deref() {
        if json.trim().is_empty() {
            test_case.json = None;
        } else {
            validate_bundle_json(json)?;
        }
    }

    Ok(())
}

/// Validates that a test case bundle parses as a JSON object.
///
/// # Errors
///
/// Returns `CqmError::InvalidInput` if the text is not valid JSON or not an object.
pub fn validate_bundle_json(json: &str) -> CqmResult<()> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| CqmError::InvalidInput(format!("test case JSON is not valid: {e}")))?;

    if !value.is_object() {
        return Err(CqmError::InvalidInput(
            "test case JSON must be an object".into(),
        ));
    }

    Ok(())
}

/// Validates that an identifier is safe to use as a file or directory name.
///
/// # Errors
///
/// Returns `CqmError::InvalidInput` if the id is blank or contains anything other than ASCII
/// alphanumerics, `-` and `_`.
pub fn validate_id(kind: &str, id: &str) -> CqmResult<()> {
    const MAX_ID_LEN: usize = 128;

    if id.trim().is_empty() {
        return Err(CqmError::InvalidInput(format!("{kind} id cannot be empty")));
    }

    if id.len() > MAX_ID_LEN {
        return Err(CqmError::InvalidInput(format!(
            "{kind} id exceeds maximum length of {MAX_ID_LEN} characters"
        )));
    }

    let ok = id
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'_'));

    if !ok {
        return Err(CqmError::InvalidInput(format!(
            "{kind} id contains invalid characters (only alphanumeric, '-', '_' allowed)"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqm_types::TextError;

    fn test_case(title: &str) -> TestCase {
        TestCase {
            title: title.into(),
            ..Default::default()
        }
    }

    #[test]
    fn trims_metadata() {
        let mut tc = TestCase {
            title: "  IPP Pass ".into(),
            description: " first visit ".into(),
            series: " SeriesA".into(),
            json: Some("  ".into()),
            ..Default::default()
        };
        sanitize_test_case(&mut tc).unwrap();
        assert_eq!(tc.title, "IPP Pass");
        assert_eq!(tc.description, "first visit");
        assert_eq!(tc.series, "SeriesA");
        assert_eq!(tc.json, None);
    }

    #[test]
    fn strips_script_and_event_handler_markup() {
        let mut tc = TestCase {
            title: "<img src=x onerror=alert(1)>T".into(),
            description: "<script>alert('x')</script>first visit".into(),
            series: "a < b & c".into(),
            ..Default::default()
        };
        sanitize_test_case(&mut tc).unwrap();

        assert!(!tc.title.contains("onerror"), "{}", tc.title);
        assert!(tc.title.ends_with('T'));
        assert_eq!(tc.description, "first visit");
        assert_eq!(tc.series, "a < b & c");
    }

    #[test]
    fn markup_only_title_is_blank() {
        let err = sanitize_test_case(&mut test_case("<script>x</script>")).unwrap_err();
        assert!(matches!(err, CqmError::Text(TextError::Empty)));
    }

    #[test]
    fn rejects_blank_title() {
        let err = sanitize_test_case(&mut test_case("   ")).unwrap_err();
        assert!(matches!(err, CqmError::Text(TextError::Empty)));
    }

    #[test]
    fn rejects_overlong_series() {
        let mut tc = test_case("title");
        tc.series = "x".repeat(MAX_TEXT_LENGTH + 1);
        let err = sanitize_test_case(&mut tc).unwrap_err();
        assert!(matches!(err, CqmError::Text(TextError::TooLong { .. })));

        tc.series = "x".repeat(MAX_TEXT_LENGTH);
        assert!(sanitize_test_case(&mut tc).is_ok());
    }

    #[test]
    fn bundle_must_be_json_object() {
        assert!(validate_bundle_json(r#"{"resourceType":"Bundle"}"#).is_ok());
        assert!(matches!(
            validate_bundle_json("[1, 2]"),
            Err(CqmError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_bundle_json("{not json"),
            Err(CqmError::InvalidInput(_))
        ));
    }

    #[test]
    fn ids_must_be_path_safe() {
        assert!(validate_id("measure", "7a1b-22_c").is_ok());
        assert!(validate_id("measure", "").is_err());
        assert!(validate_id("measure", "../etc").is_err());
        assert!(validate_id("measure", "a/b").is_err());
        assert!(validate_id("measure", &"a".repeat(129)).is_err());
    }
}
