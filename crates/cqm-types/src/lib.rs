//! Validated text primitives shared by the CQM workbench crates.
//!
//! User-entered test case metadata (title, description, series) arrives as free text. These
//! types normalise it once at the boundary so downstream code can rely on trimmed, bounded
//! content.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The trimmed input is longer than the permitted number of characters
    #[error("Text cannot be more than {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Creates a new `NonEmptyText`, additionally bounding its length in characters.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` for blank input and `TextError::TooLong` when the trimmed
    /// input has more than `max` characters.
    pub fn bounded(input: impl AsRef<str>, max: usize) -> Result<Self, TextError> {
        let text = Self::new(input)?;
        check_length(text.as_str(), max)?;
        Ok(text)
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Trims free text and checks it does not exceed `max` characters.
///
/// Blank input is allowed and normalises to an empty string.
///
/// # Errors
///
/// Returns `TextError::TooLong` when the trimmed input is over the limit.
pub fn bounded_text(input: &str, max: usize) -> Result<String, TextError> {
    let trimmed = input.trim();
    check_length(trimmed, max)?;
    Ok(trimmed.to_owned())
}

/// Cuts `input` down to at most `length` characters.
///
/// Blank input is returned unchanged. Truncation respects `char` boundaries.
pub fn truncate_input(input: &str, length: usize) -> String {
    if input.trim().is_empty() || input.chars().count() <= length {
        return input.to_owned();
    }
    input.chars().take(length).collect()
}

fn check_length(text: &str, max: usize) -> Result<(), TextError> {
    let actual = text.chars().count();
    if actual > max {
        return Err(TextError::TooLong { max, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  IPP Pass  ").unwrap();
        assert_eq!(text.as_str(), "IPP Pass");
    }

    #[test]
    fn non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new("   "), Err(TextError::Empty));
    }

    #[test]
    fn bounded_rejects_long_titles() {
        let long = "a".repeat(251);
        assert_eq!(
            NonEmptyText::bounded(&long, 250),
            Err(TextError::TooLong {
                max: 250,
                actual: 251
            })
        );
        assert!(NonEmptyText::bounded("a".repeat(250), 250).is_ok());
    }

    #[test]
    fn bounded_text_allows_blank() {
        assert_eq!(bounded_text("   ", 10).unwrap(), "");
        assert!(bounded_text("abcdefghijk", 10).is_err());
    }

    #[test]
    fn truncate_input_counts_chars_not_bytes() {
        assert_eq!(truncate_input("héllo wörld", 5), "héllo");
        assert_eq!(truncate_input("short", 10), "short");
        assert_eq!(truncate_input("   ", 1), "   ");
    }

    #[test]
    fn deserialize_rejects_blank_text() {
        let err = serde_json::from_str::<NonEmptyText>("\"  \"").unwrap_err();
        assert!(err.to_string().contains("Text cannot be empty"));
    }
}
