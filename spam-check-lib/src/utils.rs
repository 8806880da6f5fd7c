//! Utility functions for identifier handling.
//!
//! The pipeline performs no structural validation of identifiers beyond
//! rejecting ones that carry no token at all.

use crate::error::SpamCheckError;
use crate::types::Identifier;

/// Validate a raw identifier and return it without surrounding whitespace.
///
/// # Arguments
///
/// * `identifier` - The raw identifier as it arrived on the input conduit
///
/// # Returns
///
/// The trimmed identifier, or `Err(SpamCheckError)` if nothing remains.
pub fn validate_identifier(identifier: &str) -> Result<&str, SpamCheckError> {
    let trimmed = identifier.trim();

    if trimmed.is_empty() {
        return Err(SpamCheckError::invalid_identifier(
            identifier,
            "Identifier cannot be empty",
        ));
    }

    Ok(trimmed)
}

/// Parse identifiers from text, one per line.
///
/// Empty lines and lines starting with '#' are ignored, as is anything
/// after an inline '#'.
///
/// # Example
///
/// ```rust
/// use spam_check_lib::parse_identifiers;
///
/// let ids = parse_identifiers("a@example.com\n# comment\n\nb@example.com # inline\n");
/// assert_eq!(ids, vec!["a@example.com", "b@example.com"]);
/// ```
pub fn parse_identifiers(text: &str) -> Vec<Identifier> {
    text.lines()
        .filter_map(|line| line.split('#').next())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
