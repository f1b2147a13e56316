//! Identifier helpers.
//!
//! Several CircleCI objects are addressed by two values at once, such as a
//! context id plus a variable name. Those are tracked and imported as a
//! single `first:second` string.

use crate::error::ProviderError;

/// Separator between the parts of a composite identifier.
pub const ID_SEPARATOR: char = ':';

/// Join two parts into a composite identifier.
pub fn composite_id(first: &str, second: &str) -> String {
    format!("{}{}{}", first, ID_SEPARATOR, second)
}

/// Split a composite identifier into exactly two non-empty parts.
///
/// The split happens at the first separator: leading parts (context ids,
/// project slugs, org ids) never contain `:`, while checkout key
/// fingerprints do. `format` names the parts for the error message, e.g.
/// `"context_id:variable_name"`.
pub fn parse_composite_id(raw: &str, format: &str) -> Result<(String, String), ProviderError> {
    match raw.split_once(ID_SEPARATOR) {
        Some((first, second)) if !first.is_empty() && !second.is_empty() => {
            Ok((first.to_string(), second.to_string()))
        }
        _ => Err(ProviderError::InvalidRequest(format!(
            "Expected import identifier with format: {}. Got: {:?}",
            format, raw
        ))),
    }
}

/// Parse a job number taken from an identifier.
pub fn parse_job_number(raw: &str) -> Result<i64, ProviderError> {
    raw.parse::<i64>().map_err(|e| {
        ProviderError::InvalidRequest(format!("Invalid job number {:?}: {}", raw, e))
    })
}

/// Reject empty bare identifiers.
pub fn require_id(raw: &str) -> Result<String, ProviderError> {
    if raw.is_empty() {
        return Err(ProviderError::InvalidRequest(
            "id cannot be empty".to_string(),
        ));
    }
    Ok(raw.to_string())
}

/// Whether `id` looks like a CircleCI UUID (36 characters, 4 dashes).
pub fn is_uuid(id: &str) -> bool {
    id.len() == 36 && id.matches('-').count() == 4
}
