//! Store name validation.
//!
//! Valid store names:
//! - Must contain something other than whitespace
//! - Must be at most [`MAX_STORE_NAME_LEN`] characters
//! - Must not contain control characters

use crate::error::{RegistryError, Result};

/// Longest accepted store name, in characters.
pub const MAX_STORE_NAME_LEN: usize = 255;

/// Validate a store name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use lockbox_registry::names::validate_store_name;
///
/// assert!(validate_store_name("sessions").is_ok());
/// assert!(validate_store_name("inline-store-01").is_ok());
/// assert!(validate_store_name("  ").is_err());
/// ```
pub fn validate_store_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(invalid(name, "store name must not be empty"));
    }

    let len = name.chars().count();
    if len > MAX_STORE_NAME_LEN {
        return Err(invalid(
            name,
            &format!("store name is {len} characters; the limit is {MAX_STORE_NAME_LEN}"),
        ));
    }

    if let Some(ch) = name.chars().find(|c| c.is_control()) {
        return Err(invalid(name, &format!("contains control character: {ch:?}")));
    }

    Ok(())
}

fn invalid(name: &str, reason: &str) -> RegistryError {
    RegistryError::InvalidStoreName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_store_name("orders").is_ok());
        assert!(validate_store_name("_defaultPartition").is_ok());
        assert!(validate_store_name("cache v2").is_ok());
        assert!(validate_store_name(&"x".repeat(MAX_STORE_NAME_LEN)).is_ok());
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(validate_store_name("").is_err());
        assert!(validate_store_name(" \t").is_err());
    }

    #[test]
    fn overlong_names_are_rejected() {
        let err = validate_store_name(&"x".repeat(MAX_STORE_NAME_LEN + 1)).unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn control_characters_are_rejected() {
        assert!(validate_store_name("a\nb").is_err());
        assert!(validate_store_name("a\u{0}b").is_err());
    }
}
