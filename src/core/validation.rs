//! Validation for identifiers that appear in policy documents and settings
//!
//! Policy documents are data, so every name they carry is checked once at load
//! time. A typo in a resource kind or condition name must stop startup rather
//! than silently produce a table that denies (or worse, allows) everything.

use crate::error::{AccessError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Kinds of identifiers with distinct syntax rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// Protected resource kind, e.g. `NamespaceViewSet`
    ResourceKind,
    /// Condition or scoping function name, e.g. `hasModelPermission`
    FunctionName,
    /// Django-style permission, e.g. `galaxy.add_namespace`
    Permission,
    /// DNS host name, e.g. `galaxy.ansible.com`
    Host,
}

impl IdentifierKind {
    fn pattern(self) -> &'static str {
        match self {
            IdentifierKind::ResourceKind => r"^[A-Za-z][A-Za-z0-9_]*$",
            IdentifierKind::FunctionName => r"^[a-z][A-Za-z0-9_]*$",
            IdentifierKind::Permission => r"^[a-z][a-z0-9_]*\.[a-z][a-z0-9_]*$",
            IdentifierKind::Host => r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*$",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            IdentifierKind::ResourceKind => "resource kind",
            IdentifierKind::FunctionName => "function name",
            IdentifierKind::Permission => "permission",
            IdentifierKind::Host => "host",
        }
    }

    /// Compiled pattern, built on first use
    fn regex(self) -> Result<&'static Regex> {
        static RESOURCE_KIND: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
        static FUNCTION_NAME: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
        static PERMISSION: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
        static HOST: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

        let cell = match self {
            IdentifierKind::ResourceKind => &RESOURCE_KIND,
            IdentifierKind::FunctionName => &FUNCTION_NAME,
            IdentifierKind::Permission => &PERMISSION,
            IdentifierKind::Host => &HOST,
        };
        cell.get_or_init(|| Regex::new(self.pattern()))
            .as_ref()
            .map_err(|e| AccessError::malformed(e.to_string()))
    }

    /// Maximum accepted length
    const MAX_LENGTH: usize = 253;
}

/// Check `value` against the syntax rules for `kind`
///
/// # Examples
///
/// ```
/// use galaxy_access::validation::{validate_identifier, IdentifierKind};
///
/// assert!(validate_identifier(IdentifierKind::Permission, "galaxy.add_namespace").is_ok());
/// assert!(validate_identifier(IdentifierKind::Permission, "add_namespace").is_err());
/// assert!(validate_identifier(IdentifierKind::FunctionName, "isSuperuser").is_ok());
/// ```
pub fn validate_identifier(kind: IdentifierKind, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(AccessError::malformed(format!(
            "{} cannot be empty",
            kind.describe()
        )));
    }

    if value.len() > IdentifierKind::MAX_LENGTH {
        return Err(AccessError::malformed(format!(
            "{} too long: {} characters (max {})",
            kind.describe(),
            value.len(),
            IdentifierKind::MAX_LENGTH
        )));
    }

    if !kind.regex()?.is_match(value) {
        return Err(AccessError::malformed(format!(
            "invalid {} `{}`",
            kind.describe(),
            value
        )));
    }

    Ok(())
}

/// Returns `true` if `value` is a syntactically valid identifier of `kind`
pub fn is_valid_identifier(kind: IdentifierKind, value: &str) -> bool {
    validate_identifier(kind, value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kinds() {
        assert!(is_valid_identifier(IdentifierKind::ResourceKind, "NamespaceViewSet"));
        assert!(is_valid_identifier(IdentifierKind::ResourceKind, "legacy_namespace"));
        assert!(!is_valid_identifier(IdentifierKind::ResourceKind, "1Namespace"));
        assert!(!is_valid_identifier(IdentifierKind::ResourceKind, "Name space"));
        assert!(!is_valid_identifier(IdentifierKind::ResourceKind, ""));
    }

    #[test]
    fn test_function_names() {
        assert!(is_valid_identifier(IdentifierKind::FunctionName, "isSuperuser"));
        assert!(is_valid_identifier(IdentifierKind::FunctionName, "owned_only"));
        assert!(!is_valid_identifier(IdentifierKind::FunctionName, "IsSuperuser"));
        assert!(!is_valid_identifier(IdentifierKind::FunctionName, "is-superuser"));
    }

    #[test]
    fn test_permissions() {
        assert!(is_valid_identifier(IdentifierKind::Permission, "galaxy.add_namespace"));
        assert!(is_valid_identifier(IdentifierKind::Permission, "ansible.view_ansiblerepository"));
        assert!(!is_valid_identifier(IdentifierKind::Permission, "galaxy."));
        assert!(!is_valid_identifier(IdentifierKind::Permission, "Galaxy.add"));
        assert!(!is_valid_identifier(IdentifierKind::Permission, "galaxy.add.namespace"));
    }

    #[test]
    fn test_hosts() {
        assert!(is_valid_identifier(IdentifierKind::Host, "galaxy.ansible.com"));
        assert!(is_valid_identifier(IdentifierKind::Host, "localhost"));
        assert!(!is_valid_identifier(IdentifierKind::Host, "-bad.example.com"));
        assert!(!is_valid_identifier(IdentifierKind::Host, "bad..example.com"));
        assert!(!is_valid_identifier(IdentifierKind::Host, "https://galaxy.ansible.com"));
    }

    #[test]
    fn test_compiled_pattern_reused() {
        let first = IdentifierKind::Permission.regex().unwrap();
        let second = IdentifierKind::Permission.regex().unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(!std::ptr::eq(first, IdentifierKind::Host.regex().unwrap()));

        for _ in 0..3 {
            assert!(is_valid_identifier(IdentifierKind::Permission, "galaxy.add_namespace"));
            assert!(!is_valid_identifier(IdentifierKind::Permission, "galaxy"));
        }
    }

    #[test]
    fn test_length_limit() {
        let long = "a".repeat(300);
        assert!(validate_identifier(IdentifierKind::ResourceKind, &long).is_err());
    }
}
