//! Typed settings for the access engine
//!
//! The host application owns its own configuration system; the engine only
//! needs a handful of values (deployment mode, feature flags, reserved base
//! paths). They are gathered here and handed to every request through the
//! [`ResourceContext`](crate::access::ResourceContext), so no condition ever
//! reads global state.

use crate::error::{AccessError, Result};
use crate::validation::{is_valid_identifier, IdentifierKind};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use validator::{Validate, ValidationError};

/// Environment-level flag selecting which statement set applies
///
/// Parsing never fails: anything that is not a known mode is kept as
/// [`DeploymentMode::Other`] and falls back to the default mode's statements
/// at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeploymentMode {
    /// Self-hosted hub
    Standalone,
    /// Hosted (multi-tenant) service
    Insights,
    /// Unrecognised mode string
    Other(String),
}

impl DeploymentMode {
    /// Mode used when a resource has no statements for the requested mode
    pub const DEFAULT: DeploymentMode = DeploymentMode::Standalone;

    /// Parse a mode string leniently
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "standalone" => DeploymentMode::Standalone,
            "insights" => DeploymentMode::Insights,
            _ => DeploymentMode::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeploymentMode::Standalone => "standalone",
            DeploymentMode::Insights => "insights",
            DeploymentMode::Other(s) => s,
        }
    }
}

impl Default for DeploymentMode {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<String> for DeploymentMode {
    fn from(value: String) -> Self {
        DeploymentMode::parse(&value)
    }
}

impl From<&str> for DeploymentMode {
    fn from(value: &str) -> Self {
        DeploymentMode::parse(value)
    }
}

impl From<DeploymentMode> for String {
    fn from(mode: DeploymentMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Boolean feature flags consumed by flag-backed conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Users, groups and roles may be managed locally
    pub local_resource_management: bool,
    /// Anonymous users may download collection artifacts
    pub unauthenticated_download: bool,
    /// Anonymous users may browse collections and namespaces
    pub unauthenticated_access: bool,
    /// Legacy role endpoints are served
    pub legacy_roles: bool,
    /// A collection signing service is configured
    pub signing_service_configured: bool,
    /// Approval requires a signature on the collection
    pub require_signatures_for_approval: bool,
    /// Detached signatures may be uploaded
    pub upload_signatures: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        FeatureFlags {
            local_resource_management: true,
            unauthenticated_download: false,
            unauthenticated_access: false,
            legacy_roles: false,
            signing_service_configured: false,
            require_signatures_for_approval: false,
            upload_signatures: false,
        }
    }
}

/// Settings handed to the engine at startup
///
/// # Examples
///
/// ```
/// use galaxy_access::settings::{AccessSettings, DeploymentMode};
///
/// let settings = AccessSettings::from_toml_str(r#"
///     deployment_mode = "insights"
///     reserved_base_paths = ["published", "staging"]
///
///     [features]
///     unauthenticated_access = true
/// "#).unwrap();
///
/// assert_eq!(settings.deployment_mode, DeploymentMode::Insights);
/// assert!(settings.features.unauthenticated_access);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AccessSettings {
    /// Statement set selector
    pub deployment_mode: DeploymentMode,

    /// Distribution base paths that user-created content may never target
    #[validate(custom(function = "validate_base_paths"))]
    pub reserved_base_paths: Vec<String>,

    /// Hosts whose remotes must be synced through a requirements file
    #[validate(custom(function = "validate_hosts"))]
    pub community_remote_hosts: Vec<String>,

    /// Feature flags
    pub features: FeatureFlags,
}

impl Default for AccessSettings {
    fn default() -> Self {
        AccessSettings {
            deployment_mode: DeploymentMode::DEFAULT,
            reserved_base_paths: [
                "rh-certified",
                "validated",
                "community",
                "published",
                "staging",
                "rejected",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            community_remote_hosts: [
                "galaxy.ansible.com",
                "galaxy-dev.ansible.com",
                "galaxy-qa.ansible.com",
                "beta-galaxy.ansible.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            features: FeatureFlags::default(),
        }
    }
}

impl AccessSettings {
    /// Parse and validate settings from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: AccessSettings = toml::from_str(source)?;
        settings.check()?;
        Ok(settings)
    }

    /// Read, parse and validate settings from a TOML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Run field validation
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| AccessError::InvalidSettings(e.to_string()))
    }

    /// Returns `true` if `base_path` is one of the reserved base paths
    pub fn is_reserved_base_path(&self, base_path: &str) -> bool {
        self.reserved_base_paths.iter().any(|p| p == base_path)
    }

    /// Builder-style setter for the deployment mode
    pub fn with_mode(mut self, mode: DeploymentMode) -> Self {
        self.deployment_mode = mode;
        self
    }

    /// Builder-style setter for the feature flags
    pub fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }
}

fn validate_base_paths(paths: &Vec<String>) -> std::result::Result<(), ValidationError> {
    for path in paths {
        if path.trim().is_empty() || path.contains('/') {
            let mut err = ValidationError::new("base_path");
            err.message = Some(Cow::Owned(format!("invalid reserved base path `{}`", path)));
            return Err(err);
        }
    }
    Ok(())
}

fn validate_hosts(hosts: &Vec<String>) -> std::result::Result<(), ValidationError> {
    for host in hosts {
        if !is_valid_identifier(IdentifierKind::Host, host) {
            let mut err = ValidationError::new("host");
            err.message = Some(Cow::Owned(format!("invalid host `{}`", host)));
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing_is_lenient() {
        assert_eq!(DeploymentMode::parse("standalone"), DeploymentMode::Standalone);
        assert_eq!(DeploymentMode::parse(" Insights "), DeploymentMode::Insights);
        assert_eq!(
            DeploymentMode::parse("community"),
            DeploymentMode::Other("community".to_string())
        );
        assert_eq!(DeploymentMode::parse("").as_str(), "");
    }

    #[test]
    fn test_defaults() {
        let settings = AccessSettings::default();
        assert_eq!(settings.deployment_mode, DeploymentMode::Standalone);
        assert!(settings.features.local_resource_management);
        assert!(!settings.features.unauthenticated_access);
        assert!(settings.is_reserved_base_path("published"));
        assert!(!settings.is_reserved_base_path("my-distro"));
        assert!(settings.check().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let settings = AccessSettings::from_toml_str("").unwrap();
        assert_eq!(settings, AccessSettings::default());
    }

    #[test]
    fn test_toml_overrides() {
        let settings = AccessSettings::from_toml_str(
            r#"
            deployment_mode = "insights"
            community_remote_hosts = ["hub.example.com"]

            [features]
            local_resource_management = false
            unauthenticated_download = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.deployment_mode, DeploymentMode::Insights);
        assert_eq!(settings.community_remote_hosts, vec!["hub.example.com"]);
        assert!(!settings.features.local_resource_management);
        assert!(settings.features.unauthenticated_download);
        assert!(!settings.features.legacy_roles);
    }

    #[test]
    fn test_invalid_host_rejected() {
        let result = AccessSettings::from_toml_str(
            r#"community_remote_hosts = ["https://galaxy.ansible.com"]"#,
        );
        assert!(matches!(result, Err(AccessError::InvalidSettings(_))));
    }

    #[test]
    fn test_invalid_base_path_rejected() {
        let result = AccessSettings::from_toml_str(r#"reserved_base_paths = ["", "ok"]"#);
        assert!(matches!(result, Err(AccessError::InvalidSettings(_))));

        let result = AccessSettings::from_toml_str(r#"reserved_base_paths = ["a/b"]"#);
        assert!(matches!(result, Err(AccessError::InvalidSettings(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = AccessSettings::from_toml_str("deployment_mode = [");
        assert!(matches!(result, Err(AccessError::Toml(_))));
    }
}
