//! Policy document loading and validation
//!
//! A policy document is the persisted form of the statement table:
//!
//! ```json
//! {
//!   "version": "1.0.0",
//!   "resources": {
//!     "NamespaceViewSet": {
//!       "statements": {
//!         "standalone": [{"action": "list", "principal": "authenticated", "effect": "allow"}],
//!         "insights": [...]
//!       },
//!       "scoping_function": "scopeOwnedNamespaces"
//!     }
//!   }
//! }
//! ```
//!
//! Documents are checked completely before they become a [`StatementTable`],
//! so configuration mistakes surface at startup, never per request.

use super::condition::ConditionRegistry;
use super::conditions::PERMISSION_CONDITIONS;
use super::policy::Statement;
use super::resolver::{PolicyConfig, StatementTable};
use super::scope::ScopingRegistry;
use crate::error::{AccessError, Result};
use crate::settings::DeploymentMode;
use crate::validation::{validate_identifier, IdentifierKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Major document version this crate understands
pub const SUPPORTED_MAJOR_VERSION: u64 = 1;

/// Serialized form of one resource entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    /// Statement lists keyed by deployment mode
    #[serde(default)]
    pub statements: BTreeMap<DeploymentMode, Vec<Statement>>,

    /// Replaces the per-mode lists when present
    #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
    pub override_statements: Option<Vec<Statement>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoping_function: Option<String>,
}

impl From<ResourceEntry> for PolicyConfig {
    fn from(entry: ResourceEntry) -> Self {
        PolicyConfig {
            statements_by_mode: entry.statements,
            override_statements: entry.override_statements,
            scoping_function: entry.scoping_function,
        }
    }
}

impl From<&PolicyConfig> for ResourceEntry {
    fn from(config: &PolicyConfig) -> Self {
        ResourceEntry {
            statements: config.statements_by_mode.clone(),
            override_statements: config.override_statements.clone(),
            scoping_function: config.scoping_function.clone(),
        }
    }
}

/// Versioned policy document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    pub version: semver::Version,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceEntry>,
}

impl PolicyDocument {
    /// Parse a JSON document; any syntax or entry error is a
    /// `MalformedPolicyConfig`
    pub fn from_json_str(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|e| AccessError::malformed(e.to_string()))
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| AccessError::malformed(e.to_string()))
    }

    /// Read a document, picking the format from the file extension
    /// (`.toml` is TOML, anything else is JSON)
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&source),
            _ => Self::from_json_str(&source),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Document describing an existing table
    pub fn from_table(table: &StatementTable) -> Self {
        PolicyDocument {
            version: semver::Version::new(SUPPORTED_MAJOR_VERSION, 0, 0),
            resources: table
                .iter()
                .map(|(kind, config)| (kind.to_string(), ResourceEntry::from(config)))
                .collect(),
        }
    }
}

/// Validates documents against the registries and builds statement tables
#[derive(Debug, Clone, Copy)]
pub struct PolicyLoader<'r> {
    conditions: &'r ConditionRegistry,
    scoping: &'r ScopingRegistry,
}

impl<'r> PolicyLoader<'r> {
    pub fn new(conditions: &'r ConditionRegistry, scoping: &'r ScopingRegistry) -> Self {
        PolicyLoader { conditions, scoping }
    }

    /// Check every part of `document`
    ///
    /// Rejects an unsupported major version, invalid resource kinds, empty
    /// principal or action sets, unknown conditions, wrong condition arity,
    /// malformed permission arguments and unknown scoping functions.
    pub fn validate(&self, document: &PolicyDocument) -> Result<()> {
        if document.version.major != SUPPORTED_MAJOR_VERSION {
            return Err(AccessError::UnsupportedVersion(document.version.clone()));
        }

        for (kind, entry) in &document.resources {
            validate_identifier(IdentifierKind::ResourceKind, kind)?;

            for (mode, statements) in &entry.statements {
                self.validate_statements(statements)
                    .map_err(|e| locate(e, &format!("{}.{}", kind, mode)))?;
            }
            if let Some(statements) = &entry.override_statements {
                self.validate_statements(statements)
                    .map_err(|e| locate(e, &format!("{}.override", kind)))?;
            }

            if let Some(name) = &entry.scoping_function {
                if !self.scoping.contains(name) {
                    return Err(AccessError::UnknownScopingFunction(name.clone()));
                }
            }
        }
        Ok(())
    }

    fn validate_statements(&self, statements: &[Statement]) -> Result<()> {
        for (index, statement) in statements.iter().enumerate() {
            self.validate_statement(statement)
                .map_err(|e| locate(e, &format!("[{}]", index)))?;
        }
        Ok(())
    }

    fn validate_statement(&self, statement: &Statement) -> Result<()> {
        statement.validate()?;
        for condition in &statement.conditions {
            validate_identifier(IdentifierKind::FunctionName, &condition.name)?;
            self.conditions.check(condition)?;
            if PERMISSION_CONDITIONS.contains(&condition.name.as_str()) {
                for arg in &condition.args {
                    validate_identifier(IdentifierKind::Permission, arg)?;
                }
            }
        }
        Ok(())
    }

    /// Validate `document` and turn it into a table
    pub fn build(&self, document: PolicyDocument) -> Result<StatementTable> {
        self.validate(&document)?;

        let version = document.version.clone();
        let mut table = StatementTable::new();
        for (kind, entry) in document.resources {
            table.insert(kind, entry.into());
        }

        tracing::info!(
            version = %version,
            resources = table.len(),
            "Loaded policy document"
        );
        Ok(table)
    }

    pub fn load_json_str(&self, source: &str) -> Result<StatementTable> {
        self.build(PolicyDocument::from_json_str(source)?)
    }

    pub fn load_toml_str(&self, source: &str) -> Result<StatementTable> {
        self.build(PolicyDocument::from_toml_str(source)?)
    }

    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<StatementTable> {
        self.build(PolicyDocument::from_path(path)?)
    }
}

/// Prefix a malformed-config message with where it was found
fn locate(err: AccessError, location: &str) -> AccessError {
    match err {
        AccessError::MalformedPolicyConfig(message) => {
            AccessError::malformed(format!("{}: {}", location, message))
        }
        other => other,
    }
}
