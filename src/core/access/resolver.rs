//! Statement table and policy resolution
//!
//! The table maps each protected resource kind to its statements, one ordered
//! list per deployment mode, plus an optional document-level override and an
//! optional scoping function for list actions.

use super::policy::Statement;
use crate::error::{AccessError, Result};
use crate::settings::DeploymentMode;
use std::collections::BTreeMap;

/// Policy for one resource kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyConfig {
    pub statements_by_mode: BTreeMap<DeploymentMode, Vec<Statement>>,
    /// Replaces the per-mode lists entirely when set
    pub override_statements: Option<Vec<Statement>>,
    /// Scoping function applied to list results
    pub scoping_function: Option<String>,
}

impl PolicyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statements(mut self, mode: DeploymentMode, statements: Vec<Statement>) -> Self {
        self.statements_by_mode.insert(mode, statements);
        self
    }

    pub fn with_override(mut self, statements: Vec<Statement>) -> Self {
        self.override_statements = Some(statements);
        self
    }

    pub fn with_scoping_function(mut self, name: impl Into<String>) -> Self {
        self.scoping_function = Some(name.into());
        self
    }

    /// Statements for `mode`, falling back to the default mode, then to none
    pub fn statements_for(&self, mode: &DeploymentMode) -> &[Statement] {
        if let Some(statements) = &self.override_statements {
            return statements;
        }
        self.statements_by_mode
            .get(mode)
            .or_else(|| self.statements_by_mode.get(&DeploymentMode::DEFAULT))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every statement in this config, across modes and the override
    pub fn all_statements(&self) -> impl Iterator<Item = &Statement> {
        self.statements_by_mode
            .values()
            .flatten()
            .chain(self.override_statements.iter().flatten())
    }
}

/// Resource kind → policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementTable {
    resources: BTreeMap<String, PolicyConfig>,
}

impl StatementTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the policy for `kind`
    pub fn insert(&mut self, kind: impl Into<String>, config: PolicyConfig) -> Option<PolicyConfig> {
        self.resources.insert(kind.into(), config)
    }

    pub fn with_resource(mut self, kind: impl Into<String>, config: PolicyConfig) -> Self {
        self.insert(kind, config);
        self
    }

    pub fn get(&self, kind: &str) -> Result<&PolicyConfig> {
        self.resources
            .get(kind)
            .ok_or_else(|| AccessError::UnknownResource(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.resources.contains_key(kind)
    }

    /// Resource kinds, sorted
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PolicyConfig)> {
        self.resources.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Effective statements for a request
    ///
    /// An explicit `override_statements` wins. Otherwise the resource must be
    /// known, and its statements are picked by mode with fallback to the
    /// default mode. A known resource with no usable list resolves to an
    /// empty slice, which evaluates to deny.
    pub fn resolve<'a>(
        &'a self,
        kind: &str,
        mode: &DeploymentMode,
        override_statements: Option<&'a [Statement]>,
    ) -> Result<&'a [Statement]> {
        if let Some(statements) = override_statements {
            return Ok(statements);
        }
        Ok(self.get(kind)?.statements_for(mode))
    }

    /// Scoping function configured for `kind`
    pub fn scoping_function(&self, kind: &str) -> Result<Option<&str>> {
        Ok(self.get(kind)?.scoping_function.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statements(action: &str) -> Vec<Statement> {
        vec![Statement::allow(&["*"], &[action]).unwrap()]
    }

    fn table() -> StatementTable {
        StatementTable::new()
            .with_resource(
                "namespaces",
                PolicyConfig::new()
                    .with_statements(DeploymentMode::Standalone, statements("list"))
                    .with_statements(DeploymentMode::Insights, statements("retrieve"))
                    .with_scoping_function("scopeOwnedNamespaces"),
            )
            .with_resource(
                "tokens",
                PolicyConfig::new().with_statements(DeploymentMode::Insights, statements("create")),
            )
            .with_resource(
                "my_namespaces",
                PolicyConfig::new()
                    .with_statements(DeploymentMode::Standalone, statements("list"))
                    .with_override(statements("destroy")),
            )
    }

    #[test]
    fn test_resolve_by_mode() {
        let table = table();
        let standalone = table
            .resolve("namespaces", &DeploymentMode::Standalone, None)
            .unwrap();
        let insights = table
            .resolve("namespaces", &DeploymentMode::Insights, None)
            .unwrap();

        assert_eq!(standalone, statements("list").as_slice());
        assert_eq!(insights, statements("retrieve").as_slice());
    }

    #[test]
    fn test_unknown_mode_falls_back_to_default() {
        let table = table();
        let other = DeploymentMode::parse("cloud");
        assert_eq!(
            table.resolve("namespaces", &other, None).unwrap(),
            statements("list").as_slice()
        );
    }

    #[test]
    fn test_missing_mode_and_default_is_empty() {
        let table = table();
        let resolved = table
            .resolve("tokens", &DeploymentMode::Standalone, None)
            .unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_unknown_resource() {
        let table = table();
        let err = table
            .resolve("collections", &DeploymentMode::Standalone, None)
            .unwrap_err();
        assert!(matches!(err, AccessError::UnknownResource(kind) if kind == "collections"));
    }

    #[test]
    fn test_explicit_override_wins() {
        let table = table();
        let custom = statements("sign");

        let resolved = table
            .resolve("namespaces", &DeploymentMode::Standalone, Some(&custom))
            .unwrap();
        assert_eq!(resolved, custom.as_slice());

        // Override resolves even for kinds the table does not know
        assert!(table
            .resolve("unlisted", &DeploymentMode::Standalone, Some(&custom))
            .is_ok());
    }

    #[test]
    fn test_document_override_beats_modes() {
        let table = table();
        assert_eq!(
            table
                .resolve("my_namespaces", &DeploymentMode::Standalone, None)
                .unwrap(),
            statements("destroy").as_slice()
        );
    }

    #[test]
    fn test_scoping_function_lookup() {
        let table = table();
        assert_eq!(
            table.scoping_function("namespaces").unwrap(),
            Some("scopeOwnedNamespaces")
        );
        assert_eq!(table.scoping_function("tokens").unwrap(), None);
        assert!(table.scoping_function("nope").is_err());
    }
}
