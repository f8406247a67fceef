//! Built-in statement table
//!
//! The default policies for the content hub's protected resources, shipped as
//! a policy document embedded in the crate. Hosts may use it as-is or load
//! their own document with [`PolicyLoader`].

use super::condition::ConditionRegistry;
use super::loader::{PolicyDocument, PolicyLoader};
use super::resolver::StatementTable;
use super::scope::ScopingRegistry;
use crate::error::Result;

/// Source of the built-in policy document
pub const BUILTIN_POLICY_JSON: &str = include_str!("statements.json");

/// Parse the built-in document without validating it
pub fn builtin_document() -> Result<PolicyDocument> {
    PolicyDocument::from_json_str(BUILTIN_POLICY_JSON)
}

/// Validate the built-in document against `conditions` and `scoping` and
/// build its table
pub fn builtin_table(
    conditions: &ConditionRegistry,
    scoping: &ScopingRegistry,
) -> Result<StatementTable> {
    PolicyLoader::new(conditions, scoping).build(builtin_document()?)
}
