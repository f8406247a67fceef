//! Statement-based access policies for the content hub
//!
//! Provides request-level authorization with:
//! - Ordered allow/deny statements where the first full match decides
//! - Named conditions from a closed registry, validated at load time
//! - Per deployment mode statement tables loaded from JSON or TOML
//! - Collection scoping for list actions
//! - Atomic policy reload through an immutable snapshot

pub mod condition;
pub mod conditions;
pub mod context;
pub mod scope;
pub mod store;

mod checker;
mod engine;
mod loader;
mod policy;
mod principal;
mod resolver;
mod statements;

pub use checker::{AccessChecker, EvaluationRequest, PolicyHandle, PolicySnapshot};
pub use condition::{Arity, ConditionOutcome, ConditionRegistry, Indeterminate};
pub use context::{Claims, ContextObject, Entitlement, ResourceContext};
pub use engine::{EvaluationResult, PolicyEvaluator, TraceEntry};
pub use loader::{PolicyDocument, PolicyLoader, ResourceEntry, SUPPORTED_MAJOR_VERSION};
pub use policy::{Action, ActionPattern, ConditionRef, Effect, HttpMethod, Statement};
pub use principal::{Principal, PrincipalPattern};
pub use resolver::{PolicyConfig, StatementTable};
pub use scope::{Collection, ScopeFilter, ScopedRecord, Scoper, ScopingRegistry, VecCollection};
pub use statements::{builtin_document, builtin_table, BUILTIN_POLICY_JSON};
pub use store::{DomainStore, InMemoryStore, LookupError, ObjectRef, RepositoryInfo};

#[cfg(test)]
mod tests;
