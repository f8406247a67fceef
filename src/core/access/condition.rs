//! Condition registry
//!
//! Statements reference conditions by name. The registry maps each name to a
//! compiled predicate plus the number of arguments it accepts, so a policy
//! document can be checked completely when it is loaded. The set is closed:
//! there is no way to evaluate a condition that was not registered.

use super::context::ResourceContext;
use super::policy::{Action, ConditionRef};
use super::principal::Principal;
use super::store::LookupError;
use crate::error::{AccessError, Result};
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

/// A condition that could not be decided (e.g. a failed lookup)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indeterminate(pub String);

impl Indeterminate {
    pub fn new(reason: impl Into<String>) -> Self {
        Indeterminate(reason.into())
    }
}

impl fmt::Display for Indeterminate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<LookupError> for Indeterminate {
    fn from(e: LookupError) -> Self {
        Indeterminate(e.0)
    }
}

/// Result of running a single predicate
pub type ConditionOutcome = std::result::Result<bool, Indeterminate>;

/// A registered predicate
///
/// Receives the principal, the request context, the action and the
/// statement-supplied arguments. Must not mutate domain state.
pub type ConditionFn =
    dyn Fn(&Principal, &ResourceContext<'_>, &Action, &[String]) -> ConditionOutcome + Send + Sync;

/// Number of arguments a condition accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    None,
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::None => count == 0,
            Arity::Exactly(n) => count == *n,
            Arity::AtLeast(n) => count >= *n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::None => write!(f, "no arguments"),
            Arity::Exactly(1) => write!(f, "exactly 1 argument"),
            Arity::Exactly(n) => write!(f, "exactly {} arguments", n),
            Arity::AtLeast(n) => write!(f, "at least {} arguments", n),
        }
    }
}

#[derive(Clone)]
struct Registered {
    arity: Arity,
    predicate: Arc<ConditionFn>,
}

/// Name → predicate map, built once at startup
#[derive(Clone, Default)]
pub struct ConditionRegistry {
    entries: AHashMap<String, Registered>,
}

impl ConditionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in condition library
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        super::conditions::register_builtin(&mut registry);
        registry
    }

    /// Register `predicate` under `name`, replacing any earlier registration
    pub fn register<F>(&mut self, name: &str, arity: Arity, predicate: F) -> &mut Self
    where
        F: Fn(&Principal, &ResourceContext<'_>, &Action, &[String]) -> ConditionOutcome
            + Send
            + Sync
            + 'static,
    {
        let previous = self.entries.insert(
            name.to_string(),
            Registered {
                arity,
                predicate: Arc::new(predicate),
            },
        );
        if previous.is_some() {
            tracing::debug!(condition = name, "Replaced condition registration");
        }
        self
    }

    /// Look up a predicate by name
    pub fn resolve(&self, name: &str) -> Result<&ConditionFn> {
        self.entries
            .get(name)
            .map(|r| r.predicate.as_ref())
            .ok_or_else(|| AccessError::UnknownCondition(name.to_string()))
    }

    /// Check that `condition` names a registered predicate with a valid
    /// argument count
    pub fn check(&self, condition: &ConditionRef) -> Result<()> {
        self.check_arity(&condition.name, condition.args.len())
    }

    /// Check that `name` is registered and accepts `count` arguments
    pub fn check_arity(&self, name: &str, count: usize) -> Result<()> {
        let registered = self
            .entries
            .get(name)
            .ok_or_else(|| AccessError::UnknownCondition(name.to_string()))?;
        if !registered.arity.accepts(count) {
            return Err(AccessError::malformed(format!(
                "condition `{}` takes {}, got {}",
                name, registered.arity, count
            )));
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionRegistry")
            .field("names", &self.names())
            .finish()
    }
}
