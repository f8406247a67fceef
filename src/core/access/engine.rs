//! Policy evaluation engine with first-match semantics
//!
//! Walks an ordered statement list and returns the effect of the first
//! statement whose principal pattern, action pattern and conditions all match.
//! Key properties:
//! - Order decides, not effect: an early `allow` beats a later `deny`
//! - No match means deny
//! - Unknown or indeterminate conditions make the statement non-matching
//! - No built-in superuser bypass; express it as an `admin` statement

use super::condition::ConditionRegistry;
use super::context::ResourceContext;
use super::policy::{Action, ConditionRef, Effect, Statement};
use super::principal::Principal;
use std::fmt;
use std::sync::Arc;

/// What happened to one examined statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEntry {
    PrincipalMismatch,
    ActionMismatch,
    /// Condition evaluated to false (after negation)
    ConditionFailed(String),
    /// Condition name not in the registry
    UnknownCondition(String),
    /// Condition could not be decided
    Indeterminate { condition: String, reason: String },
    Matched(Effect),
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEntry::PrincipalMismatch => write!(f, "principal mismatch"),
            TraceEntry::ActionMismatch => write!(f, "action mismatch"),
            TraceEntry::ConditionFailed(name) => write!(f, "condition `{}` failed", name),
            TraceEntry::UnknownCondition(name) => write!(f, "unknown condition `{}`", name),
            TraceEntry::Indeterminate { condition, reason } => {
                write!(f, "condition `{}` indeterminate: {}", condition, reason)
            }
            TraceEntry::Matched(effect) => write!(f, "matched ({})", effect),
        }
    }
}

/// Outcome of evaluating a statement list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EvaluationResult {
    pub allowed: bool,
    /// Index of the deciding statement, if any matched
    pub matched_statement_index: Option<usize>,
    /// Last condition checked on the deciding statement
    pub matched_condition: Option<String>,
    /// One entry per examined statement, in order
    pub trace: Vec<TraceEntry>,
}

impl EvaluationResult {
    /// The default-deny result (no statement matched)
    pub fn denied() -> Self {
        Self::default()
    }

    /// Whether any condition along the way could not be decided
    pub fn indeterminate(&self) -> bool {
        self.trace
            .iter()
            .any(|entry| matches!(entry, TraceEntry::Indeterminate { .. }))
    }

    /// Whether a statement matched (as opposed to falling through to deny)
    pub fn is_explicit(&self) -> bool {
        self.matched_statement_index.is_some()
    }
}

enum ConditionCheck {
    Holds,
    Fails(TraceEntry),
}

/// Policy evaluator
///
/// Holds only the shared condition registry, so it is cheap to clone and safe
/// to use from any number of threads.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    registry: Arc<ConditionRegistry>,
}

impl PolicyEvaluator {
    pub fn new(registry: Arc<ConditionRegistry>) -> Self {
        PolicyEvaluator { registry }
    }

    /// Evaluator backed by the built-in condition library
    pub fn builtin() -> Self {
        Self::new(Arc::new(ConditionRegistry::builtin()))
    }

    pub fn registry(&self) -> &Arc<ConditionRegistry> {
        &self.registry
    }

    /// Evaluate `statements` for one request
    ///
    /// # Examples
    ///
    /// ```
    /// use galaxy_access::access::{Action, PolicyEvaluator, Principal, ResourceContext, Statement};
    /// use galaxy_access::access::store::InMemoryStore;
    /// use galaxy_access::settings::AccessSettings;
    ///
    /// let evaluator = PolicyEvaluator::builtin();
    /// let statements = vec![
    ///     Statement::allow(&["admin"], &["*"]).unwrap(),
    ///     Statement::deny(&["*"], &["*"]).unwrap(),
    /// ];
    ///
    /// let settings = AccessSettings::default();
    /// let store = InMemoryStore::new();
    /// let ctx = ResourceContext::new(&settings, &store);
    ///
    /// let root = Principal::user("1", "root").superuser();
    /// assert!(evaluator.evaluate(&statements, &root, &Action::new("destroy"), &ctx).allowed);
    ///
    /// let alice = Principal::user("2", "alice");
    /// assert!(!evaluator.evaluate(&statements, &alice, &Action::new("list"), &ctx).allowed);
    /// ```
    pub fn evaluate(
        &self,
        statements: &[Statement],
        principal: &Principal,
        action: &Action,
        ctx: &ResourceContext<'_>,
    ) -> EvaluationResult {
        let mut trace = Vec::with_capacity(statements.len());

        for (index, statement) in statements.iter().enumerate() {
            if !statement.matches_principal(principal) {
                trace.push(TraceEntry::PrincipalMismatch);
                continue;
            }
            if !statement.matches_action(action) {
                trace.push(TraceEntry::ActionMismatch);
                continue;
            }

            match self.check_conditions(statement, principal, action, ctx) {
                ConditionCheck::Holds => {
                    trace.push(TraceEntry::Matched(statement.effect));
                    return EvaluationResult {
                        allowed: statement.effect.is_allow(),
                        matched_statement_index: Some(index),
                        matched_condition: statement.conditions.last().map(|c| c.name.clone()),
                        trace,
                    };
                }
                ConditionCheck::Fails(entry) => trace.push(entry),
            }
        }

        EvaluationResult {
            trace,
            ..EvaluationResult::denied()
        }
    }

    fn check_conditions(
        &self,
        statement: &Statement,
        principal: &Principal,
        action: &Action,
        ctx: &ResourceContext<'_>,
    ) -> ConditionCheck {
        for condition in &statement.conditions {
            if let Some(failure) = self.check_condition(condition, statement, principal, action, ctx) {
                return ConditionCheck::Fails(failure);
            }
        }
        ConditionCheck::Holds
    }

    fn check_condition(
        &self,
        condition: &ConditionRef,
        statement: &Statement,
        principal: &Principal,
        action: &Action,
        ctx: &ResourceContext<'_>,
    ) -> Option<TraceEntry> {
        let predicate = match self.registry.resolve(&condition.name) {
            Ok(predicate) => predicate,
            Err(_) => {
                tracing::warn!(
                    condition = %condition.name,
                    sid = statement.sid.as_deref().unwrap_or(""),
                    "Unknown condition, statement skipped"
                );
                return Some(TraceEntry::UnknownCondition(condition.name.clone()));
            }
        };

        match predicate(principal, ctx, action, condition.args.as_slice()) {
            Ok(value) if value != condition.negated => None,
            Ok(_) => Some(TraceEntry::ConditionFailed(condition.name.clone())),
            Err(indeterminate) => {
                tracing::warn!(
                    condition = %condition.name,
                    reason = %indeterminate,
                    principal = %principal.id,
                    "Condition indeterminate, treated as false"
                );
                Some(TraceEntry::Indeterminate {
                    condition: condition.name.clone(),
                    reason: indeterminate.0,
                })
            }
        }
    }
}

impl Default for PolicyEvaluator {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::condition::{Arity, Indeterminate};
    use crate::access::store::InMemoryStore;
    use crate::settings::AccessSettings;

    fn evaluator() -> PolicyEvaluator {
        let mut registry = ConditionRegistry::builtin();
        registry
            .register("alwaysTrue", Arity::None, |_, _, _, _| Ok(true))
            .register("alwaysFalse", Arity::None, |_, _, _, _| Ok(false))
            .register("broken", Arity::None, |_, _, _, _| {
                Err(Indeterminate::new("backend down"))
            });
        PolicyEvaluator::new(Arc::new(registry))
    }

    fn run(statements: &[Statement], principal: &Principal, action: &str) -> EvaluationResult {
        let settings = AccessSettings::default();
        let store = InMemoryStore::new();
        let ctx = ResourceContext::new(&settings, &store);
        evaluator().evaluate(statements, principal, &Action::new(action), &ctx)
    }

    fn alice() -> Principal {
        Principal::user("u1", "alice")
    }

    #[test]
    fn test_empty_list_denies() {
        let result = run(&[], &alice(), "list");
        assert!(!result.allowed);
        assert!(result.trace.is_empty());
        assert!(!result.is_explicit());
    }

    #[test]
    fn test_first_match_wins() {
        let allow = Statement::allow(&["*"], &["list"]).unwrap();
        let deny = Statement::deny(&["*"], &["list"]).unwrap();

        let result = run(&[allow.clone(), deny.clone()], &alice(), "list");
        assert!(result.allowed);
        assert_eq!(result.matched_statement_index, Some(0));

        let result = run(&[deny, allow], &alice(), "list");
        assert!(!result.allowed);
        assert_eq!(result.matched_statement_index, Some(0));
        assert_eq!(result.trace, vec![TraceEntry::Matched(Effect::Deny)]);
    }

    #[test]
    fn test_no_match_denies() {
        let statements = vec![
            Statement::allow(&["admin"], &["*"]).unwrap(),
            Statement::allow(&["authenticated"], &["create"]).unwrap(),
        ];
        let result = run(&statements, &alice(), "list");

        assert!(!result.allowed);
        assert_eq!(
            result.trace,
            vec![TraceEntry::PrincipalMismatch, TraceEntry::ActionMismatch]
        );
    }

    #[test]
    fn test_superuser_not_bypassed() {
        let statements = vec![
            Statement::deny(&["*"], &["destroy"]).unwrap(),
            Statement::allow(&["admin"], &["*"]).unwrap(),
        ];
        let root = Principal::user("0", "root").superuser();

        assert!(!run(&statements, &root, "destroy").allowed);
        assert!(run(&statements, &root, "update").allowed);
    }

    #[test]
    fn test_conditions_are_anded() {
        let statement = Statement::allow(&["*"], &["*"])
            .unwrap()
            .with_condition(ConditionRef::new("alwaysTrue"))
            .with_condition(ConditionRef::new("alwaysFalse"));
        let result = run(&[statement], &alice(), "list");

        assert!(!result.allowed);
        assert_eq!(
            result.trace,
            vec![TraceEntry::ConditionFailed("alwaysFalse".into())]
        );
    }

    #[test]
    fn test_negation() {
        let statements = vec![Statement::allow(&["*"], &["*"])
            .unwrap()
            .with_condition(ConditionRef::new("isSuperuser").negate())];

        assert!(run(&statements, &alice(), "list").allowed);
        let root = Principal::user("0", "root").superuser();
        assert!(!run(&statements, &root, "list").allowed);
    }

    #[test]
    fn test_unknown_condition_fails_closed() {
        let statements = vec![
            Statement::allow(&["*"], &["*"])
                .unwrap()
                .with_condition(ConditionRef::new("doesNotExist")),
            Statement::allow(&["*"], &["*"])
                .unwrap()
                .with_condition(ConditionRef::new("doesNotExist").negate()),
        ];
        let result = run(&statements, &alice(), "list");

        assert!(!result.allowed);
        assert_eq!(
            result.trace,
            vec![
                TraceEntry::UnknownCondition("doesNotExist".into()),
                TraceEntry::UnknownCondition("doesNotExist".into()),
            ]
        );
    }

    #[test]
    fn test_indeterminate_is_false_even_when_negated() {
        let statements = vec![
            Statement::allow(&["*"], &["*"])
                .unwrap()
                .with_condition(ConditionRef::new("broken").negate()),
            Statement::allow(&["*"], &["*"]).unwrap().with_sid("fallback"),
        ];
        let result = run(&statements, &alice(), "list");

        assert!(result.allowed);
        assert_eq!(result.matched_statement_index, Some(1));
        assert!(result.indeterminate());
        assert_eq!(
            result.trace[0],
            TraceEntry::Indeterminate {
                condition: "broken".into(),
                reason: "backend down".into(),
            }
        );
    }

    #[test]
    fn test_matched_condition_reported() {
        let statements = vec![Statement::allow(&["*"], &["*"])
            .unwrap()
            .with_condition(ConditionRef::new("alwaysTrue"))];
        let result = run(&statements, &alice(), "list");

        assert_eq!(result.matched_condition.as_deref(), Some("alwaysTrue"));
    }

    #[test]
    fn test_deterministic() {
        let statements = vec![
            Statement::allow(&["authenticated"], &["<safe_methods>"]).unwrap(),
            Statement::deny(&["*"], &["*"]).unwrap(),
        ];
        let first = run(&statements, &alice(), "retrieve");
        for _ in 0..10 {
            assert_eq!(run(&statements, &alice(), "retrieve"), first);
        }
    }
}
