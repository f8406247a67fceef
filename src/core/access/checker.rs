//! Request-facing access checker
//!
//! [`AccessChecker`] ties the pieces together: it resolves the statements for
//! a resource kind and deployment mode, evaluates them, logs the decision and
//! narrows list results with the resource's scoping function.
//!
//! The checker reads an immutable [`PolicySnapshot`] through a
//! [`PolicyHandle`]. Reloading builds a complete new snapshot and swaps the
//! pointer; requests already in flight finish against the snapshot they
//! started with.

use super::condition::ConditionRegistry;
use super::context::ResourceContext;
use super::engine::{EvaluationResult, PolicyEvaluator};
use super::loader::{PolicyDocument, PolicyLoader};
use super::policy::{Action, Statement};
use super::principal::Principal;
use super::resolver::StatementTable;
use super::scope::{Collection, ScopeFilter, Scoper, ScopingRegistry};
use super::statements;
use crate::error::Result;
use crate::settings::DeploymentMode;
use parking_lot::RwLock;
use std::sync::Arc;

/// One authorization question
#[derive(Debug)]
pub struct EvaluationRequest<'r, 'c> {
    pub resource_kind: &'r str,
    pub action: Action,
    pub principal: &'r Principal,
    pub context: &'r ResourceContext<'c>,
    /// Falls back to the context settings when unset
    pub deployment_mode: Option<DeploymentMode>,
    /// Replaces the table's statements for this request
    pub override_statements: Option<&'r [Statement]>,
}

impl<'r, 'c> EvaluationRequest<'r, 'c> {
    pub fn new(
        resource_kind: &'r str,
        action: impl Into<Action>,
        principal: &'r Principal,
        context: &'r ResourceContext<'c>,
    ) -> Self {
        EvaluationRequest {
            resource_kind,
            action: action.into(),
            principal,
            context,
            deployment_mode: None,
            override_statements: None,
        }
    }

    /// Set the deployment mode from a string; unknown values are kept and
    /// resolve to the default mode's statements
    pub fn with_mode(mut self, mode: &str) -> Self {
        self.deployment_mode = Some(DeploymentMode::parse(mode));
        self
    }

    pub fn with_override(mut self, statements: &'r [Statement]) -> Self {
        self.override_statements = Some(statements);
        self
    }

    /// Mode this request is evaluated under
    pub fn mode(&self) -> &DeploymentMode {
        self.deployment_mode
            .as_ref()
            .unwrap_or(&self.context.settings().deployment_mode)
    }
}

/// Everything needed to answer requests, immutable once built
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    table: StatementTable,
    evaluator: PolicyEvaluator,
    scoper: Scoper,
}

impl PolicySnapshot {
    pub fn new(
        table: StatementTable,
        conditions: Arc<ConditionRegistry>,
        scoping: Arc<ScopingRegistry>,
    ) -> Self {
        PolicySnapshot {
            table,
            evaluator: PolicyEvaluator::new(conditions),
            scoper: Scoper::new(scoping),
        }
    }

    /// Built-in registries and the built-in statement table
    pub fn builtin() -> Result<Self> {
        let conditions = Arc::new(ConditionRegistry::builtin());
        let scoping = Arc::new(ScopingRegistry::builtin());
        let table = statements::builtin_table(&conditions, &scoping)?;
        Ok(Self::new(table, conditions, scoping))
    }

    /// Built-in registries with a custom document
    pub fn from_document(document: PolicyDocument) -> Result<Self> {
        let conditions = Arc::new(ConditionRegistry::builtin());
        let scoping = Arc::new(ScopingRegistry::builtin());
        let table = PolicyLoader::new(&conditions, &scoping).build(document)?;
        Ok(Self::new(table, conditions, scoping))
    }

    /// Same registries, different table; the document is validated first
    pub fn with_document(&self, document: PolicyDocument) -> Result<Self> {
        let table = PolicyLoader::new(self.conditions(), self.scoping()).build(document)?;
        Ok(Self::new(
            table,
            Arc::clone(self.evaluator.registry()),
            Arc::clone(self.scoper.registry()),
        ))
    }

    pub fn table(&self) -> &StatementTable {
        &self.table
    }

    pub fn evaluator(&self) -> &PolicyEvaluator {
        &self.evaluator
    }

    pub fn scoper(&self) -> &Scoper {
        &self.scoper
    }

    pub fn conditions(&self) -> &ConditionRegistry {
        self.evaluator.registry()
    }

    pub fn scoping(&self) -> &ScopingRegistry {
        self.scoper.registry()
    }
}

/// Atomically swappable pointer to the current snapshot
///
/// The lock is held only to clone or replace the `Arc`, never during
/// evaluation.
#[derive(Debug)]
pub struct PolicyHandle {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyHandle {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        PolicyHandle {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot in effect right now
    pub fn load(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Install `snapshot`, returning the previous one
    pub fn swap(&self, snapshot: PolicySnapshot) -> Arc<PolicySnapshot> {
        let next = Arc::new(snapshot);
        let resources = next.table().len();
        let previous = std::mem::replace(&mut *self.current.write(), next);
        tracing::info!(resources, "Swapped policy snapshot");
        previous
    }
}

/// Access checker
///
/// Cheap to clone; clones share the same [`PolicyHandle`].
#[derive(Debug, Clone)]
pub struct AccessChecker {
    handle: Arc<PolicyHandle>,
}

impl AccessChecker {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        AccessChecker {
            handle: Arc::new(PolicyHandle::new(snapshot)),
        }
    }

    /// Checker over the built-in policies
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(PolicySnapshot::builtin()?))
    }

    pub fn from_document(document: PolicyDocument) -> Result<Self> {
        Ok(Self::new(PolicySnapshot::from_document(document)?))
    }

    pub fn handle(&self) -> &Arc<PolicyHandle> {
        &self.handle
    }

    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.handle.load()
    }

    /// Validate `document` against the current registries and make it live
    pub fn reload(&self, document: PolicyDocument) -> Result<()> {
        let next = self.handle.load().with_document(document)?;
        self.handle.swap(next);
        Ok(())
    }

    /// Evaluate a request
    ///
    /// Fails only when the resource kind is unknown and no override was
    /// given. Condition problems never surface as errors; they deny and show
    /// up in the trace.
    pub fn check(&self, request: &EvaluationRequest<'_, '_>) -> Result<EvaluationResult> {
        let snapshot = self.handle.load();
        let mode = request.mode();
        let statements =
            snapshot
                .table()
                .resolve(request.resource_kind, mode, request.override_statements)?;

        let result = snapshot.evaluator().evaluate(
            statements,
            request.principal,
            &request.action,
            request.context,
        );

        tracing::debug!(
            resource = request.resource_kind,
            action = %request.action.name,
            principal = %request.principal.id,
            mode = %mode,
            allowed = result.allowed,
            matched = ?result.matched_statement_index,
            "Access decision"
        );
        Ok(result)
    }

    /// Boolean decision; an unknown resource kind denies
    pub fn has_permission(&self, request: &EvaluationRequest<'_, '_>) -> bool {
        match self.check(request) {
            Ok(result) => result.allowed,
            Err(e) => {
                tracing::warn!(resource = request.resource_kind, error = %e, "Access check failed");
                false
            }
        }
    }

    /// Filter the resource's scoping function produces for this request.
    ///
    /// No scoping function means [`ScopeFilter::All`]. An unknown resource,
    /// unknown function or failed lookup narrows to [`ScopeFilter::Nothing`].
    pub fn scope_filter(&self, request: &EvaluationRequest<'_, '_>) -> ScopeFilter {
        let snapshot = self.handle.load();
        match self.try_scope_filter(&snapshot, request) {
            Ok(filter) => filter,
            Err(e) => {
                tracing::warn!(
                    resource = request.resource_kind,
                    error = %e,
                    "Scoping failed, returning no records"
                );
                ScopeFilter::Nothing
            }
        }
    }

    fn try_scope_filter(
        &self,
        snapshot: &PolicySnapshot,
        request: &EvaluationRequest<'_, '_>,
    ) -> Result<ScopeFilter> {
        match snapshot.table().scoping_function(request.resource_kind)? {
            Some(name) => snapshot
                .scoper()
                .filter_for(name, request.principal, request.context),
            None => Ok(ScopeFilter::All),
        }
    }

    /// Narrow a list result to what the principal may see
    pub fn scope_queryset<C: Collection>(&self, request: &EvaluationRequest<'_, '_>, collection: C) -> C {
        collection.narrow(&self.scope_filter(request))
    }

    /// Scope with an explicitly named function, bypassing the table
    pub fn scope_with<C: Collection>(
        &self,
        name: &str,
        principal: &Principal,
        collection: C,
        ctx: &ResourceContext<'_>,
    ) -> Result<C> {
        self.handle.load().scoper().scope(name, principal, collection, ctx)
    }
}

impl From<PolicySnapshot> for AccessChecker {
    fn from(snapshot: PolicySnapshot) -> Self {
        Self::new(snapshot)
    }
}
