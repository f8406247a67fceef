//! Collection scoping for list actions
//!
//! Rather than evaluating every record of a list response, a named scoping
//! function turns "principal may see record R" into a single [`ScopeFilter`]
//! which a [`Collection`] backend applies once. Backends may only drop
//! records, never add them.

use super::condition::Indeterminate;
use super::conditions::VIEW_REPOSITORY;
use super::context::{ContextObject, ResourceContext};
use super::principal::Principal;
use super::store::InMemoryStore;
use crate::error::{AccessError, Result};
use ahash::AHashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Permission that exposes private synclist distributions
pub const VIEW_SYNCLIST: &str = "galaxy.view_synclist";

/// Permission that marks a namespace as managed by the principal
pub const CHANGE_NAMESPACE: &str = "galaxy.change_namespace";

/// Narrowing expression over a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeFilter {
    /// Keep everything
    All,
    /// Keep nothing
    Nothing,
    /// Records owned by the given principal id
    OwnedBy(String),
    /// Records not marked private
    Public,
    /// Records with one of the given ids
    Ids(BTreeSet<String>),
    /// Records whose attribute `key` is one of `values`
    AttributeIn { key: String, values: BTreeSet<String> },
    /// Records the inner filter rejects
    Not(Box<ScopeFilter>),
    /// Union
    Any(Vec<ScopeFilter>),
    /// Intersection
    Every(Vec<ScopeFilter>),
}

impl ScopeFilter {
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScopeFilter::Ids(ids.into_iter().map(Into::into).collect())
    }

    pub fn attribute_in<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScopeFilter::AttributeIn {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn negate(self) -> Self {
        ScopeFilter::Not(Box::new(self))
    }

    /// Whether `record` survives this filter
    pub fn matches<R: ScopedRecord + ?Sized>(&self, record: &R) -> bool {
        match self {
            ScopeFilter::All => true,
            ScopeFilter::Nothing => false,
            ScopeFilter::OwnedBy(id) => record.owner_id() == Some(id.as_str()),
            ScopeFilter::Public => !record.is_private(),
            ScopeFilter::Ids(ids) => ids.contains(record.record_id()),
            ScopeFilter::AttributeIn { key, values } => record
                .attribute(key)
                .is_some_and(|value| values.contains(value)),
            ScopeFilter::Not(inner) => !inner.matches(record),
            ScopeFilter::Any(filters) => filters.iter().any(|f| f.matches(record)),
            ScopeFilter::Every(filters) => filters.iter().all(|f| f.matches(record)),
        }
    }
}

impl fmt::Display for ScopeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeFilter::All => write!(f, "all"),
            ScopeFilter::Nothing => write!(f, "nothing"),
            ScopeFilter::OwnedBy(id) => write!(f, "owner = {}", id),
            ScopeFilter::Public => write!(f, "public"),
            ScopeFilter::Ids(ids) => write!(f, "id in {:?}", ids),
            ScopeFilter::AttributeIn { key, values } => write!(f, "{} in {:?}", key, values),
            ScopeFilter::Not(inner) => write!(f, "not ({})", inner),
            ScopeFilter::Any(filters) => write_joined(f, filters, " or "),
            ScopeFilter::Every(filters) => write_joined(f, filters, " and "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, filters: &[ScopeFilter], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", filter)?;
    }
    write!(f, ")")
}

/// A record that can be filtered
pub trait ScopedRecord {
    fn record_id(&self) -> &str;
    fn owner_id(&self) -> Option<&str>;
    fn is_private(&self) -> bool;
    /// String attribute used by [`ScopeFilter::AttributeIn`]
    fn attribute(&self, key: &str) -> Option<&str>;
}

impl ScopedRecord for ContextObject {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    fn is_private(&self) -> bool {
        self.private
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        match key {
            "namespace" => self.namespace.as_deref(),
            "kind" => Some(self.kind.as_str()),
            _ => self.attributes.get(key).and_then(|v| v.as_str()),
        }
    }
}

/// A filterable set of records
pub trait Collection: Sized {
    /// Keep only records matching `filter`
    fn narrow(self, filter: &ScopeFilter) -> Self;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the records, in collection order
    fn ids(&self) -> Vec<String>;
}

/// In-memory collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VecCollection<T> {
    records: Vec<T>,
}

impl<T> VecCollection<T> {
    pub fn new(records: Vec<T>) -> Self {
        VecCollection { records }
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn into_inner(self) -> Vec<T> {
        self.records
    }
}

impl<T: ScopedRecord> Collection for VecCollection<T> {
    fn narrow(mut self, filter: &ScopeFilter) -> Self {
        match filter {
            ScopeFilter::All => {}
            ScopeFilter::Nothing => self.records.clear(),
            _ => self.records.retain(|record| filter.matches(record)),
        }
        self
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn ids(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.record_id().to_string())
            .collect()
    }
}

impl<T> From<Vec<T>> for VecCollection<T> {
    fn from(records: Vec<T>) -> Self {
        Self::new(records)
    }
}

impl<T> FromIterator<T> for VecCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for VecCollection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// A registered scoping function
pub type ScopingFn =
    dyn Fn(&Principal, &ResourceContext<'_>) -> std::result::Result<ScopeFilter, Indeterminate> + Send + Sync;

/// Name → scoping function map, built once at startup
#[derive(Clone, Default)]
pub struct ScopingRegistry {
    entries: AHashMap<String, Arc<ScopingFn>>,
}

impl ScopingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in scoping functions
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register("ownedOnly", owned_only)
            .register("publicOrOwned", public_or_owned)
            .register(
                "scopeByViewRepositoryPermissions",
                scope_by_view_repository_permissions,
            )
            .register("scopeSyncListDistributions", scope_synclist_distributions)
            .register("scopeOwnedNamespaces", scope_owned_namespaces)
            .register("scopeByGroupMembership", scope_by_group_membership);
        registry
    }

    pub fn register<F>(&mut self, name: &str, function: F) -> &mut Self
    where
        F: Fn(&Principal, &ResourceContext<'_>) -> std::result::Result<ScopeFilter, Indeterminate>
            + Send
            + Sync
            + 'static,
    {
        if self.entries.insert(name.to_string(), Arc::new(function)).is_some() {
            tracing::debug!(scoping_function = name, "Replaced scoping function registration");
        }
        self
    }

    pub fn resolve(&self, name: &str) -> Result<&ScopingFn> {
        self.entries
            .get(name)
            .map(|f| f.as_ref())
            .ok_or_else(|| AccessError::UnknownScopingFunction(name.to_string()))
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
}

impl fmt::Debug for ScopingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopingRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// Applies named scoping functions to collections
#[derive(Debug, Clone)]
pub struct Scoper {
    registry: Arc<ScopingRegistry>,
}

impl Scoper {
    pub fn new(registry: Arc<ScopingRegistry>) -> Self {
        Scoper { registry }
    }

    pub fn builtin() -> Self {
        Self::new(Arc::new(ScopingRegistry::builtin()))
    }

    pub fn registry(&self) -> &Arc<ScopingRegistry> {
        &self.registry
    }

    /// The filter `name` produces for this principal and request
    pub fn filter_for(
        &self,
        name: &str,
        principal: &Principal,
        ctx: &ResourceContext<'_>,
    ) -> Result<ScopeFilter> {
        let function = self.registry.resolve(name)?;
        function(principal, ctx).map_err(|e| AccessError::ConditionIndeterminate {
            condition: name.to_string(),
            reason: e.0,
        })
    }

    /// Narrow `collection` with the scoping function `name`
    ///
    /// The result is always a subset of `collection`.
    pub fn scope<C: Collection>(
        &self,
        name: &str,
        principal: &Principal,
        collection: C,
        ctx: &ResourceContext<'_>,
    ) -> Result<C> {
        let filter = self.filter_for(name, principal, ctx)?;
        tracing::trace!(scoping_function = name, filter = %filter, "Scoping collection");
        Ok(collection.narrow(&filter))
    }
}

impl Default for Scoper {
    fn default() -> Self {
        Self::builtin()
    }
}

type ScopeOutcome = std::result::Result<ScopeFilter, Indeterminate>;

/// Records owned by the principal; superusers see everything
pub fn owned_only(principal: &Principal, _: &ResourceContext<'_>) -> ScopeOutcome {
    if !principal.is_authenticated {
        return Ok(ScopeFilter::Nothing);
    }
    if principal.is_superuser {
        return Ok(ScopeFilter::All);
    }
    Ok(ScopeFilter::OwnedBy(principal.id.clone()))
}

/// Public records plus the principal's own
pub fn public_or_owned(principal: &Principal, _: &ResourceContext<'_>) -> ScopeOutcome {
    if !principal.is_authenticated {
        return Ok(ScopeFilter::Public);
    }
    Ok(ScopeFilter::Any(vec![
        ScopeFilter::Public,
        ScopeFilter::OwnedBy(principal.id.clone()),
    ]))
}

/// Public repositories plus private ones the principal may view
pub fn scope_by_view_repository_permissions(
    principal: &Principal,
    ctx: &ResourceContext<'_>,
) -> ScopeOutcome {
    let store = ctx.store();
    if store.has_model_permission(principal, VIEW_REPOSITORY)? {
        return Ok(ScopeFilter::All);
    }
    let visible = store.objects_with_permission(
        principal,
        VIEW_REPOSITORY,
        InMemoryStore::REPOSITORY_KIND,
    )?;
    Ok(ScopeFilter::Any(vec![
        ScopeFilter::Public,
        ScopeFilter::Ids(visible.into_iter().collect()),
    ]))
}

/// Hide synclist distributions except those the principal may view.
///
/// Synclist records carry the attribute `synclist = "true"`.
pub fn scope_synclist_distributions(principal: &Principal, ctx: &ResourceContext<'_>) -> ScopeOutcome {
    let store = ctx.store();
    if store.has_model_permission(principal, VIEW_SYNCLIST)? {
        return Ok(ScopeFilter::All);
    }
    let mine = store.objects_with_permission(principal, VIEW_SYNCLIST, "distribution")?;
    Ok(ScopeFilter::Any(vec![
        ScopeFilter::attribute_in("synclist", ["true"]).negate(),
        ScopeFilter::Ids(mine.into_iter().collect()),
    ]))
}

/// Namespaces the principal can change
pub fn scope_owned_namespaces(principal: &Principal, ctx: &ResourceContext<'_>) -> ScopeOutcome {
    if !principal.is_authenticated {
        return Ok(ScopeFilter::Nothing);
    }
    if principal.is_superuser {
        return Ok(ScopeFilter::All);
    }
    let ids = ctx.store().objects_with_permission(
        principal,
        CHANGE_NAMESPACE,
        InMemoryStore::NAMESPACE_KIND,
    )?;
    Ok(ScopeFilter::Ids(ids.into_iter().collect()))
}

/// Records whose `group` attribute is one of the principal's groups
pub fn scope_by_group_membership(principal: &Principal, _: &ResourceContext<'_>) -> ScopeOutcome {
    if !principal.is_authenticated {
        return Ok(ScopeFilter::Nothing);
    }
    if principal.is_superuser {
        return Ok(ScopeFilter::All);
    }
    Ok(ScopeFilter::attribute_in("group", principal.groups.iter().cloned()))
}
