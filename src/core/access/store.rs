//! Domain store collaborator
//!
//! Conditions never touch storage directly. They go through the narrow
//! [`DomainStore`] lookups, which a host application implements over its own
//! database. [`InMemoryStore`] is a complete implementation used by tests and
//! by embedders that keep ownership data in memory.

use super::principal::Principal;
use ahash::{AHashMap, AHashSet};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Reference to a domain object, e.g. `namespace/acme`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub kind: String,
    pub id: String,
}

impl ObjectRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        ObjectRef {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A lookup that could not complete
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("lookup failed: {0}")]
pub struct LookupError(pub String);

/// Repository behind a distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub id: String,
    pub name: String,
    pub private: bool,
}

impl RepositoryInfo {
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(InMemoryStore::REPOSITORY_KIND, self.id.clone())
    }
}

/// Narrow lookups the condition library needs from the domain store
///
/// Implementations must be safe to call from many request threads at once.
/// Any retry policy belongs to the implementation; the engine treats an
/// `Err` as indeterminate and fails closed.
pub trait DomainStore: Send + Sync {
    /// User ids recorded as owners of a namespace
    fn namespace_owners(&self, namespace: &str) -> Result<Vec<String>, LookupError>;

    /// User ids recorded as owners of a legacy (role) namespace
    fn legacy_namespace_owners(&self, namespace: &str) -> Result<Vec<String>, LookupError>;

    /// Global (model-level) permission check
    fn has_model_permission(&self, principal: &Principal, permission: &str)
        -> Result<bool, LookupError>;

    /// Object-level permission check
    fn has_object_permission(
        &self,
        principal: &Principal,
        permission: &str,
        object: &ObjectRef,
    ) -> Result<bool, LookupError>;

    /// Ids of objects of `kind` on which the principal holds `permission`
    fn objects_with_permission(
        &self,
        principal: &Principal,
        permission: &str,
        kind: &str,
    ) -> Result<HashSet<String>, LookupError>;

    /// Repository served under a distribution base path
    fn repository_for_distribution(
        &self,
        base_path: &str,
    ) -> Result<Option<RepositoryInfo>, LookupError>;
}

/// In-memory [`DomainStore`]
///
/// Follows Django's permission semantics: active superusers hold every
/// permission, and permissions granted to a group apply to its members.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    namespace_owners: AHashMap<String, Vec<String>>,
    legacy_owners: AHashMap<String, Vec<String>>,
    user_permissions: AHashMap<String, AHashSet<String>>,
    group_permissions: AHashMap<String, AHashSet<String>>,
    user_object_permissions: AHashMap<(String, String), AHashSet<ObjectRef>>,
    group_object_permissions: AHashMap<(String, String), AHashSet<ObjectRef>>,
    distributions: AHashMap<String, RepositoryInfo>,
    unavailable: bool,
}

impl InMemoryStore {
    pub const NAMESPACE_KIND: &'static str = "namespace";
    pub const REPOSITORY_KIND: &'static str = "repository";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_namespace_owner(&mut self, namespace: &str, user_id: &str) -> &mut Self {
        self.namespace_owners
            .entry(namespace.to_string())
            .or_default()
            .push(user_id.to_string());
        self
    }

    pub fn add_legacy_namespace_owner(&mut self, namespace: &str, user_id: &str) -> &mut Self {
        self.legacy_owners
            .entry(namespace.to_string())
            .or_default()
            .push(user_id.to_string());
        self
    }

    pub fn grant_user_permission(&mut self, user_id: &str, permission: &str) -> &mut Self {
        self.user_permissions
            .entry(user_id.to_string())
            .or_default()
            .insert(permission.to_string());
        self
    }

    pub fn grant_group_permission(&mut self, group: &str, permission: &str) -> &mut Self {
        self.group_permissions
            .entry(group.to_string())
            .or_default()
            .insert(permission.to_string());
        self
    }

    pub fn grant_user_object_permission(
        &mut self,
        user_id: &str,
        permission: &str,
        object: ObjectRef,
    ) -> &mut Self {
        self.user_object_permissions
            .entry((user_id.to_string(), permission.to_string()))
            .or_default()
            .insert(object);
        self
    }

    pub fn grant_group_object_permission(
        &mut self,
        group: &str,
        permission: &str,
        object: ObjectRef,
    ) -> &mut Self {
        self.group_object_permissions
            .entry((group.to_string(), permission.to_string()))
            .or_default()
            .insert(object);
        self
    }

    pub fn add_distribution(&mut self, base_path: &str, repository: RepositoryInfo) -> &mut Self {
        self.distributions.insert(base_path.to_string(), repository);
        self
    }

    /// Make every lookup fail, simulating a storage outage
    pub fn set_unavailable(&mut self, unavailable: bool) -> &mut Self {
        self.unavailable = unavailable;
        self
    }

    fn ensure_available(&self) -> Result<(), LookupError> {
        if self.unavailable {
            return Err(LookupError("domain store unavailable".to_string()));
        }
        Ok(())
    }

    fn object_grants<'a>(
        &'a self,
        principal: &'a Principal,
        permission: &'a str,
    ) -> impl Iterator<Item = &'a AHashSet<ObjectRef>> + 'a {
        let user = self
            .user_object_permissions
            .get(&(principal.id.clone(), permission.to_string()));
        let groups = principal.groups.iter().filter_map(move |group| {
            self.group_object_permissions
                .get(&(group.clone(), permission.to_string()))
        });
        user.into_iter().chain(groups)
    }
}

impl DomainStore for InMemoryStore {
    fn namespace_owners(&self, namespace: &str) -> Result<Vec<String>, LookupError> {
        self.ensure_available()?;
        Ok(self.namespace_owners.get(namespace).cloned().unwrap_or_default())
    }

    fn legacy_namespace_owners(&self, namespace: &str) -> Result<Vec<String>, LookupError> {
        self.ensure_available()?;
        Ok(self.legacy_owners.get(namespace).cloned().unwrap_or_default())
    }

    fn has_model_permission(
        &self,
        principal: &Principal,
        permission: &str,
    ) -> Result<bool, LookupError> {
        self.ensure_available()?;
        if !principal.is_authenticated {
            return Ok(false);
        }
        if principal.is_superuser {
            return Ok(true);
        }
        let direct = self
            .user_permissions
            .get(&principal.id)
            .is_some_and(|perms| perms.contains(permission));
        let via_group = principal.groups.iter().any(|group| {
            self.group_permissions
                .get(group)
                .is_some_and(|perms| perms.contains(permission))
        });
        Ok(direct || via_group)
    }

    fn has_object_permission(
        &self,
        principal: &Principal,
        permission: &str,
        object: &ObjectRef,
    ) -> Result<bool, LookupError> {
        self.ensure_available()?;
        if !principal.is_authenticated {
            return Ok(false);
        }
        if principal.is_superuser {
            return Ok(true);
        }
        Ok(self
            .object_grants(principal, permission)
            .any(|objects| objects.contains(object)))
    }

    fn objects_with_permission(
        &self,
        principal: &Principal,
        permission: &str,
        kind: &str,
    ) -> Result<HashSet<String>, LookupError> {
        self.ensure_available()?;
        if !principal.is_authenticated {
            return Ok(HashSet::new());
        }
        Ok(self
            .object_grants(principal, permission)
            .flat_map(|objects| objects.iter())
            .filter(|object| object.kind == kind)
            .map(|object| object.id.clone())
            .collect())
    }

    fn repository_for_distribution(
        &self,
        base_path: &str,
    ) -> Result<Option<RepositoryInfo>, LookupError> {
        self.ensure_available()?;
        Ok(self.distributions.get(base_path).cloned())
    }
}
