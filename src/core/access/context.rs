//! Per-request resource context
//!
//! A [`ResourceContext`] is built by the request layer for a single request
//! and dropped afterwards. It gives conditions on-demand access to the object
//! being acted on, the route and body values, inbound entitlement claims, the
//! settings and the domain store. Object fetches may be lazy; a lazy fetch
//! runs at most once per request.

use super::store::{DomainStore, LookupError, ObjectRef};
use crate::settings::{AccessSettings, FeatureFlags};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;

/// An object the request acts on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextObject {
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ContextObject {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        ContextObject {
            kind: kind.into(),
            id: id.into(),
            owner_id: None,
            namespace: None,
            private: false,
            attributes: Map::new(),
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.kind.clone(), self.id.clone())
    }
}

/// A single entitlement entry from the identity header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    #[serde(default)]
    pub is_entitled: bool,
}

/// Inbound identity claims (already validated upstream)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub entitlements: BTreeMap<String, Entitlement>,
    #[serde(default)]
    pub org_id: Option<String>,
}

impl Claims {
    pub fn entitled(mut self, name: impl Into<String>) -> Self {
        self.entitlements
            .insert(name.into(), Entitlement { is_entitled: true });
        self
    }

    pub fn is_entitled(&self, name: &str) -> bool {
        self.entitlements.get(name).is_some_and(|e| e.is_entitled)
    }
}

type ObjectFetcher<'a> = Box<dyn Fn() -> Result<Option<ContextObject>, LookupError> + 'a>;

/// Holds an object that is either known up front or fetched on first use
struct ObjectSlot<'a> {
    fetch: Option<ObjectFetcher<'a>>,
    value: OnceCell<Result<Option<ContextObject>, LookupError>>,
}

impl<'a> ObjectSlot<'a> {
    fn empty() -> Self {
        ObjectSlot {
            fetch: None,
            value: OnceCell::new(),
        }
    }

    fn ready(object: ContextObject) -> Self {
        ObjectSlot {
            fetch: None,
            value: OnceCell::from(Ok(Some(object))),
        }
    }

    fn lazy(fetch: ObjectFetcher<'a>) -> Self {
        ObjectSlot {
            fetch: Some(fetch),
            value: OnceCell::new(),
        }
    }

    fn get(&self) -> Result<Option<&ContextObject>, LookupError> {
        let loaded = self.value.get_or_init(|| match &self.fetch {
            Some(fetch) => fetch(),
            None => Ok(None),
        });
        match loaded {
            Ok(object) => Ok(object.as_ref()),
            Err(e) => Err(e.clone()),
        }
    }
}

/// Request-scoped view over everything a condition may consult
pub struct ResourceContext<'a> {
    settings: &'a AccessSettings,
    store: &'a dyn DomainStore,
    object: ObjectSlot<'a>,
    parent: ObjectSlot<'a>,
    route: BTreeMap<String, String>,
    query: BTreeMap<String, String>,
    data: Map<String, Value>,
    claims: Option<Claims>,
}

impl<'a> ResourceContext<'a> {
    pub fn new(settings: &'a AccessSettings, store: &'a dyn DomainStore) -> Self {
        ResourceContext {
            settings,
            store,
            object: ObjectSlot::empty(),
            parent: ObjectSlot::empty(),
            route: BTreeMap::new(),
            query: BTreeMap::new(),
            data: Map::new(),
            claims: None,
        }
    }

    pub fn with_object(mut self, object: ContextObject) -> Self {
        self.object = ObjectSlot::ready(object);
        self
    }

    /// Defer fetching the object until a condition asks for it
    pub fn with_lazy_object<F>(mut self, fetch: F) -> Self
    where
        F: Fn() -> Result<Option<ContextObject>, LookupError> + 'a,
    {
        self.object = ObjectSlot::lazy(Box::new(fetch));
        self
    }

    pub fn with_parent(mut self, parent: ContextObject) -> Self {
        self.parent = ObjectSlot::ready(parent);
        self
    }

    pub fn with_route(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.route.insert(key.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_claims(mut self, claims: Claims) -> Self {
        self.claims = Some(claims);
        self
    }

    /// The object acted on; `Err` when a lazy fetch failed
    pub fn object(&self) -> Result<Option<&ContextObject>, LookupError> {
        self.object.get()
    }

    pub fn parent(&self) -> Result<Option<&ContextObject>, LookupError> {
        self.parent.get()
    }

    pub fn route(&self, key: &str) -> Option<&str> {
        self.route.get(key).map(String::as_str)
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// A body field as a non-empty string
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn settings(&self) -> &AccessSettings {
        self.settings
    }

    pub fn features(&self) -> &FeatureFlags {
        &self.settings.features
    }

    pub fn store(&self) -> &dyn DomainStore {
        self.store
    }
}

impl fmt::Debug for ResourceContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceContext")
            .field("route", &self.route)
            .field("query", &self.query)
            .field("data", &self.data)
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}
