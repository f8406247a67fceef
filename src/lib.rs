//! # Galaxy Access - Statement-Based Access Policies
//!
//! `galaxy-access` decides whether a principal may perform an action on a
//! protected resource of a content hub, and narrows list results to the
//! records the principal may see.
//!
//! - **Ordered statements**: the first statement whose principal, action and
//!   conditions all match decides; nothing matching means deny
//! - **Named conditions** from a closed registry (ownership, permissions,
//!   entitlements, path protection, feature flags, repository visibility)
//! - **Per deployment mode** statement tables, loaded from JSON or TOML and
//!   validated once at startup
//! - **Collection scoping** for list actions
//! - **Atomic reload** of the policy table
//!
//! ## Quick Start
//!
//! ```rust
//! use galaxy_access::{AccessChecker, EvaluationRequest, Principal, ResourceContext, Result};
//! use galaxy_access::access::{ContextObject, InMemoryStore};
//! use galaxy_access::settings::AccessSettings;
//!
//! # fn main() -> Result<()> {
//! let checker = AccessChecker::builtin()?;
//! let settings = AccessSettings::default();
//!
//! let mut store = InMemoryStore::new();
//! store.grant_user_permission("42", "galaxy.change_namespace");
//!
//! let ctx = ResourceContext::new(&settings, &store)
//!     .with_object(ContextObject::new("namespace", "acme"));
//! let alice = Principal::user("42", "alice");
//!
//! let request = EvaluationRequest::new("NamespaceViewSet", "update", &alice, &ctx);
//! assert!(checker.has_permission(&request));
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Policies
//!
//! ```rust
//! use galaxy_access::{AccessChecker, PolicyDocument, Result};
//!
//! # fn main() -> Result<()> {
//! let document = PolicyDocument::from_json_str(r#"{
//!     "version": "1.0.0",
//!     "resources": {
//!         "ReportViewSet": {
//!             "statements": {
//!                 "standalone": [
//!                     {"action": "*", "principal": "admin", "effect": "allow"},
//!                     {"action": "list", "principal": "authenticated", "effect": "allow"}
//!                 ]
//!             },
//!             "scoping_function": "ownedOnly"
//!         }
//!     }
//! }"#)?;
//!
//! let checker = AccessChecker::from_document(document)?;
//! assert!(checker.snapshot().table().contains("ReportViewSet"));
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules so crate:: paths inside core work
#[allow(unused_imports)]
pub(crate) use crate::core::error;
pub use crate::core::{access, settings, validation};

// Re-export the types most callers need
pub use crate::core::{
    access::{
        AccessChecker, Action, ConditionRef, ConditionRegistry, Effect, EvaluationRequest,
        EvaluationResult, PolicyDocument, PolicyEvaluator, Principal, ResourceContext, ScopeFilter,
        Statement, StatementTable,
    },
    error::{AccessError, Result},
    settings::{AccessSettings, DeploymentMode, FeatureFlags},
};
