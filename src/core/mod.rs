//! Access policy engine internals
//!
//! - [`error`] - Error types for loading and resolving policies
//! - [`validation`] - Identifier syntax checks for documents and settings
//! - [`settings`] - Deployment mode, feature flags and reserved base paths
//! - [`access`] - Statements, conditions, evaluation, scoping and the checker
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ AccessChecker                               │
//! │  - PolicyHandle → Arc<PolicySnapshot>       │
//! ├─────────────────────────────────────────────┤
//! │ StatementTable (per kind, per mode)         │
//! │  - resolve(kind, mode, override)            │
//! ├─────────────────────────────────────────────┤
//! │ PolicyEvaluator                             │
//! │  - first full match decides, else deny      │
//! │  - ConditionRegistry (closed set)           │
//! ├─────────────────────────────────────────────┤
//! │ Scoper                                      │
//! │  - ScopingRegistry → ScopeFilter            │
//! │  - Collection::narrow (subset only)         │
//! ├─────────────────────────────────────────────┤
//! │ ResourceContext                             │
//! │  - object, route, body, claims, settings    │
//! │  - DomainStore lookups                      │
//! └─────────────────────────────────────────────┘
//! ```

pub mod access;
pub mod error;
pub mod settings;
pub mod validation;
