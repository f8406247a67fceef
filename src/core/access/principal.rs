//! Principals and principal patterns
//!
//! The engine never authenticates anyone. It receives an already-validated
//! [`Principal`] from the identity layer and only reads its attributes.

use crate::error::{AccessError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The acting identity being authorized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub username: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub is_authenticated: bool,
    pub is_anonymous: bool,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl Principal {
    /// An unauthenticated caller
    pub fn anonymous() -> Self {
        Principal {
            id: String::new(),
            username: String::new(),
            is_superuser: false,
            is_staff: false,
            is_authenticated: false,
            is_anonymous: true,
            groups: BTreeSet::new(),
        }
    }

    /// An authenticated, unprivileged user
    pub fn user(id: impl Into<String>, username: impl Into<String>) -> Self {
        Principal {
            id: id.into(),
            username: username.into(),
            is_superuser: false,
            is_staff: false,
            is_authenticated: true,
            is_anonymous: false,
            groups: BTreeSet::new(),
        }
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    pub fn staff(mut self) -> Self {
        self.is_staff = true;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}

/// Which principals a statement applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrincipalPattern {
    /// `*` - anyone, including anonymous callers
    Anyone,
    /// `authenticated`
    Authenticated,
    /// `anonymous`
    Anonymous,
    /// `admin` - superusers
    Admin,
    /// `staff`
    Staff,
    /// `group:<name>`
    Group(String),
    /// `id:<id>`
    Id(String),
}

impl PrincipalPattern {
    /// Check if `principal` matches this pattern
    pub fn matches(&self, principal: &Principal) -> bool {
        match self {
            PrincipalPattern::Anyone => true,
            PrincipalPattern::Authenticated => principal.is_authenticated,
            PrincipalPattern::Anonymous => principal.is_anonymous,
            PrincipalPattern::Admin => principal.is_superuser,
            PrincipalPattern::Staff => principal.is_staff,
            PrincipalPattern::Group(name) => principal.is_authenticated && principal.in_group(name),
            PrincipalPattern::Id(id) => principal.is_authenticated && principal.id == *id,
        }
    }
}

impl FromStr for PrincipalPattern {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self> {
        let pattern = match s.trim() {
            "*" => PrincipalPattern::Anyone,
            "authenticated" => PrincipalPattern::Authenticated,
            "anonymous" => PrincipalPattern::Anonymous,
            "admin" => PrincipalPattern::Admin,
            "staff" => PrincipalPattern::Staff,
            other => {
                if let Some(name) = other.strip_prefix("group:").filter(|n| !n.is_empty()) {
                    PrincipalPattern::Group(name.to_string())
                } else if let Some(id) = other.strip_prefix("id:").filter(|n| !n.is_empty()) {
                    PrincipalPattern::Id(id.to_string())
                } else {
                    return Err(AccessError::malformed(format!(
                        "unknown principal pattern `{}`",
                        other
                    )));
                }
            }
        };
        Ok(pattern)
    }
}

impl fmt::Display for PrincipalPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalPattern::Anyone => write!(f, "*"),
            PrincipalPattern::Authenticated => write!(f, "authenticated"),
            PrincipalPattern::Anonymous => write!(f, "anonymous"),
            PrincipalPattern::Admin => write!(f, "admin"),
            PrincipalPattern::Staff => write!(f, "staff"),
            PrincipalPattern::Group(name) => write!(f, "group:{}", name),
            PrincipalPattern::Id(id) => write!(f, "id:{}", id),
        }
    }
}

impl Serialize for PrincipalPattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PrincipalPattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(super::policy::de_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyone_matches_anonymous() {
        assert!(PrincipalPattern::Anyone.matches(&Principal::anonymous()));
        assert!(PrincipalPattern::Anyone.matches(&Principal::user("1", "alice")));
    }

    #[test]
    fn test_authenticated_and_anonymous() {
        let anon = Principal::anonymous();
        let alice = Principal::user("1", "alice");

        assert!(!PrincipalPattern::Authenticated.matches(&anon));
        assert!(PrincipalPattern::Authenticated.matches(&alice));
        assert!(PrincipalPattern::Anonymous.matches(&anon));
        assert!(!PrincipalPattern::Anonymous.matches(&alice));
    }

    #[test]
    fn test_admin_requires_superuser() {
        let alice = Principal::user("1", "alice");
        let root = Principal::user("0", "root").superuser();

        assert!(!PrincipalPattern::Admin.matches(&alice));
        assert!(PrincipalPattern::Admin.matches(&root));
        assert!(!PrincipalPattern::Staff.matches(&root));
        assert!(PrincipalPattern::Staff.matches(&alice.staff()));
    }

    #[test]
    fn test_group_and_id() {
        let alice = Principal::user("7", "alice").with_group("partners");

        assert!(PrincipalPattern::Group("partners".into()).matches(&alice));
        assert!(!PrincipalPattern::Group("admins".into()).matches(&alice));
        assert!(PrincipalPattern::Id("7".into()).matches(&alice));
        assert!(!PrincipalPattern::Id("8".into()).matches(&alice));
        assert!(!PrincipalPattern::Id("".into()).matches(&Principal::anonymous()));
    }

    #[test]
    fn test_parse_and_display() {
        for raw in ["*", "authenticated", "anonymous", "admin", "staff", "group:ops", "id:42"] {
            let pattern: PrincipalPattern = raw.parse().unwrap();
            assert_eq!(pattern.to_string(), raw);
        }

        assert!("group:".parse::<PrincipalPattern>().is_err());
        assert!("everyone".parse::<PrincipalPattern>().is_err());
    }
}
