//! Access policy statements
//!
//! A statement maps (principal, action) to an effect, gated by an ordered list
//! of named conditions. Statement lists are evaluated in order and the first
//! statement that fully matches decides.
//!
//! The wire format follows the conventions of Django REST access policies:
//!
//! ```json
//! {
//!   "action": ["list", "retrieve"],
//!   "principal": "authenticated",
//!   "effect": "allow",
//!   "condition": ["hasModelPermission:galaxy.view_namespace", "!isSuperuser"]
//! }
//! ```

use super::principal::{Principal, PrincipalPattern};
use crate::error::{AccessError, Result};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Effect of a policy statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn is_allow(&self) -> bool {
        matches!(self, Effect::Allow)
    }
}

impl FromStr for Effect {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            other => Err(AccessError::malformed(format!("unknown effect `{}`", other))),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
        }
    }
}

/// HTTP method the action was invoked with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// GET, HEAD and OPTIONS
    pub fn is_safe(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Options)
    }
}

impl FromStr for HttpMethod {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(AccessError::malformed(format!("unknown HTTP method `{}`", other))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HttpMethod::Get => "get",
            HttpMethod::Head => "head",
            HttpMethod::Options => "options",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Patch => "patch",
            HttpMethod::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

/// The action a request performs, e.g. `list`, `retrieve`, `sign`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    pub method: HttpMethod,
    /// Additional names this action also answers to
    pub sub_actions: BTreeSet<String>,
}

impl Action {
    /// Create an action, deriving the HTTP method from the action name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let method = match name.as_str() {
            "create" | "sign" | "upload" | "move_content" | "copy_content" | "curate" => {
                HttpMethod::Post
            }
            "update" => HttpMethod::Put,
            "partial_update" => HttpMethod::Patch,
            "destroy" => HttpMethod::Delete,
            _ => HttpMethod::Get,
        };
        Action {
            name,
            method,
            sub_actions: BTreeSet::new(),
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_sub_action(mut self, sub_action: impl Into<String>) -> Self {
        self.sub_actions.insert(sub_action.into());
        self
    }

    /// Check if this action answers to `name`
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.sub_actions.contains(name)
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Action::new(name)
    }
}

/// Which actions a statement applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionPattern {
    /// `*`
    Any,
    /// A view action name
    Named(String),
    /// `<safe_methods>`
    SafeMethods,
    /// `<method:put>`
    Method(HttpMethod),
}

impl ActionPattern {
    pub fn matches(&self, action: &Action) -> bool {
        match self {
            ActionPattern::Any => true,
            ActionPattern::Named(name) => action.answers_to(name),
            ActionPattern::SafeMethods => action.method.is_safe(),
            ActionPattern::Method(method) => action.method == *method,
        }
    }
}

impl FromStr for ActionPattern {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "*" {
            return Ok(ActionPattern::Any);
        }
        if s == "<safe_methods>" {
            return Ok(ActionPattern::SafeMethods);
        }
        if let Some(method) = s.strip_prefix("<method:").and_then(|m| m.strip_suffix('>')) {
            return Ok(ActionPattern::Method(method.parse()?));
        }
        if s.is_empty() || s.contains(['<', '>', ' ']) {
            return Err(AccessError::malformed(format!("invalid action pattern `{}`", s)));
        }
        Ok(ActionPattern::Named(s.to_string()))
    }
}

impl fmt::Display for ActionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionPattern::Any => write!(f, "*"),
            ActionPattern::Named(name) => write!(f, "{}", name),
            ActionPattern::SafeMethods => write!(f, "<safe_methods>"),
            ActionPattern::Method(method) => write!(f, "<method:{}>", method),
        }
    }
}

/// Reference from a statement to a registered condition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConditionRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negated: bool,
}

impl ConditionRef {
    pub fn new(name: impl Into<String>) -> Self {
        ConditionRef {
            name: name.into(),
            args: Vec::new(),
            negated: false,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }
}

/// Parses the shorthand forms `name`, `name:a,b`, `!name` and `not name`
impl FromStr for ConditionRef {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self> {
        let mut rest = s.trim();
        let mut negated = false;
        if let Some(stripped) = rest.strip_prefix('!') {
            negated = true;
            rest = stripped.trim_start();
        } else if let Some(stripped) = rest.strip_prefix("not ") {
            negated = true;
            rest = stripped.trim_start();
        }

        let (name, args) = match rest.split_once(':') {
            Some((name, args)) => (
                name.trim(),
                args.split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect(),
            ),
            None => (rest, Vec::new()),
        };

        if name.is_empty() {
            return Err(AccessError::malformed(format!("empty condition reference `{}`", s)));
        }

        Ok(ConditionRef {
            name: name.to_string(),
            args,
            negated,
        })
    }
}

impl fmt::Display for ConditionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!")?;
        }
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, ":{}", self.args.join(","))?;
        }
        Ok(())
    }
}

/// A single policy statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement ID (optional, for diagnostics)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Principals this statement applies to
    #[serde(rename = "principal", deserialize_with = "one_or_many_parsed")]
    #[serde(serialize_with = "serialize_display_seq")]
    pub principals: Vec<PrincipalPattern>,

    /// Actions this statement applies to
    #[serde(rename = "action", deserialize_with = "one_or_many_parsed")]
    #[serde(serialize_with = "serialize_display_seq")]
    pub actions: Vec<ActionPattern>,

    /// Effect when the statement matches
    #[serde(deserialize_with = "parsed", serialize_with = "serialize_display")]
    pub effect: Effect,

    /// Conditions, all of which must hold
    #[serde(
        rename = "condition",
        default,
        deserialize_with = "conditions",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub conditions: Vec<ConditionRef>,
}

impl Statement {
    /// Create a new statement without conditions
    pub fn new(effect: Effect, principals: Vec<PrincipalPattern>, actions: Vec<ActionPattern>) -> Self {
        Statement {
            sid: None,
            principals,
            actions,
            effect,
            conditions: Vec::new(),
        }
    }

    /// Build an `allow` statement from pattern strings
    pub fn allow(principals: &[&str], actions: &[&str]) -> Result<Self> {
        Self::from_literals(Effect::Allow, principals, actions)
    }

    /// Build a `deny` statement from pattern strings
    pub fn deny(principals: &[&str], actions: &[&str]) -> Result<Self> {
        Self::from_literals(Effect::Deny, principals, actions)
    }

    fn from_literals(effect: Effect, principals: &[&str], actions: &[&str]) -> Result<Self> {
        let principals = principals
            .iter()
            .map(|p| p.parse::<PrincipalPattern>())
            .collect::<Result<Vec<_>>>()?;
        let actions = actions
            .iter()
            .map(|a| a.parse::<ActionPattern>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Statement::new(effect, principals, actions))
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_condition(mut self, condition: ConditionRef) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn matches_principal(&self, principal: &Principal) -> bool {
        self.principals.iter().any(|p| p.matches(principal))
    }

    pub fn matches_action(&self, action: &Action) -> bool {
        self.actions.iter().any(|a| a.matches(action))
    }

    /// Validate statement structure
    pub fn validate(&self) -> Result<()> {
        if self.principals.is_empty() {
            return Err(AccessError::malformed("statement has no principals"));
        }
        if self.actions.is_empty() {
            return Err(AccessError::malformed("statement has no actions"));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

fn one_or_many_parsed<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = AccessError>,
{
    OneOrMany::<String>::deserialize(deserializer)?
        .into_vec()
        .iter()
        .map(|raw| raw.parse().map_err(de_error))
        .collect()
}

fn parsed<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = AccessError>,
{
    String::deserialize(deserializer)?
        .parse()
        .map_err(de_error)
}

/// Carry a parse failure through serde without repeating the error prefix
pub(crate) fn de_error<E: serde::de::Error>(err: AccessError) -> E {
    match err {
        AccessError::MalformedPolicyConfig(message) => E::custom(message),
        other => E::custom(other),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCondition {
    Shorthand(String),
    Full(ConditionMap),
}

/// Full condition form; only accepts a map, never a sequence
struct ConditionMap(ConditionRef);

impl<'de> Deserialize<'de> for ConditionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> serde::de::Visitor<'de> for MapVisitor {
            type Value = ConditionMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a condition table with a `name` field")
            }

            fn visit_map<A>(self, map: A) -> std::result::Result<ConditionMap, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                ConditionRef::deserialize(serde::de::value::MapAccessDeserializer::new(map))
                    .map(ConditionMap)
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

fn conditions<'de, D>(deserializer: D) -> std::result::Result<Vec<ConditionRef>, D::Error>
where
    D: Deserializer<'de>,
{
    OneOrMany::<RawCondition>::deserialize(deserializer)?
        .into_vec()
        .into_iter()
        .map(|raw| match raw {
            RawCondition::Shorthand(s) => s.parse().map_err(de_error),
            RawCondition::Full(ConditionMap(c)) => Ok(c),
        })
        .collect()
}

fn serialize_display<S, T>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: fmt::Display,
{
    serializer.collect_str(value)
}

fn serialize_display_seq<S, T>(values: &[T], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: fmt::Display,
{
    serializer.collect_seq(values.iter().map(|v| v.to_string()))
}
