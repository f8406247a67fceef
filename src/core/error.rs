use thiserror::Error;

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Unknown resource kind: {0}")]
    UnknownResource(String),

    #[error("Unknown condition: {0}")]
    UnknownCondition(String),

    #[error("Unknown scoping function: {0}")]
    UnknownScopingFunction(String),

    #[error("Condition `{condition}` could not be evaluated: {reason}")]
    ConditionIndeterminate { condition: String, reason: String },

    #[error("Malformed policy configuration: {0}")]
    MalformedPolicyConfig(String),

    #[error("Unsupported policy document version: {0} (expected 1.x)")]
    UnsupportedVersion(semver::Version),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AccessError {
    /// Shorthand for building a `MalformedPolicyConfig` error.
    pub fn malformed(message: impl Into<String>) -> Self {
        AccessError::MalformedPolicyConfig(message.into())
    }
}

pub type Result<T> = std::result::Result<T, AccessError>;
