//! Error types for the catalog.

use std::fmt;

use thiserror::Error;

use crate::backend::BackendError;
use crate::template::TemplateId;

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// A single problem found while validating an interface descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceProblem {
    /// Path of the offending field, e.g. `parameters[2].default`.
    pub field: String,
    pub message: String,
}

impl InterfaceProblem {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for InterfaceProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_problems(problems: &[InterfaceProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur during catalog operations.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Malformed interface for {template}: {}", join_problems(.problems))]
    MalformedInterface {
        template: String,
        problems: Vec<InterfaceProblem>,
    },

    #[error("Conflict: {name}@{version} is already registered as {existing}, refusing {attempted}")]
    Conflict {
        name: String,
        version: String,
        existing: TemplateId,
        attempted: TemplateId,
    },

    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Invalid version '{input}': {message}")]
    InvalidVersion { input: String, message: String },

    #[error("Invalid version constraint '{input}': {message}")]
    InvalidConstraint { input: String, message: String },

    #[error("Storage backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CatalogError {
    /// Whether retrying the same call may succeed.
    ///
    /// Only backend unavailability qualifies; every semantic error is a
    /// deterministic function of its input.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Backend(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Problems attached to a `MalformedInterface` error.
    pub fn problems(&self) -> &[InterfaceProblem] {
        match self {
            CatalogError::MalformedInterface { problems, .. } => problems,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_interface_lists_every_problem() {
        let error = CatalogError::MalformedInterface {
            template: "app".to_string(),
            problems: vec![
                InterfaceProblem::new("parameters[0].type", "unknown type 'strng'"),
                InterfaceProblem::new("outputs[1].name", "duplicate output 'vpcId'"),
            ],
        };
        let display = error.to_string();
        assert!(display.contains("Malformed interface for app"));
        assert!(display.contains("parameters[0].type: unknown type 'strng'"));
        assert!(display.contains("outputs[1].name: duplicate output 'vpcId'"));
        assert_eq!(error.problems().len(), 2);
    }

    #[test]
    fn test_only_backend_unavailability_is_transient() {
        let transient = CatalogError::Backend(BackendError::Unavailable("down".into()));
        assert!(transient.is_transient());
        assert!(!CatalogError::NotFound("x".into()).is_transient());
    }
}
