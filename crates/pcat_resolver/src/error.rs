//! Error types for resolution and planning.

use std::fmt;

use pcat_catalog::{CatalogError, ParamType, TemplateRef, VersionConstraint};
use semver::Version;
use thiserror::Error;

/// Result type alias for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type alias for planning.
pub type PlanResult<T> = Result<T, PlanError>;

/// Result type alias for the composition service.
pub type ComposeResult<T> = Result<T, ComposeError>;

/// One constraint placed on a name, and who placed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// `None` for the root request.
    pub required_by: Option<TemplateRef>,
    pub constraint: VersionConstraint,
}

impl Requirement {
    pub fn root(constraint: VersionConstraint) -> Self {
        Self {
            required_by: None,
            constraint,
        }
    }

    pub fn by(required_by: TemplateRef, constraint: VersionConstraint) -> Self {
        Self {
            required_by: Some(required_by),
            constraint,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.required_by {
            Some(by) => write!(f, "{}", by),
            None => f.write_str("request"),
        }
    }
}

fn chain(name: &str, requirements: &[Requirement]) -> String {
    requirements
        .iter()
        .map(|r| format!("{} -> {}@{}", r, name, r.constraint))
        .collect::<Vec<_>>()
        .join("; ")
}

fn version_set(versions: &[Version]) -> String {
    let items: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
    format!("{{{}}}", items.join(", "))
}

/// Errors that can occur while resolving a dependency closure.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(
        "Unsatisfiable: {} against available {}",
        chain(.name, .requirements),
        version_set(.available)
    )]
    Unsatisfiable {
        name: String,
        requirements: Vec<Requirement>,
        available: Vec<Version>,
    },

    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Resolution gave up after {steps} candidate attempts")]
    ResolutionTimeout { steps: usize },

    #[error("Resolution cancelled")]
    Cancelled,

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Errors that can occur while turning a closure into a plan.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Required parameter '{parameter}' of {template} has no override, upstream output or default")]
    UnboundParameter { template: String, parameter: String },

    #[error("Type mismatch binding {template}.{parameter}: expected {expected}, {found}")]
    TypeMismatch {
        template: String,
        parameter: String,
        expected: ParamType,
        found: String,
    },

    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Invalid override '{0}': expected key=value")]
    InvalidOverride(String),
}

/// Errors from a full resolve-and-plan composition.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcat_catalog::parse_version;

    #[test]
    fn test_unsatisfiable_display_shows_chain() {
        let error = ResolveError::Unsatisfiable {
            name: "lib".to_string(),
            requirements: vec![Requirement::by(
                TemplateRef::new("app", parse_version("1.0").unwrap()),
                "^1.0".parse().unwrap(),
            )],
            available: vec![parse_version("2.0.0").unwrap()],
        };
        assert_eq!(
            error.to_string(),
            "Unsatisfiable: app@1.0.0 -> lib@^1.0 against available {2.0.0}"
        );
    }

    #[test]
    fn test_root_requirement_display() {
        let error = ResolveError::Unsatisfiable {
            name: "ghost".to_string(),
            requirements: vec![Requirement::root(VersionConstraint::any())],
            available: vec![],
        };
        assert_eq!(error.to_string(), "Unsatisfiable: request -> ghost@* against available {}");
    }

    #[test]
    fn test_cycle_display() {
        let error = ResolveError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(error.to_string(), "Cyclic dependency: a -> b -> a");
    }
}
