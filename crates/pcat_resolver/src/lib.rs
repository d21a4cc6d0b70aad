//! # pcat_resolver
//!
//! Turns a request for a catalog entry into a deployable plan.
//!
//! - **Resolver**: picks one version per name for the whole dependency
//!   closure, backtracking on conflicts
//! - **Planner**: orders the closure so dependencies come first and binds
//!   every parameter to an override, an upstream output or a default
//! - **CompositionService**: runs both against a consistent catalog view
//!
//! # Example
//!
//! ```rust,no_run
//! use pcat_catalog::{Catalog, ResolverSettings, VersionConstraint};
//! use pcat_resolver::{CancellationToken, CompositionService, ParameterOverrides};
//!
//! let catalog = Catalog::in_memory();
//! let service = CompositionService::new(catalog, &ResolverSettings::default());
//!
//! let plan = service
//!     .compose(
//!         "app",
//!         &VersionConstraint::any(),
//!         &ParameterOverrides::new(),
//!         &CancellationToken::new(),
//!     )
//!     .unwrap();
//! for step in &plan.steps {
//!     println!("{}@{}", step.name, step.version);
//! }
//! ```

pub mod cancel;
pub mod engine;
pub mod error;
pub mod planner;
pub mod resolver;

pub use cancel::CancellationToken;
pub use engine::CompositionService;
pub use error::{
    ComposeError, ComposeResult, PlanError, PlanResult, Requirement, ResolveError, ResolveResult,
};
pub use planner::{plan, BindingSource, CompositionPlan, ParameterOverrides, PlanRequest, PlanStep};
pub use resolver::{ResolvedClosure, Resolver};
