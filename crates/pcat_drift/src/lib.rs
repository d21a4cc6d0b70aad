//! # pcat_drift
//!
//! Feedback side of the pattern catalog: compares what a deployment
//! executor reports as deployed with what a plan says should be deployed.
//!
//! - `DeployedStateSnapshot`: the executor's report, persisted as JSON or YAML
//! - `diff`: a pure, single-pass comparison producing a `DriftReport`

pub mod error;
pub mod reconciler;
pub mod snapshot;

pub use error::{DriftError, DriftResult};
pub use reconciler::{diff, DriftEntry, DriftKind, DriftReport, OutputState};
pub use snapshot::{DeployedStateSnapshot, ObservedStep, SNAPSHOT_FORMAT_VERSION};
