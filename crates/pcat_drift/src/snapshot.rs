//! Deployed state snapshots.
//!
//! A snapshot is what a deployment executor reports back: the plan it
//! applied plus the parameter and output values it observed per step.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use pcat_resolver::CompositionPlan;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::DriftResult;

/// Snapshot format understood by this version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    SNAPSHOT_FORMAT_VERSION
}

/// Values observed for one deployed step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedStep {
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl ObservedStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, value: Value) -> Self {
        self.outputs.insert(name.into(), value);
        self
    }
}

/// State of a deployment as reported by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedStateSnapshot {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub plan: CompositionPlan,
    /// Keyed by step name.
    #[serde(default)]
    pub observed: BTreeMap<String, ObservedStep>,
    pub recorded_at: DateTime<Utc>,
}

impl DeployedStateSnapshot {
    /// Snapshot of a plan deployed exactly as planned.
    ///
    /// Parameters with a value known at planning time are recorded as
    /// observed; outputs are left for the executor to fill in.
    pub fn from_plan(plan: &CompositionPlan) -> Self {
        let observed = plan
            .steps
            .iter()
            .map(|step| {
                let parameters = step
                    .bound_inputs
                    .iter()
                    .filter_map(|(name, source)| source.literal().map(|v| (name.clone(), v.clone())))
                    .collect();
                (
                    step.name.clone(),
                    ObservedStep {
                        parameters,
                        outputs: BTreeMap::new(),
                    },
                )
            })
            .collect();
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            plan: plan.clone(),
            observed,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_observation(mut self, step: impl Into<String>, observed: ObservedStep) -> Self {
        self.observed.insert(step.into(), observed);
        self
    }

    pub fn observed(&self, step: &str) -> Option<&ObservedStep> {
        self.observed.get(step)
    }

    /// Load a snapshot from JSON, or YAML for `.yaml`/`.yml` files.
    pub fn load(path: &Path) -> DriftResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot = if is_yaml(path) {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        debug!("Loaded snapshot from {:?}", path);
        Ok(snapshot)
    }

    /// Save a snapshot, choosing the format like [`DeployedStateSnapshot::load`].
    pub fn save(&self, path: &Path) -> DriftResult<()> {
        let content = if is_yaml(path) {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)?;
        debug!("Saved snapshot to {:?}", path);
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}
