//! Drift reconciliation.
//!
//! Compares what a snapshot says is deployed with what a fresh plan says
//! should be deployed. The comparison is a single pass over both plans and
//! never fails because of drift; only a snapshot whose shape cannot be
//! aligned with a plan is rejected.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use pcat_catalog::ParamType;
use pcat_resolver::{BindingSource, CompositionPlan, PlanStep};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{DriftError, DriftResult};
use crate::snapshot::{DeployedStateSnapshot, ObservedStep, SNAPSHOT_FORMAT_VERSION};

/// Declared shape of an output, and whether it was seen deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputState {
    #[serde(rename = "type")]
    pub output_type: ParamType,
    pub observed: bool,
}

/// What differs for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriftKind {
    /// Planned but not deployed.
    Added,
    /// Deployed but no longer planned.
    Removed,
    ParameterChanged {
        name: String,
        old: Option<Value>,
        new: Option<Value>,
    },
    OutputChanged {
        name: String,
        old: Option<OutputState>,
        new: Option<OutputState>,
    },
    /// The step now resolves to different template content.
    VersionChanged { old: Version, new: Version },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftEntry {
    pub step: String,
    #[serde(flatten)]
    pub kind: DriftKind,
}

impl fmt::Display for DriftEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show<T: fmt::Debug>(value: &Option<T>) -> String {
            value.as_ref().map(|v| format!("{:?}", v)).unwrap_or_else(|| "-".to_string())
        }
        match &self.kind {
            DriftKind::Added => write!(f, "+ {}", self.step),
            DriftKind::Removed => write!(f, "- {}", self.step),
            DriftKind::ParameterChanged { name, old, new } => {
                let old = old.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
                let new = new.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
                write!(f, "~ {}.{}: {} -> {}", self.step, name, old, new)
            }
            DriftKind::OutputChanged { name, old, new } => {
                write!(f, "~ {} output {}: {} -> {}", self.step, name, show(old), show(new))
            }
            DriftKind::VersionChanged { old, new } => {
                write!(f, "~ {}: {} -> {}", self.step, old, new)
            }
        }
    }
}

/// Result of comparing a snapshot with a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub root: String,
    pub entries: Vec<DriftEntry>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries_for(&self, step: &str) -> Vec<&DriftEntry> {
        self.entries.iter().filter(|e| e.step == step).collect()
    }

    pub fn summary(&self) -> String {
        let added = self.count(|k| matches!(k, DriftKind::Added));
        let removed = self.count(|k| matches!(k, DriftKind::Removed));
        let changed = self.entries.len() - added - removed;
        format!("{} added, {} removed, {} changed", added, removed, changed)
    }

    fn count(&self, predicate: impl Fn(&DriftKind) -> bool) -> usize {
        self.entries.iter().filter(|e| predicate(&e.kind)).count()
    }
}

/// Compare a deployed snapshot against a plan.
///
/// Entries follow the plan's step order; removed steps come last, by name.
pub fn diff(snapshot: &DeployedStateSnapshot, plan: &CompositionPlan) -> DriftResult<DriftReport> {
    validate(snapshot)?;

    let deployed: BTreeMap<&str, &PlanStep> = snapshot
        .plan
        .steps
        .iter()
        .map(|s| (s.name.as_str(), s))
        .collect();
    let planned: HashSet<&str> = plan.steps.iter().map(|s| s.name.as_str()).collect();
    let mut entries = Vec::new();

    for step in &plan.steps {
        let Some(old) = deployed.get(step.name.as_str()) else {
            entries.push(DriftEntry {
                step: step.name.clone(),
                kind: DriftKind::Added,
            });
            continue;
        };
        if old.template_id != step.template_id {
            entries.push(DriftEntry {
                step: step.name.clone(),
                kind: DriftKind::VersionChanged {
                    old: old.version.clone(),
                    new: step.version.clone(),
                },
            });
        }
        diff_parameters(snapshot, old, step, &mut entries);
        diff_outputs(snapshot, old, step, &mut entries);
    }

    for (name, _) in deployed.iter().filter(|(name, _)| !planned.contains(*name)) {
        entries.push(DriftEntry {
            step: name.to_string(),
            kind: DriftKind::Removed,
        });
    }

    let report = DriftReport {
        root: plan.root.name.clone(),
        entries,
    };
    info!("Drift for {}: {}", report.root, report.summary());
    Ok(report)
}

fn validate(snapshot: &DeployedStateSnapshot) -> DriftResult<()> {
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(DriftError::IncompatibleSnapshot(format!(
            "unsupported format_version {} (expected {})",
            snapshot.format_version, SNAPSHOT_FORMAT_VERSION
        )));
    }
    let mut names = HashSet::new();
    for step in &snapshot.plan.steps {
        if !names.insert(step.name.as_str()) {
            return Err(DriftError::IncompatibleSnapshot(format!(
                "duplicate step '{}' in snapshot plan",
                step.name
            )));
        }
    }
    if let Some(unknown) = snapshot.observed.keys().find(|k| !names.contains(k.as_str())) {
        return Err(DriftError::IncompatibleSnapshot(format!(
            "observations for step '{}' which is not in the snapshot plan",
            unknown
        )));
    }
    Ok(())
}

/// Value a binding resolves to, given what the snapshot observed.
///
/// `None` when it depends on an upstream output that was never observed.
fn expected_value(snapshot: &DeployedStateSnapshot, source: &BindingSource) -> Option<Value> {
    match source {
        BindingSource::Override { value } | BindingSource::Default { value } => Some(value.clone()),
        BindingSource::Output { step, output } => snapshot
            .observed(step)
            .and_then(|o| o.outputs.get(output))
            .cloned(),
    }
}

fn diff_parameters(
    snapshot: &DeployedStateSnapshot,
    old: &PlanStep,
    new: &PlanStep,
    entries: &mut Vec<DriftEntry>,
) {
    // an observation without parameters falls back to what the old plan bound
    let observed = snapshot
        .observed(&old.name)
        .filter(|o| !o.parameters.is_empty());
    let names: BTreeSet<&String> = new
        .bound_inputs
        .keys()
        .chain(old.bound_inputs.keys())
        .chain(observed.map(|o| o.parameters.keys()).into_iter().flatten())
        .collect();

    for name in names {
        let expected = match new.bound_inputs.get(name) {
            Some(source) => match expected_value(snapshot, source) {
                Some(value) => Some(value),
                None => {
                    debug!("Skipping {}.{}: upstream value unknown", new.name, name);
                    continue;
                }
            },
            None => None,
        };
        let actual = match observed {
            Some(ObservedStep { parameters, .. }) => parameters.get(name).cloned(),
            None => old.bound_inputs.get(name).and_then(|s| expected_value(snapshot, s)),
        };
        if actual != expected {
            entries.push(DriftEntry {
                step: new.name.clone(),
                kind: DriftKind::ParameterChanged {
                    name: name.clone(),
                    old: actual,
                    new: expected,
                },
            });
        }
    }
}

fn diff_outputs(
    snapshot: &DeployedStateSnapshot,
    old: &PlanStep,
    new: &PlanStep,
    entries: &mut Vec<DriftEntry>,
) {
    let observed = snapshot.observed(&old.name);
    // without observed outputs for a step there is nothing to say about presence
    let seen = |name: &str| {
        observed
            .filter(|o| !o.outputs.is_empty())
            .map_or(true, |o| o.outputs.contains_key(name))
    };

    let names: BTreeSet<&str> = new
        .outputs
        .iter()
        .chain(old.outputs.iter())
        .map(|o| o.name.as_str())
        .collect();

    for name in names {
        let before = old.outputs.iter().find(|o| o.name == name).map(|o| OutputState {
            output_type: o.output_type,
            observed: seen(name),
        });
        let after = new.outputs.iter().find(|o| o.name == name).map(|o| OutputState {
            output_type: o.output_type,
            observed: true,
        });
        if before != after {
            entries.push(DriftEntry {
                step: new.name.clone(),
                kind: DriftKind::OutputChanged {
                    name: name.to_string(),
                    old: before,
                    new: after,
                },
            });
        }
    }
}
