//! Composition planning.
//!
//! Turns a resolved closure into an ordered list of deployment steps and
//! binds every template parameter to a concrete source.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use pcat_catalog::{OutputRef, OutputSpec, ParameterSpec, Template, TemplateId, VersionConstraint};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PlanError, PlanResult};
use crate::resolver::ResolvedClosure;

/// User-supplied parameter values.
///
/// Keys are `template.param`, or a bare `param` addressing the root template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterOverrides {
    values: BTreeMap<String, Value>,
}

impl ParameterOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Parse `key=value` assignments. Values are read as JSON when they
    /// parse as JSON, and as plain strings otherwise.
    pub fn parse_assignments<S: AsRef<str>>(assignments: &[S]) -> PlanResult<Self> {
        let mut overrides = Self::new();
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let (key, raw) = assignment
                .split_once('=')
                .ok_or_else(|| PlanError::InvalidOverride(assignment.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(PlanError::InvalidOverride(assignment.to_string()));
            }
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            overrides.insert(key, value);
        }
        Ok(overrides)
    }

    fn get(&self, template: &str, parameter: &str, is_root: bool) -> Option<&Value> {
        self.values
            .get(&format!("{}.{}", template, parameter))
            .or_else(|| is_root.then(|| self.values.get(parameter)).flatten())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// Where a bound parameter value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindingSource {
    Override { value: Value },
    /// Output of an earlier step, known only after that step is deployed.
    Output { step: String, output: String },
    Default { value: Value },
}

impl BindingSource {
    /// Value known at planning time, if any.
    pub fn literal(&self) -> Option<&Value> {
        match self {
            BindingSource::Override { value } | BindingSource::Default { value } => Some(value),
            BindingSource::Output { .. } => None,
        }
    }
}

/// One deployment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub name: String,
    pub version: Version,
    pub template_id: TemplateId,
    /// Steps that must be deployed first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub bound_inputs: BTreeMap<String, BindingSource>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
}

/// The request a plan answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub name: String,
    pub constraint: VersionConstraint,
}

/// Ordered, fully bound deployment plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionPlan {
    pub id: Uuid,
    pub root: PlanRequest,
    pub steps: Vec<PlanStep>,
    /// Catalog generation the plan was computed against.
    pub catalog_generation: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl CompositionPlan {
    pub fn step(&self, name: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Whether every step comes after the steps it depends on.
    pub fn is_topologically_ordered(&self) -> bool {
        self.steps.iter().enumerate().all(|(i, step)| {
            step.depends_on
                .iter()
                .all(|dep| self.position(dep).is_some_and(|p| p < i))
        })
    }
}

/// Order the closure and bind every parameter.
pub fn plan(closure: &ResolvedClosure, overrides: &ParameterOverrides) -> PlanResult<CompositionPlan> {
    let order = topological_order(closure)?;
    let mut warnings = unknown_overrides(closure, overrides);
    let mut steps = Vec::with_capacity(order.len());

    for name in &order {
        let Some(template) = closure.get(name) else {
            continue;
        };
        let is_root = name == closure.root();
        let mut bound_inputs = BTreeMap::new();

        for param in &template.interface.parameters {
            match bind(closure, template, param, overrides, is_root, &mut warnings)? {
                Some(source) => {
                    debug!("Bound {}.{} to {:?}", name, param.name, source);
                    bound_inputs.insert(param.name.clone(), source);
                }
                None if param.required => {
                    return Err(PlanError::UnboundParameter {
                        template: template.reference().to_string(),
                        parameter: param.name.clone(),
                    });
                }
                None => {}
            }
        }

        steps.push(PlanStep {
            name: name.clone(),
            version: template.version.clone(),
            template_id: template.id.clone(),
            depends_on: closure
                .dependencies_of(name)
                .into_iter()
                .map(String::from)
                .collect(),
            bound_inputs,
            outputs: template.interface.outputs.clone(),
        });
    }

    for warning in &warnings {
        warn!("{}", warning);
    }

    let plan = CompositionPlan {
        id: Uuid::new_v4(),
        root: PlanRequest {
            name: closure.root().to_string(),
            constraint: closure.constraint().clone(),
        },
        steps,
        catalog_generation: closure.generation(),
        created_at: Utc::now(),
        warnings,
    };
    info!(
        "Planned {} in {} steps ({} warnings)",
        closure.root(),
        plan.steps.len(),
        plan.warnings.len()
    );
    Ok(plan)
}

/// Bind one parameter: override, then upstream output, then default.
fn bind(
    closure: &ResolvedClosure,
    template: &Template,
    param: &ParameterSpec,
    overrides: &ParameterOverrides,
    is_root: bool,
    warnings: &mut Vec<String>,
) -> PlanResult<Option<BindingSource>> {
    if let Some(value) = overrides.get(&template.name, &param.name, is_root) {
        param.check_value(value).map_err(|found| PlanError::TypeMismatch {
            template: template.reference().to_string(),
            parameter: param.name.clone(),
            expected: param.param_type,
            found,
        })?;
        return Ok(Some(BindingSource::Override {
            value: value.clone(),
        }));
    }

    if let Some(source) = &param.source {
        if let Some(binding) = bind_output(closure, template, param, source)? {
            return Ok(Some(binding));
        }
        warnings.push(format!(
            "{}.{}: source {} is not exposed by the resolved dependency",
            template.name, param.name, source
        ));
    } else {
        for dep in &template.interface.dependencies {
            let Some(upstream) = closure.get(&dep.name) else {
                continue;
            };
            match upstream.interface.output(&param.name) {
                Some(output) if output.output_type.can_feed(param.param_type) => {
                    return Ok(Some(BindingSource::Output {
                        step: dep.name.clone(),
                        output: output.name.clone(),
                    }));
                }
                Some(output) => debug!(
                    "Skipping {}.{} for {}.{}: {} cannot feed {}",
                    dep.name, output.name, template.name, param.name, output.output_type, param.param_type
                ),
                None => {}
            }
        }
    }

    Ok(param.default.clone().map(|value| BindingSource::Default { value }))
}

fn bind_output(
    closure: &ResolvedClosure,
    template: &Template,
    param: &ParameterSpec,
    source: &OutputRef,
) -> PlanResult<Option<BindingSource>> {
    let Some(output) = closure
        .get(&source.template)
        .and_then(|upstream| upstream.interface.output(&source.output))
    else {
        return Ok(None);
    };
    if !output.output_type.can_feed(param.param_type) {
        return Err(PlanError::TypeMismatch {
            template: template.reference().to_string(),
            parameter: param.name.clone(),
            expected: param.param_type,
            found: format!("output {} is {}", source, output.output_type),
        });
    }
    Ok(Some(BindingSource::Output {
        step: source.template.clone(),
        output: source.output.clone(),
    }))
}

fn unknown_overrides(closure: &ResolvedClosure, overrides: &ParameterOverrides) -> Vec<String> {
    let root = closure.root_template();
    overrides
        .iter()
        .filter(|(key, _)| {
            let known = match key.rsplit_once('.') {
                Some((template, param)) => closure
                    .get(template)
                    .is_some_and(|t| t.interface.parameter(param).is_some()),
                None => root.is_some_and(|t| t.interface.parameter(key).is_some()),
            };
            !known
        })
        .map(|(key, _)| format!("override '{}' matches no parameter in the plan", key))
        .collect()
}

/// Kahn's algorithm; ties are broken by name for a stable order.
fn topological_order(closure: &ResolvedClosure) -> PlanResult<Vec<String>> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (name, _) in closure.iter() {
        let deps: Vec<&str> = closure
            .dependencies_of(name)
            .into_iter()
            .filter(|d| closure.contains(d))
            .collect();
        in_degree.insert(name.as_str(), deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(name.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(in_degree.len());

    while let Some(name) = ready.pop_first() {
        order.push(name.to_string());
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() < in_degree.len() {
        let remaining: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree > 0)
            .map(|(name, _)| *name)
            .collect();
        return Err(PlanError::CyclicDependency {
            cycle: find_cycle(closure, &remaining),
        });
    }
    Ok(order)
}

/// Walk dependencies among the unplaced names until one repeats.
fn find_cycle(closure: &ResolvedClosure, remaining: &BTreeSet<&str>) -> Vec<String> {
    let Some(&start) = remaining.iter().next() else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(next) = closure
            .dependencies_of(current)
            .into_iter()
            .find(|d| remaining.contains(d))
        else {
            return path.iter().map(|s| s.to_string()).collect();
        };
        if let Some(pos) = path.iter().position(|n| *n == next) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(next.to_string());
            return cycle;
        }
        path.push(next);
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::resolver::Resolver;
    use pcat_catalog::Catalog;
    use serde_json::json;

    fn closure(manifests: &[&str], root: &str) -> ResolvedClosure {
        let catalog = Catalog::in_memory();
        for manifest in manifests {
            catalog.register(manifest.as_bytes(), manifest).unwrap();
        }
        Resolver::default()
            .resolve(
                &catalog.snapshot(),
                root,
                &VersionConstraint::any(),
                &CancellationToken::new(),
            )
            .unwrap()
    }

    const WEB: &str = r#"
name: web
version: 1.0.0
parameters:
  - name: replicas
    type: integer
    default: 2
  - name: image
    type: string
    required: true
  - name: label
    type: string
"#;

    #[test]
    fn test_parse_assignments() {
        let overrides =
            ParameterOverrides::parse_assignments(&["replicas=3", "web.image=nginx:1.25", "flag=true"]).unwrap();
        assert_eq!(overrides.get("web", "replicas", true), Some(&json!(3)));
        assert_eq!(overrides.get("web", "image", false), Some(&json!("nginx:1.25")));
        assert_eq!(overrides.get("web", "flag", false), None);
        assert!(ParameterOverrides::parse_assignments(&["novalue"]).is_err());
    }

    #[test]
    fn test_binding_priority_and_omission() {
        let closure = closure(&[WEB], "web");
        let overrides = ParameterOverrides::new().set("image", json!("nginx"));
        let plan = plan(&closure, &overrides).unwrap();
        let step = plan.step("web").unwrap();

        assert_eq!(step.bound_inputs["image"], BindingSource::Override { value: json!("nginx") });
        assert_eq!(step.bound_inputs["replicas"], BindingSource::Default { value: json!(2) });
        assert!(!step.bound_inputs.contains_key("label"));
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_required_parameter_unbound() {
        let closure = closure(&[WEB], "web");
        match plan(&closure, &ParameterOverrides::new()).unwrap_err() {
            PlanError::UnboundParameter { template, parameter } => {
                assert_eq!(template, "web@1.0.0");
                assert_eq!(parameter, "image");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_override_type_checked() {
        let closure = closure(&[WEB], "web");
        let overrides = ParameterOverrides::new()
            .set("image", json!("nginx"))
            .set("web.replicas", json!("many"));
        assert!(matches!(
            plan(&closure, &overrides).unwrap_err(),
            PlanError::TypeMismatch { expected: pcat_catalog::ParamType::Integer, .. }
        ));
    }

    #[test]
    fn test_unknown_override_is_warning() {
        let closure = closure(&[WEB], "web");
        let overrides = ParameterOverrides::new()
            .set("image", json!("nginx"))
            .set("db.password", json!("x"));
        let plan = plan(&closure, &overrides).unwrap();
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("db.password"));
    }

    #[test]
    fn test_explicit_source_type_mismatch() {
        let closure = closure(
            &[
                "name: net\nversion: 1.0.0\noutputs:\n  - name: subnets\n    type: list\n",
                "name: app\nversion: 1.0.0\ndependencies: [net]\nparameters:\n  - name: subnet\n    type: string\n    source: net.subnets\n",
            ],
            "app",
        );
        assert!(matches!(
            plan(&closure, &ParameterOverrides::new()).unwrap_err(),
            PlanError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_ready_set_is_name_ordered() {
        let closure = closure(
            &[
                "name: root\nversion: 1.0.0\ndependencies: [zeta, alpha, mid]\n",
                "name: zeta\nversion: 1.0.0\n",
                "name: alpha\nversion: 1.0.0\n",
                "name: mid\nversion: 1.0.0\n",
            ],
            "root",
        );
        let plan = plan(&closure, &ParameterOverrides::new()).unwrap();
        assert_eq!(plan.step_names(), vec!["alpha", "mid", "zeta", "root"]);
        assert!(plan.is_topologically_ordered());
    }
}
