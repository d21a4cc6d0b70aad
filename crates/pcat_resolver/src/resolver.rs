//! Dependency resolution.
//!
//! Resolution is a depth-first search with chronological backtracking.
//! The search state (assignment, accumulated requirements, agenda) is a
//! plain value; every choice point keeps its own copy, so backtracking is
//! just resuming from an older value. Each pending requirement carries the
//! path of names that led to it, which is how cycles are detected.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use pcat_catalog::{CatalogSnapshot, ResolverSettings, Template, VersionConstraint};
use semver::Version;
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::error::{Requirement, ResolveError, ResolveResult};

/// The chosen template for every name in a root's transitive closure.
#[derive(Debug, Clone)]
pub struct ResolvedClosure {
    root: String,
    constraint: VersionConstraint,
    templates: BTreeMap<String, Arc<Template>>,
    generation: u64,
}

impl ResolvedClosure {
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Constraint the root was requested with.
    pub fn constraint(&self) -> &VersionConstraint {
        &self.constraint
    }

    pub fn root_template(&self) -> Option<&Arc<Template>> {
        self.templates.get(&self.root)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Template>> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Templates in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<Template>)> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Catalog generation of the snapshot this closure was resolved against.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Declared dependency names of a member, in name order.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.templates
            .get(name)
            .map(|t| {
                t.interface
                    .dependencies
                    .iter()
                    .map(|d| d.name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A requirement waiting to be satisfied.
#[derive(Debug, Clone)]
struct Pending {
    name: String,
    requirement: Requirement,
    /// Names from the root down to the template that placed this requirement.
    path: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct SearchState {
    assignment: BTreeMap<String, Arc<Template>>,
    requirements: BTreeMap<String, Vec<Requirement>>,
    agenda: Vec<Pending>,
}

impl SearchState {
    fn combined(&self, name: &str) -> VersionConstraint {
        self.requirements
            .get(name)
            .map(|reqs| {
                reqs.iter()
                    .fold(VersionConstraint::any(), |acc, r| acc.intersect(&r.constraint))
            })
            .unwrap_or_default()
    }

    /// A new state with `candidate` chosen for `pending`.
    fn assign(&self, pending: &Pending, candidate: Arc<Template>) -> SearchState {
        let mut next = self.clone();
        let mut path = pending.path.clone();
        path.push(pending.name.clone());

        // reversed so the agenda pops dependencies in name order
        for dep in candidate.interface.dependencies.iter().rev() {
            next.agenda.push(Pending {
                name: dep.name.clone(),
                requirement: Requirement::by(candidate.reference(), dep.constraint.clone()),
                path: path.clone(),
            });
        }
        next.assignment.insert(pending.name.clone(), candidate);
        next
    }
}

enum Advance {
    Done(SearchState),
    Choose {
        state: SearchState,
        pending: Pending,
        candidates: Vec<Arc<Template>>,
    },
    Conflict(ResolveError),
}

struct ChoicePoint {
    state: SearchState,
    pending: Pending,
    candidates: Vec<Arc<Template>>,
    next: usize,
}

/// Backtracking dependency resolver.
#[derive(Debug, Clone)]
pub struct Resolver {
    step_budget: usize,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(&ResolverSettings::default())
    }
}

impl Resolver {
    pub fn new(settings: &ResolverSettings) -> Self {
        Self {
            step_budget: settings.step_budget,
        }
    }

    pub fn with_step_budget(step_budget: usize) -> Self {
        Self { step_budget }
    }

    pub fn step_budget(&self) -> usize {
        self.step_budget
    }

    /// Resolve `name` under `constraint` to a closure of concrete templates.
    ///
    /// Candidates are tried most preferred first (highest version, then
    /// classification). On a conflict the search resumes at the most recent
    /// choice point with untried candidates; when none remain, the most
    /// recent conflict is reported.
    pub fn resolve(
        &self,
        snapshot: &CatalogSnapshot,
        name: &str,
        constraint: &VersionConstraint,
        cancel: &CancellationToken,
    ) -> ResolveResult<ResolvedClosure> {
        debug!("Resolving {}@{} at generation {}", name, constraint, snapshot.generation());

        let mut state = SearchState::default();
        state.agenda.push(Pending {
            name: name.to_string(),
            requirement: Requirement::root(constraint.clone()),
            path: Vec::new(),
        });

        let mut choices: Vec<ChoicePoint> = Vec::new();
        let mut last_conflict: Option<ResolveError> = None;
        let mut steps = 0usize;

        loop {
            match Self::advance(snapshot, state)? {
                Advance::Done(done) => {
                    let closure = ResolvedClosure {
                        root: name.to_string(),
                        constraint: constraint.clone(),
                        templates: done.assignment,
                        generation: snapshot.generation(),
                    };
                    check_acyclic(&closure)?;
                    info!(
                        "Resolved {}@{} to {} templates in {} steps",
                        name,
                        constraint,
                        closure.len(),
                        steps
                    );
                    return Ok(closure);
                }
                Advance::Choose {
                    state,
                    pending,
                    candidates,
                } => choices.push(ChoicePoint {
                    state,
                    pending,
                    candidates,
                    next: 0,
                }),
                Advance::Conflict(conflict) => {
                    debug!("Conflict: {}", conflict);
                    last_conflict = Some(conflict);
                }
            }

            // backtrack boundary: take the next untried candidate
            state = loop {
                if cancel.is_cancelled() {
                    return Err(ResolveError::Cancelled);
                }
                let Some(point) = choices.last_mut() else {
                    return Err(last_conflict.unwrap_or(ResolveError::Unsatisfiable {
                        name: name.to_string(),
                        requirements: vec![Requirement::root(constraint.clone())],
                        available: Vec::new(),
                    }));
                };
                if point.next >= point.candidates.len() {
                    choices.pop();
                    continue;
                }
                if steps >= self.step_budget {
                    return Err(ResolveError::ResolutionTimeout { steps });
                }
                steps += 1;

                let candidate = point.candidates[point.next].clone();
                point.next += 1;
                debug!(
                    "Trying {} for {} ({} of {})",
                    candidate.reference(),
                    point.pending.name,
                    point.next,
                    point.candidates.len()
                );
                break point.state.assign(&point.pending, candidate);
            };
        }
    }

    /// Work through the agenda until a choice is needed.
    fn advance(snapshot: &CatalogSnapshot, mut state: SearchState) -> ResolveResult<Advance> {
        while let Some(pending) = state.agenda.pop() {
            if let Some(start) = pending.path.iter().position(|n| *n == pending.name) {
                let mut cycle = pending.path[start..].to_vec();
                cycle.push(pending.name.clone());
                return Err(ResolveError::CyclicDependency { cycle });
            }

            state
                .requirements
                .entry(pending.name.clone())
                .or_default()
                .push(pending.requirement.clone());
            let combined = state.combined(&pending.name);

            if let Some(chosen) = state.assignment.get(&pending.name) {
                if combined.matches(&chosen.version) {
                    continue;
                }
                return Ok(Advance::Conflict(unsatisfiable(snapshot, &state, &pending.name)));
            }

            let candidates = snapshot.find(&pending.name, &combined);
            if candidates.is_empty() {
                return Ok(Advance::Conflict(unsatisfiable(snapshot, &state, &pending.name)));
            }
            return Ok(Advance::Choose {
                state,
                pending,
                candidates,
            });
        }
        Ok(Advance::Done(state))
    }
}

fn unsatisfiable(snapshot: &CatalogSnapshot, state: &SearchState, name: &str) -> ResolveError {
    let mut available: Vec<Version> = snapshot
        .versions(name)
        .iter()
        .map(|t| t.version.clone())
        .collect();
    available.sort();
    available.dedup();
    ResolveError::Unsatisfiable {
        name: name.to_string(),
        requirements: state.requirements.get(name).cloned().unwrap_or_default(),
        available,
    }
}

/// Iterative depth-first check that the chosen closure has no cycle.
fn check_acyclic(closure: &ResolvedClosure) -> ResolveResult<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Active,
        Done,
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    for (start, _) in closure.iter() {
        if marks.contains_key(start.as_str()) {
            continue;
        }
        // (node, index of the next dependency to visit)
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
        marks.insert(start.as_str(), Mark::Active);

        while let Some((node, next)) = stack.pop() {
            let deps = closure.dependencies_of(node);
            if next >= deps.len() {
                marks.insert(node, Mark::Done);
                continue;
            }
            stack.push((node, next + 1));
            let dep = deps[next];
            if !closure.contains(dep) {
                continue;
            }
            match marks.get(dep) {
                Some(Mark::Done) => {}
                Some(Mark::Active) => {
                    let from = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[from..].iter().map(|(n, _)| n.to_string()).collect();
                    cycle.push(dep.to_string());
                    return Err(ResolveError::CyclicDependency { cycle });
                }
                None => {
                    marks.insert(dep, Mark::Active);
                    stack.push((dep, 0));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcat_catalog::Catalog;

    fn catalog(manifests: &[&str]) -> Catalog {
        let catalog = Catalog::in_memory();
        for manifest in manifests {
            catalog.register(manifest.as_bytes(), manifest).unwrap();
        }
        catalog
    }

    fn resolve(catalog: &Catalog, name: &str) -> ResolveResult<ResolvedClosure> {
        Resolver::default().resolve(
            &catalog.snapshot(),
            name,
            &VersionConstraint::any(),
            &CancellationToken::new(),
        )
    }

    #[test]
    fn test_single_template() {
        let catalog = catalog(&["name: solo\nversion: 1.0.0\n"]);
        let closure = resolve(&catalog, "solo").unwrap();
        assert_eq!(closure.len(), 1);
        assert_eq!(closure.root_template().unwrap().name, "solo");
        assert_eq!(closure.generation(), catalog.snapshot().generation());
    }

    #[test]
    fn test_missing_root() {
        let catalog = catalog(&[]);
        match resolve(&catalog, "ghost").unwrap_err() {
            ResolveError::Unsatisfiable {
                name,
                requirements,
                available,
            } => {
                assert_eq!(name, "ghost");
                assert_eq!(requirements, vec![Requirement::root(VersionConstraint::any())]);
                assert!(available.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_backtracks_to_older_dependency() {
        let catalog = catalog(&[
            "name: app\nversion: 1.0.0\ndependencies: [db, lib@^1.0]\n",
            "name: db\nversion: 2.0.0\ndependencies: [lib>=2]\n",
            "name: db\nversion: 1.0.0\ndependencies: [lib@^1.0]\n",
            "name: lib\nversion: 1.0.0\n",
            "name: lib\nversion: 2.0.0\n",
        ]);
        let closure = resolve(&catalog, "app").unwrap();
        assert_eq!(closure.get("db").unwrap().version.to_string(), "1.0.0");
        assert_eq!(closure.get("lib").unwrap().version.to_string(), "1.0.0");
    }

    #[test]
    fn test_shared_dependency_resolved_once() {
        let catalog = catalog(&[
            "name: app\nversion: 1.0.0\ndependencies: [db, network]\n",
            "name: db\nversion: 1.0.0\ndependencies: [network@^1.0]\n",
            "name: network\nversion: 1.0.0\n",
            "name: network\nversion: 1.4.0\n",
        ]);
        let closure = resolve(&catalog, "app").unwrap();
        assert_eq!(closure.len(), 3);
        assert_eq!(closure.get("network").unwrap().version.to_string(), "1.4.0");
        assert_eq!(closure.dependencies_of("app"), vec!["db", "network"]);
    }

    #[test]
    fn test_three_node_cycle() {
        let catalog = catalog(&[
            "name: a\nversion: 1.0.0\ndependencies: [b]\n",
            "name: b\nversion: 1.0.0\ndependencies: [c]\n",
            "name: c\nversion: 1.0.0\ndependencies: [b]\n",
        ]);
        match resolve(&catalog, "a").unwrap_err() {
            ResolveError::CyclicDependency { cycle } => assert_eq!(cycle, vec!["b", "c", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }
}
