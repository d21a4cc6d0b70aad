//! Composition service: resolve and plan against a consistent catalog view.

use pcat_catalog::{Catalog, ResolverSettings, VersionConstraint};
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::error::{ComposeResult, ResolveResult};
use crate::planner::{plan, CompositionPlan, ParameterOverrides};
use crate::resolver::{ResolvedClosure, Resolver};

/// Entry point for composing a deployable plan from a catalog.
///
/// Each attempt works on one immutable snapshot. When the catalog has
/// advanced by the time the plan is ready, the composition is repeated on
/// a fresh snapshot, up to `max_attempts` times.
#[derive(Debug, Clone)]
pub struct CompositionService {
    catalog: Catalog,
    resolver: Resolver,
    max_attempts: usize,
}

impl CompositionService {
    pub fn new(catalog: Catalog, settings: &ResolverSettings) -> Self {
        Self {
            catalog,
            resolver: Resolver::new(settings),
            max_attempts: settings.max_attempts.max(1),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Resolve against the current snapshot.
    pub fn resolve(
        &self,
        name: &str,
        constraint: &VersionConstraint,
        cancel: &CancellationToken,
    ) -> ResolveResult<ResolvedClosure> {
        self.resolver
            .resolve(&self.catalog.snapshot(), name, constraint, cancel)
    }

    /// Resolve `name` and plan the closure with `overrides`.
    ///
    /// The returned plan records the generation it was computed against.
    /// If every attempt races a registration, the last plan is returned;
    /// it is still consistent with the snapshot it names.
    pub fn compose(
        &self,
        name: &str,
        constraint: &VersionConstraint,
        overrides: &ParameterOverrides,
        cancel: &CancellationToken,
    ) -> ComposeResult<CompositionPlan> {
        let mut attempt = 1;
        loop {
            let snapshot = self.catalog.snapshot();
            let closure = self.resolver.resolve(&snapshot, name, constraint, cancel)?;
            let plan = plan(&closure, overrides)?;

            let current = self.catalog.index().generation();
            if current == snapshot.generation() {
                info!(
                    "Composed {}@{} at generation {} (attempt {})",
                    name, constraint, current, attempt
                );
                return Ok(plan);
            }
            if attempt >= self.max_attempts {
                warn!(
                    "Catalog kept changing during composition of {}; using generation {}",
                    name,
                    snapshot.generation()
                );
                return Ok(plan);
            }
            warn!(
                "Catalog advanced from generation {} to {} while composing {}, retrying ({}/{})",
                snapshot.generation(),
                current,
                name,
                attempt,
                self.max_attempts
            );
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ComposeError, ResolveError};
    use serde_json::json;

    fn service() -> CompositionService {
        let catalog = Catalog::in_memory();
        catalog
            .register(b"net", "name: network\nversion: 1.0.0\noutputs:\n  - name: vpcId\n")
            .unwrap();
        catalog
            .register(
                b"app",
                "name: app\nversion: 1.0.0\ndependencies: [network]\nparameters:\n  - name: vpcId\n    required: true\n  - name: size\n    type: integer\n",
            )
            .unwrap();
        CompositionService::new(catalog, &ResolverSettings::default())
    }

    #[test]
    fn test_compose_records_generation() {
        let service = service();
        let overrides = ParameterOverrides::new().set("size", json!(3));
        let plan = service
            .compose("app", &VersionConstraint::any(), &overrides, &CancellationToken::new())
            .unwrap();
        assert_eq!(plan.catalog_generation, service.catalog().snapshot().generation());
        assert_eq!(plan.step_names(), vec!["network", "app"]);
        assert_eq!(plan.root.name, "app");
    }

    #[test]
    fn test_compose_propagates_cancellation() {
        let service = service();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = service
            .compose("app", &VersionConstraint::any(), &ParameterOverrides::new(), &cancel)
            .unwrap_err();
        assert!(matches!(err, ComposeError::Resolve(ResolveError::Cancelled)));
    }
}
