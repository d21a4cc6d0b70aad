//! Registration and query facade over the store and the index.

use std::sync::Arc;

use tracing::info;

use crate::backend::{MemoryBackend, StorageBackend};
use crate::error::CatalogResult;
use crate::index::{CatalogIndex, CatalogSnapshot, RegistrationOutcome, SearchQuery};
use crate::interface::{parse_manifest, ParsedManifest};
use crate::store::ArtifactStore;
use crate::template::{Template, TemplateId};
use crate::version::VersionConstraint;

/// Handle to one catalog. Cheap to clone; clones share state.
#[derive(Clone, Debug)]
pub struct Catalog {
    store: Arc<ArtifactStore>,
    index: Arc<CatalogIndex>,
}

impl Catalog {
    /// Open a catalog over a backend, indexing whatever it already holds.
    pub fn open(backend: Arc<dyn StorageBackend>) -> CatalogResult<Self> {
        let store = Arc::new(ArtifactStore::new(backend));
        let index = Arc::new(CatalogIndex::rebuild(store.clone())?);
        Ok(Self { store, index })
    }

    /// Empty catalog kept in memory.
    pub fn in_memory() -> Self {
        let store = Arc::new(ArtifactStore::new(Arc::new(MemoryBackend::new())));
        let index = Arc::new(CatalogIndex::new(store.clone()));
        Self { store, index }
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<CatalogIndex> {
        &self.index
    }

    /// Register a raw body and raw interface manifest.
    ///
    /// The manifest is validated before anything is stored; a malformed
    /// manifest is rejected wholesale with every problem listed.
    pub fn register(&self, body: &[u8], raw_interface: &str) -> CatalogResult<TemplateId> {
        let manifest = parse_manifest(raw_interface)?;
        self.register_parsed(body, &manifest).map(|(id, _)| id)
    }

    /// Register an already validated manifest.
    pub fn register_parsed(
        &self,
        body: &[u8],
        manifest: &ParsedManifest,
    ) -> CatalogResult<(TemplateId, RegistrationOutcome)> {
        let id = self.store.put(body, manifest)?;
        let outcome = self.index.register(&id)?;
        if outcome == RegistrationOutcome::Registered {
            info!("Registered {} as {}", manifest.label(), id.short());
        }
        Ok((id, outcome))
    }

    pub fn get(&self, id: &TemplateId) -> CatalogResult<Template> {
        self.store.get(id)
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        self.index.snapshot()
    }

    pub fn find(&self, name: &str, constraint: &VersionConstraint) -> Vec<Arc<Template>> {
        self.index.find(name, constraint)
    }

    pub fn search(&self, query: &SearchQuery) -> Vec<TemplateId> {
        self.index.search(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;

    #[test]
    fn test_register_and_find() {
        let catalog = Catalog::in_memory();
        let id = catalog
            .register(b"vpc", "name: network\nversion: 1.0\noutputs:\n  - name: vpcId\n")
            .unwrap();
        let found = catalog.find("network", &VersionConstraint::any());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert_eq!(catalog.get(&id).unwrap().interface.outputs[0].name, "vpcId");
    }

    #[test]
    fn test_malformed_manifest_stores_nothing() {
        let catalog = Catalog::in_memory();
        let err = catalog
            .register(b"x", "name: app\nversion: 1.0.0\nparameters:\n  - name: p\n    type: nope\n")
            .unwrap_err();
        assert!(matches!(err, CatalogError::MalformedInterface { .. }));
        assert!(catalog.store().all_ids().unwrap().is_empty());
    }
}
