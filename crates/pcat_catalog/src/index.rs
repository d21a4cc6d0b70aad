//! Catalog index.
//!
//! The index maps names, versions, tags and classifications to stored
//! templates. Its state is an immutable value behind an `Arc`: writers
//! copy-on-write under a lock, readers take a [`CatalogSnapshot`] that
//! never changes underneath them. Each accepted registration bumps the
//! generation, which serves as the snapshot's consistency token.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::store::ArtifactStore;
use crate::template::{Classification, Template, TemplateId};
use crate::version::VersionConstraint;

/// What a `register` call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// A new `(name, version)` entry
    Registered,
    /// Same content, metadata refreshed
    MetadataUpdated,
    /// Same content and metadata, nothing to do
    Unchanged,
}

/// Search criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    /// Exact tag, case-insensitive
    Tag(String),
    /// Substring over name, description and tags; globs match names
    Text(String),
}

/// A search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: SearchTerm,
    pub classification: Option<Classification>,
}

impl SearchQuery {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            term: SearchTerm::Tag(tag.into()),
            classification: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            term: SearchTerm::Text(text.into()),
            classification: None,
        }
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    fn matches(&self, template: &Template) -> bool {
        if let Some(classification) = self.classification {
            if template.classification() != classification {
                return false;
            }
        }
        match &self.term {
            SearchTerm::Tag(tag) => template.has_tag(tag),
            SearchTerm::Text(text) if text.contains(['*', '?', '[']) => {
                glob::Pattern::new(&text.to_lowercase())
                    .map(|p| p.matches(&template.name.to_lowercase()))
                    .unwrap_or(false)
            }
            SearchTerm::Text(text) => template.matches_text(text),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct IndexState {
    /// Per name, sorted by resolver preference.
    by_name: BTreeMap<String, Vec<Arc<Template>>>,
    by_id: HashMap<TemplateId, Arc<Template>>,
    by_tag: BTreeMap<String, BTreeSet<TemplateId>>,
    generation: u64,
}

impl IndexState {
    fn insert(&mut self, template: Arc<Template>) {
        for tag in &template.metadata.tags {
            self.by_tag
                .entry(tag.to_lowercase())
                .or_default()
                .insert(template.id.clone());
        }
        self.by_id.insert(template.id.clone(), template.clone());
        let entries = self.by_name.entry(template.name.clone()).or_default();
        entries.retain(|t| t.id != template.id);
        entries.push(template);
        entries.sort_by(|a, b| a.preference(b));
    }

    fn remove_tags(&mut self, template: &Template) {
        for tag in &template.metadata.tags {
            let key = tag.to_lowercase();
            if let Some(ids) = self.by_tag.get_mut(&key) {
                ids.remove(&template.id);
                if ids.is_empty() {
                    self.by_tag.remove(&key);
                }
            }
        }
    }
}

/// Immutable, generation-stamped view of the catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    state: Arc<IndexState>,
}

impl CatalogSnapshot {
    /// Consistency token: changes whenever the catalog changes.
    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    pub fn get(&self, id: &TemplateId) -> Option<Arc<Template>> {
        self.state.by_id.get(id).cloned()
    }

    /// All entries of `name` matching `constraint`, most preferred first.
    pub fn find(&self, name: &str, constraint: &VersionConstraint) -> Vec<Arc<Template>> {
        self.state
            .by_name
            .get(name)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|t| constraint.matches(&t.version))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every registered entry of `name`, most preferred first.
    pub fn versions(&self, name: &str) -> Vec<Arc<Template>> {
        self.find(name, &VersionConstraint::any())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.state.by_name.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.state.by_name.keys().map(|s| s.as_str()).collect()
    }

    /// Matching ids ordered by name, then preference.
    pub fn search(&self, query: &SearchQuery) -> Vec<TemplateId> {
        if let SearchTerm::Tag(tag) = &query.term {
            let Some(ids) = self.state.by_tag.get(&tag.to_lowercase()) else {
                return Vec::new();
            };
            let mut hits: Vec<&Arc<Template>> = ids
                .iter()
                .filter_map(|id| self.state.by_id.get(id))
                .filter(|t| query.matches(t))
                .collect();
            hits.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.preference(b)));
            return hits.into_iter().map(|t| t.id.clone()).collect();
        }

        self.state
            .by_name
            .values()
            .flatten()
            .filter(|t| query.matches(t))
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.by_id.is_empty()
    }
}

/// Queryable registry over an artifact store.
pub struct CatalogIndex {
    store: Arc<ArtifactStore>,
    state: RwLock<Arc<IndexState>>,
}

impl CatalogIndex {
    /// Create an empty index over a store.
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self {
            store,
            state: RwLock::new(Arc::new(IndexState::default())),
        }
    }

    /// Build an index containing everything already in the store.
    ///
    /// Only content owning a version claim is indexed, so after a restart
    /// every `(name, version)` resolves to the write that was committed
    /// first.
    pub fn rebuild(store: Arc<ArtifactStore>) -> CatalogResult<Self> {
        let index = Self::new(store.clone());
        {
            let mut guard = index.state.write();
            for id in store.committed_ids()? {
                match store.get(&id) {
                    Ok(template) => {
                        Self::apply(&mut guard, template)?;
                    }
                    Err(CatalogError::NotFound(_)) => {
                        warn!("Skipping claim for {}: record was never written", id.short());
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        info!("Rebuilt catalog index with {} templates", index.snapshot().len());
        Ok(index)
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Index a stored template.
    ///
    /// Fails with `Conflict` when `(name, version)` already maps to other
    /// content; the first committed registration wins. The record is read
    /// under the write lock so the index never falls behind the store's
    /// latest metadata.
    pub fn register(&self, id: &TemplateId) -> CatalogResult<RegistrationOutcome> {
        let mut guard = self.state.write();
        let template = self.store.get(id)?;
        Self::apply(&mut guard, template)
    }

    fn apply(state: &mut Arc<IndexState>, template: Template) -> CatalogResult<RegistrationOutcome> {
        let existing = state
            .by_name
            .get(&template.name)
            .and_then(|entries| entries.iter().find(|t| t.version == template.version))
            .cloned();

        let outcome = match existing {
            Some(existing) if existing.id != template.id => {
                return Err(CatalogError::Conflict {
                    name: template.name.clone(),
                    version: template.version.to_string(),
                    existing: existing.id.clone(),
                    attempted: template.id.clone(),
                });
            }
            Some(existing) if existing.metadata == template.metadata => {
                return Ok(RegistrationOutcome::Unchanged);
            }
            Some(existing) => {
                let state = Arc::make_mut(state);
                state.remove_tags(&existing);
                state.insert(Arc::new(template.clone()));
                RegistrationOutcome::MetadataUpdated
            }
            None => {
                Arc::make_mut(state).insert(Arc::new(template.clone()));
                RegistrationOutcome::Registered
            }
        };

        let state = Arc::make_mut(state);
        state.generation += 1;
        debug!(
            "Indexed {}@{} ({:?}, generation {})",
            template.name, template.version, outcome, state.generation
        );
        Ok(outcome)
    }

    /// Take a consistent read view.
    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            state: self.state.read().clone(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn find(&self, name: &str, constraint: &VersionConstraint) -> Vec<Arc<Template>> {
        self.snapshot().find(name, constraint)
    }

    pub fn search(&self, query: &SearchQuery) -> Vec<TemplateId> {
        self.snapshot().search(query)
    }
}

impl std::fmt::Debug for CatalogIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("CatalogIndex")
            .field("templates", &snapshot.len())
            .field("generation", &snapshot.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::interface::parse_manifest;

    fn setup() -> (Arc<ArtifactStore>, CatalogIndex) {
        let store = Arc::new(ArtifactStore::new(Arc::new(MemoryBackend::new())));
        let index = CatalogIndex::new(store.clone());
        (store, index)
    }

    fn add(store: &ArtifactStore, index: &CatalogIndex, body: &str, manifest: &str) -> TemplateId {
        let id = store.put(body.as_bytes(), &parse_manifest(manifest).unwrap()).unwrap();
        index.register(&id).unwrap();
        id
    }

    #[test]
    fn test_find_descending() {
        let (store, index) = setup();
        for v in ["1.0.0", "1.2.0", "2.0.0", "1.1.0"] {
            add(&store, &index, v, &format!("name: lib\nversion: {}\n", v));
        }
        let constraint: VersionConstraint = "^1.0".parse().unwrap();
        let found: Vec<String> = index
            .find("lib", &constraint)
            .iter()
            .map(|t| t.version.to_string())
            .collect();
        assert_eq!(found, vec!["1.2.0", "1.1.0", "1.0.0"]);
        assert!(index.find("missing", &constraint).is_empty());
    }

    #[test]
    fn test_conflicting_content_rejected() {
        let (store, index) = setup();
        let first = add(&store, &index, "one", "name: lib\nversion: 1.0.0\n");
        let second = store
            .put(b"two", &parse_manifest("name: lib\nversion: 1.0.0\n").unwrap())
            .unwrap();

        match index.register(&second).unwrap_err() {
            CatalogError::Conflict { existing, attempted, .. } => {
                assert_eq!(existing, first);
                assert_eq!(attempted, second);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(index.snapshot().versions("lib")[0].id, first);
    }

    #[test]
    fn test_register_twice_is_unchanged() {
        let (store, index) = setup();
        let id = add(&store, &index, "one", "name: lib\nversion: 1.0.0\n");
        let generation = index.generation();
        assert_eq!(index.register(&id).unwrap(), RegistrationOutcome::Unchanged);
        assert_eq!(index.generation(), generation);
    }

    #[test]
    fn test_metadata_refresh_reindexes_tags() {
        let (store, index) = setup();
        add(&store, &index, "one", "name: lib\nversion: 1.0.0\ntags: [old]\n");
        let id = store
            .put(b"one", &parse_manifest("name: lib\nversion: 1.0.0\ntags: [new]\n").unwrap())
            .unwrap();
        assert_eq!(index.register(&id).unwrap(), RegistrationOutcome::MetadataUpdated);
        assert!(index.search(&SearchQuery::tag("old")).is_empty());
        assert_eq!(index.search(&SearchQuery::tag("NEW")), vec![id]);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let (store, index) = setup();
        add(&store, &index, "one", "name: lib\nversion: 1.0.0\n");
        let snapshot = index.snapshot();
        add(&store, &index, "two", "name: lib\nversion: 2.0.0\n");

        assert_eq!(snapshot.versions("lib").len(), 1);
        assert_eq!(index.snapshot().versions("lib").len(), 2);
        assert!(index.generation() > snapshot.generation());
    }

    #[test]
    fn test_search_text_glob_and_classification() {
        let (store, index) = setup();
        let vpc = add(
            &store,
            &index,
            "vpc",
            "name: vpc-network\nversion: 1.0.0\nclassification: certified\ndescription: Shared VPC\n",
        );
        let db = add(
            &store,
            &index,
            "db",
            "name: postgres\nversion: 1.0.0\nclassification: starter\ntags: [database]\n",
        );

        assert_eq!(index.search(&SearchQuery::text("vpc")), vec![vpc.clone()]);
        assert_eq!(index.search(&SearchQuery::text("shared")), vec![vpc.clone()]);
        assert_eq!(index.search(&SearchQuery::text("post*")), vec![db.clone()]);
        assert_eq!(index.search(&SearchQuery::text("DATA")), vec![db.clone()]);
        assert!(index
            .search(&SearchQuery::text("*").with_classification(Classification::Certified))
            .contains(&vpc));
        assert_eq!(
            index.search(&SearchQuery::text("*").with_classification(Classification::Starter)),
            vec![db]
        );
    }

    #[test]
    fn test_rebuild_keeps_first_committed_content() {
        let (store, index) = setup();
        let first = store
            .put(b"one", &parse_manifest("name: lib\nversion: 1.0.0\n").unwrap())
            .unwrap();
        add(&store, &index, "two", "name: app\nversion: 1.0.0\ndependencies: [lib]\n");
        let late = store.put(b"late", &parse_manifest("name: lib\nversion: 1.0.0\n").unwrap());
        assert!(matches!(late, Err(CatalogError::Conflict { .. })));

        // lib was never indexed here; the version claim decides the winner
        let rebuilt = CatalogIndex::rebuild(store).unwrap();
        let snapshot = rebuilt.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.versions("lib")[0].id, first);
        assert_eq!(snapshot.names(), vec!["app", "lib"]);
    }

    #[test]
    fn test_concurrent_metadata_refresh_matches_store() {
        let (store, index) = setup();
        let index = Arc::new(index);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let index = index.clone();
                std::thread::spawn(move || {
                    let raw = format!("name: lib\nversion: 1.0.0\ntags: [t{}]\n", i);
                    let id = store.put(b"one", &parse_manifest(&raw).unwrap()).unwrap();
                    index.register(&id).unwrap();
                    id
                })
            })
            .collect();
        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let stored = store.get(&ids[0]).unwrap();
        let indexed = index.snapshot().get(&ids[0]).unwrap();
        assert_eq!(indexed.metadata, stored.metadata);
        assert_eq!(index.search(&SearchQuery::tag(&stored.metadata.tags[0])), vec![ids[0].clone()]);
    }
}
