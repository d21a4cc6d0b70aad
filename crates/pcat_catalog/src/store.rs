//! Content-addressed artifact store.
//!
//! Layout inside the backend:
//!
//! ```text
//! versions/<name>/<version>           # id holding the version, claimed once
//! blobs/<body-sha256>                 # template body, written once
//! templates/<template-id>.json        # Template record
//! ```
//!
//! The version claim is written first with `put_if_absent`. Whoever
//! creates it owns `(name, version)` for good, across processes and
//! restarts; a put of other content for a claimed version fails with
//! `Conflict` before anything else is stored.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use semver::Version;
use tracing::{debug, info};

use crate::backend::StorageBackend;
use crate::error::{CatalogError, CatalogResult};
use crate::interface::ParsedManifest;
use crate::template::{body_hash, Template, TemplateId};
use crate::version::parse_version;

/// Immutable storage of template bodies and records.
///
/// There is no update or delete: corrections are new versions.
#[derive(Clone)]
pub struct ArtifactStore {
    backend: Arc<dyn StorageBackend>,
}

impl ArtifactStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    fn record_key(id: &TemplateId) -> String {
        format!("templates/{}.json", id)
    }

    fn claim_key(name: &str, version: &Version) -> String {
        format!("versions/{}/{}", name, version)
    }

    /// Store a template and return its content address.
    ///
    /// Idempotent for identical content. When the content exists but the
    /// metadata differs, the metadata is replaced (last writer wins) and
    /// the original registration time is kept. Fails with `Conflict`,
    /// storing nothing, when `(name, version)` is claimed by other content.
    pub fn put(&self, body: &[u8], manifest: &ParsedManifest) -> CatalogResult<TemplateId> {
        let id = TemplateId::compute(&manifest.name, &manifest.version, body, &manifest.interface);
        self.claim(&manifest.name, &manifest.version, &id)?;

        let blob = body_hash(body);
        if self.backend.put_if_absent(&format!("blobs/{}", blob), body)? {
            debug!("Stored body blob {}", &blob[..12]);
        }

        let record = Template {
            id: id.clone(),
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            body_hash: blob,
            interface: manifest.interface.clone(),
            metadata: manifest.metadata.clone(),
            registered_at: Utc::now(),
        };
        let key = Self::record_key(&id);

        if self.backend.put_if_absent(&key, &serde_json::to_vec_pretty(&record)?)? {
            info!("Stored template {} ({})", manifest.label(), id.short());
        } else {
            let existing = self.get(&id)?;
            if existing.metadata != manifest.metadata {
                let updated = Template {
                    metadata: manifest.metadata.clone(),
                    ..existing
                };
                self.backend.put(&key, &serde_json::to_vec_pretty(&updated)?)?;
                info!("Updated metadata of {} ({})", manifest.label(), id.short());
            } else {
                debug!("Template {} already stored", id.short());
            }
        }

        Ok(id)
    }

    fn claim(&self, name: &str, version: &Version, id: &TemplateId) -> CatalogResult<()> {
        let key = Self::claim_key(name, version);
        if self.backend.put_if_absent(&key, id.as_str().as_bytes())? {
            debug!("Claimed {}@{} for {}", name, version, id.short());
            return Ok(());
        }
        match self.claimed(name, version)? {
            Some(existing) if existing != *id => Err(CatalogError::Conflict {
                name: name.to_string(),
                version: version.to_string(),
                existing,
                attempted: id.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Id of the content that owns `(name, version)`, if any.
    pub fn claimed(&self, name: &str, version: &Version) -> CatalogResult<Option<TemplateId>> {
        Ok(self
            .backend
            .get(&Self::claim_key(name, version))?
            .map(|bytes| parse_claim(&bytes)))
    }

    /// Ids owning a version claim, in key order.
    pub fn committed_ids(&self) -> CatalogResult<Vec<TemplateId>> {
        let mut ids = Vec::new();
        for key in self.backend.list_prefix("versions/")? {
            if let Some(bytes) = self.backend.get(&key)? {
                ids.push(parse_claim(&bytes));
            }
        }
        Ok(ids)
    }

    /// Fetch a template record.
    pub fn get(&self, id: &TemplateId) -> CatalogResult<Template> {
        let bytes = self
            .backend
            .get(&Self::record_key(id))?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Fetch the body bytes of a template.
    pub fn body(&self, id: &TemplateId) -> CatalogResult<Vec<u8>> {
        let template = self.get(id)?;
        self.backend
            .get(&format!("blobs/{}", template.body_hash))?
            .ok_or_else(|| CatalogError::NotFound(format!("body of {}", id)))
    }

    /// Stored versions of a template name, newest first.
    pub fn list(&self, name: &str) -> CatalogResult<Vec<Version>> {
        let prefix = format!("versions/{}/", name);
        let mut versions = BTreeSet::new();
        for key in self.backend.list_prefix(&prefix)? {
            versions.insert(parse_version(&key[prefix.len()..])?);
        }
        Ok(versions.into_iter().rev().collect())
    }

    /// Ids of every stored template.
    pub fn all_ids(&self) -> CatalogResult<Vec<TemplateId>> {
        Ok(self
            .backend
            .list_prefix("templates/")?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix("templates/")
                    .and_then(|rest| rest.strip_suffix(".json"))
                    .map(TemplateId::from_hex)
            })
            .collect())
    }
}

fn parse_claim(bytes: &[u8]) -> TemplateId {
    TemplateId::from_hex(String::from_utf8_lossy(bytes).trim())
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore").finish_non_exhaustive()
    }
}
