//! Catalog configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{FsBackend, MemoryBackend, StorageBackend};
use crate::error::{CatalogError, CatalogResult};

/// Which backend holds the artifact store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    #[default]
    Filesystem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// Root directory of the filesystem backend.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Filesystem,
            path: PathBuf::from(".pcat"),
        }
    }
}

/// Limits applied to dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Maximum search steps before a resolution gives up.
    pub step_budget: usize,
    /// Attempts made when the catalog changes under a composition.
    pub max_attempts: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            step_budget: 10_000,
            max_attempts: 3,
        }
    }
}

/// Top-level configuration file.
///
/// ```yaml
/// storage:
///   kind: filesystem
///   path: .pcat
/// resolver:
///   step_budget: 10000
///   max_attempts: 3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub storage: StorageConfig,
    pub resolver: ResolverSettings,
}

impl CatalogConfig {
    /// Load from a YAML or TOML file, chosen by extension.
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            other => {
                return Err(CatalogError::Config(format!(
                    "Unsupported config format {:?} for {:?}",
                    other.unwrap_or(""),
                    path
                )))
            }
        };
        config.validate()?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if self.resolver.step_budget == 0 {
            return Err(CatalogError::Config("resolver.step_budget must be positive".into()));
        }
        if self.resolver.max_attempts == 0 {
            return Err(CatalogError::Config("resolver.max_attempts must be positive".into()));
        }
        Ok(())
    }

    /// Override the storage directory, switching to the filesystem backend.
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.kind = StorageKind::Filesystem;
        self.storage.path = path.into();
        self
    }

    pub fn open_backend(&self) -> CatalogResult<Arc<dyn StorageBackend>> {
        Ok(match self.storage.kind {
            StorageKind::Memory => Arc::new(MemoryBackend::new()),
            StorageKind::Filesystem => Arc::new(FsBackend::open(&self.storage.path)?),
        })
    }
}
