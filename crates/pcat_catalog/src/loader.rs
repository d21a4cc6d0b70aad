//! Bulk registration of template directories.
//!
//! Any directory containing a `template.yaml` (or `template.yml`) is a
//! template. Its body is the file named by the manifest's `body:` key, or
//! otherwise every other file in the directory bundled in path order.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::Catalog;
use crate::error::{CatalogError, CatalogResult};
use crate::index::RegistrationOutcome;
use crate::interface::{parse_manifest, ParsedManifest};
use crate::template::TemplateId;

const MANIFEST_NAMES: [&str; 2] = ["template.yaml", "template.yml"];

/// Outcome of loading a directory tree.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub registered: Vec<TemplateId>,
    pub unchanged: Vec<TemplateId>,
    /// Directories that could not be registered, with the reason.
    pub failures: Vec<(PathBuf, String)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.registered.len() + self.unchanged.len() + self.failures.len()
    }
}

/// Template directory loader.
pub struct CatalogLoader {
    root: PathBuf,
}

impl CatalogLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Register every template under the root.
    ///
    /// A broken template is reported and skipped; the rest still load.
    pub fn load_into(&self, catalog: &Catalog) -> CatalogResult<LoadReport> {
        let mut report = LoadReport::default();

        if !self.root.exists() {
            warn!("Templates directory does not exist: {:?}", self.root);
            return Ok(report);
        }

        let mut dirs: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter(|e| Self::manifest_path(e.path()).is_some())
            .map(|e| e.into_path())
            .collect();
        dirs.sort();

        for dir in dirs {
            match self.load_template(&dir) {
                Ok((body, manifest)) => match catalog.register_parsed(&body, &manifest) {
                    Ok((id, RegistrationOutcome::Unchanged)) => report.unchanged.push(id),
                    Ok((id, _)) => report.registered.push(id),
                    Err(e) => {
                        warn!("Failed to register template from {:?}: {}", dir, e);
                        report.failures.push((dir, e.to_string()));
                    }
                },
                Err(e) => {
                    warn!("Failed to load template from {:?}: {}", dir, e);
                    report.failures.push((dir, e.to_string()));
                }
            }
        }

        info!(
            "Loaded {} templates from {:?} ({} unchanged, {} failed)",
            report.registered.len(),
            self.root,
            report.unchanged.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn manifest_path(dir: &Path) -> Option<PathBuf> {
        MANIFEST_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Read one template directory into a body and a validated manifest.
    pub fn load_template(&self, dir: &Path) -> CatalogResult<(Vec<u8>, ParsedManifest)> {
        let manifest_path = Self::manifest_path(dir).ok_or_else(|| {
            CatalogError::NotFound(format!("No template.yaml found in {:?}", dir))
        })?;
        debug!("Loading manifest from {:?}", manifest_path);
        let manifest = parse_manifest(&fs::read_to_string(&manifest_path)?)?;

        let body = match &manifest.body_path {
            Some(relative) => fs::read(dir.join(relative))?,
            None => Self::bundle_directory(dir)?,
        };
        Ok((body, manifest))
    }

    /// Deterministic concatenation of every non-manifest file in a template
    /// directory, stopping at nested template directories.
    fn bundle_directory(dir: &Path) -> CatalogResult<Vec<u8>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(dir).min_depth(1).into_iter().filter_entry(|e| {
            !(e.file_type().is_dir() && Self::manifest_path(e.path()).is_some())
        });
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(dir)
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            if MANIFEST_NAMES.contains(&relative.as_str()) {
                continue;
            }
            files.push((relative, entry.into_path()));
        }
        files.sort();

        let mut body = Vec::new();
        for (relative, path) in files {
            let content = fs::read(&path)?;
            body.extend_from_slice(format!("--- {} {}\n", relative, content.len()).as_bytes());
            body.extend_from_slice(&content);
            body.push(b'\n');
        }
        Ok(body)
    }
}
