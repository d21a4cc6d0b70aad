//! # pcat_catalog
//!
//! Registration side of the pattern catalog.
//!
//! This crate owns everything that happens before a template can take part
//! in a resolution:
//!
//! - Content-addressed artifact storage over a pluggable backend
//! - Interface descriptor parsing and validation
//! - Version and version constraint handling
//! - The queryable catalog index with generation-stamped snapshots
//! - Bulk loading of template directories
//!
//! ## Example
//!
//! ```rust,no_run
//! use pcat_catalog::{Catalog, VersionConstraint};
//!
//! let catalog = Catalog::in_memory();
//!
//! let id = catalog
//!     .register(b"resources: {}", r#"
//! name: network
//! version: 1.0.0
//! classification: certified
//! outputs:
//!   - name: vpcId
//!     type: string
//! "#)
//!     .unwrap();
//!
//! let constraint: VersionConstraint = ">=1.0".parse().unwrap();
//! let matches = catalog.find("network", &constraint);
//! assert_eq!(matches[0].id, id);
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod index;
pub mod interface;
pub mod loader;
pub mod store;
pub mod template;
pub mod version;

pub use backend::{BackendError, BackendResult, FsBackend, MemoryBackend, StorageBackend};
pub use catalog::Catalog;
pub use config::{CatalogConfig, ResolverSettings, StorageConfig, StorageKind};
pub use error::{CatalogError, CatalogResult, InterfaceProblem};
pub use index::{CatalogIndex, CatalogSnapshot, RegistrationOutcome, SearchQuery, SearchTerm};
pub use interface::{
    parse_manifest, DependencyRef, InterfaceDescriptor, OutputRef, OutputSpec, ParamType,
    ParameterSpec, ParsedManifest,
};
pub use loader::{CatalogLoader, LoadReport};
pub use store::ArtifactStore;
pub use template::{Classification, Template, TemplateId, TemplateMetadata, TemplateRef};
pub use version::{parse_requirement, parse_version, VersionConstraint};
