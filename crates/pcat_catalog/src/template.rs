//! Template entity and its identity.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::interface::InterfaceDescriptor;

/// Content hash identifying one template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

impl TemplateId {
    /// Compute the id from everything that makes up a template's content.
    ///
    /// Metadata (author, tags, classification) is deliberately absent so
    /// that re-registering the same content with new metadata converges.
    pub fn compute(
        name: &str,
        version: &Version,
        body: &[u8],
        interface: &InterfaceDescriptor,
    ) -> Self {
        let version_text = version.to_string();
        let mut hasher = Sha256::new();
        for field in [name.as_bytes(), version_text.as_bytes(), body] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field);
        }
        // serde_json maps are ordered, so this encoding is canonical
        let interface_json = serde_json::to_vec(interface).unwrap_or_default();
        hasher.update((interface_json.len() as u64).to_be_bytes());
        hasher.update(&interface_json);
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap an existing hex id.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex characters, for display.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash of a template body, used as the blob key.
pub fn body_hash(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}

/// Provenance tier of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Reviewed and supported pattern
    Certified,
    /// Contributed by a team, not reviewed
    #[default]
    Community,
    /// Starter stack or example snippet
    Starter,
}

impl Classification {
    /// Rank used to break exact version ties; higher is preferred.
    pub fn rank(&self) -> u8 {
        match self {
            Classification::Certified => 3,
            Classification::Community => 2,
            Classification::Starter => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Certified => "certified",
            Classification::Community => "community",
            Classification::Starter => "starter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "certified" => Some(Classification::Certified),
            "community" => Some(Classification::Community),
            "starter" => Some(Classification::Starter),
            _ => None,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Classification::Certified,
            Classification::Community,
            Classification::Starter,
        ]
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable-by-replacement descriptive data of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TemplateMetadata {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub classification: Classification,
}

impl TemplateMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }
}

/// `name@version` pair used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateRef {
    pub name: String,
    pub version: Version,
}

impl TemplateRef {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// An immutable, registered template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub version: Version,
    /// SHA-256 of the body blob held by the artifact store.
    pub body_hash: String,
    pub interface: InterfaceDescriptor,
    pub metadata: TemplateMetadata,
    pub registered_at: DateTime<Utc>,
}

impl Template {
    pub fn reference(&self) -> TemplateRef {
        TemplateRef::new(&self.name, self.version.clone())
    }

    pub fn classification(&self) -> Classification {
        self.metadata.classification
    }

    /// Case-insensitive tag match.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.metadata.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Case-insensitive substring match over name, description and tags.
    pub fn matches_text(&self, text: &str) -> bool {
        let needle = text.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self
                .metadata
                .description
                .as_ref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
            || self
                .metadata
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(&needle))
    }

    /// Resolver preference order: `Less` means `self` is preferred.
    ///
    /// Higher version precedence first; classification only separates
    /// versions of equal precedence (differing in build metadata).
    pub fn preference(&self, other: &Template) -> Ordering {
        precedence(&other.version, &self.version)
            .then_with(|| other.classification().rank().cmp(&self.classification().rank()))
            .then_with(|| other.version.cmp(&self.version))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Semver precedence, which ignores build metadata.
pub fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::parse_version;

    fn template(name: &str, version: &str, classification: Classification) -> Template {
        let version = parse_version(version).unwrap();
        let interface = InterfaceDescriptor::default();
        Template {
            id: TemplateId::compute(name, &version, b"body", &interface),
            name: name.to_string(),
            version,
            body_hash: body_hash(b"body"),
            interface,
            metadata: TemplateMetadata::new().with_classification(classification),
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_id_is_content_addressed() {
        let version = Version::new(1, 0, 0);
        let interface = InterfaceDescriptor::default();
        let a = TemplateId::compute("network", &version, b"vpc", &interface);
        let b = TemplateId::compute("network", &version, b"vpc", &interface);
        let c = TemplateId::compute("network", &version, b"vpc2", &interface);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let version = Version::new(1, 0, 0);
        let interface = InterfaceDescriptor::default();
        let a = TemplateId::compute("ab", &version, b"c", &interface);
        let b = TemplateId::compute("a", &version, b"bc", &interface);
        assert_ne!(a, b);
    }

    #[test]
    fn test_higher_version_beats_classification() {
        let old_certified = template("net", "1.0.0", Classification::Certified);
        let new_starter = template("net", "1.1.0", Classification::Starter);
        assert_eq!(new_starter.preference(&old_certified), Ordering::Less);
    }

    #[test]
    fn test_classification_breaks_exact_ties() {
        let certified = template("net", "1.0.0+a", Classification::Certified);
        let community = template("net", "1.0.0+b", Classification::Community);
        assert_eq!(certified.preference(&community), Ordering::Less);
        assert_eq!(community.preference(&certified), Ordering::Greater);
    }

    #[test]
    fn test_classification_parsing() {
        assert_eq!(Classification::from_str("Certified"), Some(Classification::Certified));
        assert_eq!(Classification::from_str("bogus"), None);
        assert!(Classification::Certified.rank() > Classification::Community.rank());
        assert!(Classification::Community.rank() > Classification::Starter.rank());
    }

    #[test]
    fn test_text_and_tag_matching() {
        let mut t = template("vpc-network", "1.0.0", Classification::Community);
        t.metadata.tags = vec!["Networking".into()];
        t.metadata.description = Some("Three-tier VPC".into());
        assert!(t.has_tag("networking"));
        assert!(t.matches_text("three-tier"));
        assert!(t.matches_text("VPC"));
        assert!(!t.matches_text("database"));
    }
}
