//! Interface descriptors.
//!
//! A template's interface is its declared contract: the parameters it
//! accepts, the outputs it exposes and the other catalog entries it
//! depends on. Interfaces arrive as YAML manifests:
//!
//! ```yaml
//! name: app
//! version: 1.0.0
//! classification: community
//! tags: [compute]
//! parameters:
//!   - name: vpcId
//!     type: string
//!     required: true
//!     source: network.vpcId
//! outputs:
//!   - name: url
//!     type: string
//! dependencies:
//!   - name: network
//!     version: ">=1.0"
//! ```
//!
//! Parsing is pure and collects every problem before failing, so a
//! rejected registration reports all malformed fields at once.

use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use semver::Version;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_yaml::{Mapping, Value as YamlValue};

use crate::error::{CatalogError, CatalogResult, InterfaceProblem};
use crate::template::{Classification, TemplateMetadata};
use crate::version::{parse_requirement, parse_version, VersionConstraint};

/// Declared type of a parameter or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    List,
    Map,
    Any,
}

impl ParamType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Some(ParamType::String),
            "number" | "float" => Some(ParamType::Number),
            "integer" | "int" => Some(ParamType::Integer),
            "boolean" | "bool" => Some(ParamType::Boolean),
            "list" | "array" => Some(ParamType::List),
            "map" | "object" => Some(ParamType::Map),
            "any" => Some(ParamType::Any),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::List => "list",
            ParamType::Map => "map",
            ParamType::Any => "any",
        }
    }

    /// Check whether a value is assignable to this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::List => value.is_array(),
            ParamType::Map => value.is_object(),
            ParamType::Any => true,
        }
    }

    /// Whether an output of this type can be bound to a parameter of `target`.
    pub fn can_feed(&self, target: ParamType) -> bool {
        *self == target
            || target == ParamType::Any
            || *self == ParamType::Any
            || (*self == ParamType::Integer && target == ParamType::Number)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a named output of a dependency, written `dependency.output`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    pub template: String,
    pub output: String,
}

impl OutputRef {
    pub fn new(template: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            output: output.into(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (template, output) = s.trim().rsplit_once('.')?;
        if template.is_empty() || output.is_empty() {
            return None;
        }
        Some(Self::new(template, output))
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.template, self.output)
    }
}

/// A declared input parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    /// Regex that string values must match
    #[serde(default)]
    pub pattern: Option<String>,
    /// Explicit upstream output this parameter is fed from
    #[serde(default)]
    pub source: Option<OutputRef>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            default: None,
            pattern: None,
            source: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Validate a concrete value against the declared type and pattern.
    pub fn check_value(&self, value: &Value) -> Result<(), String> {
        if !self.param_type.accepts(value) {
            return Err(format!(
                "expected {} for parameter '{}', got {}",
                self.param_type, self.name, value
            ));
        }
        if let (Some(pattern), Some(text)) = (&self.pattern, value.as_str()) {
            let re = Regex::new(pattern).map_err(|e| e.to_string())?;
            if !re.is_match(text) {
                return Err(format!(
                    "value '{}' for parameter '{}' does not match pattern: {}",
                    text, self.name, pattern
                ));
            }
        }
        Ok(())
    }
}

/// A declared output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub output_type: ParamType,
    #[serde(default)]
    pub description: Option<String>,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>, output_type: ParamType) -> Self {
        Self {
            name: name.into(),
            output_type,
            description: None,
        }
    }
}

/// A dependency on another catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyRef {
    pub name: String,
    pub constraint: VersionConstraint,
}

impl DependencyRef {
    pub fn new(name: impl Into<String>, constraint: VersionConstraint) -> Self {
        Self {
            name: name.into(),
            constraint,
        }
    }
}

impl fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.constraint)
    }
}

/// The validated contract of one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InterfaceDescriptor {
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
    /// Sorted by name; names are unique.
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
}

impl InterfaceDescriptor {
    /// Parse and validate the interface part of a raw manifest.
    pub fn parse(raw: &str) -> CatalogResult<Self> {
        Ok(parse_manifest(raw)?.interface)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn dependency(&self, name: &str) -> Option<&DependencyRef> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    pub fn required_parameters(&self) -> Vec<&ParameterSpec> {
        self.parameters.iter().filter(|p| p.required).collect()
    }
}

/// Everything a manifest declares, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedManifest {
    pub name: String,
    pub version: Version,
    pub metadata: TemplateMetadata,
    pub interface: InterfaceDescriptor,
    /// Body file named by the manifest, relative to the manifest.
    pub body_path: Option<String>,
}

impl ParsedManifest {
    pub fn label(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawManifest {
    name: Option<String>,
    version: Option<String>,
    classification: Option<String>,
    author: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    body: Option<String>,
    parameters: Vec<RawParameter>,
    outputs: Vec<RawOutput>,
    dependencies: Vec<RawDependency>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawParameter {
    name: String,
    #[serde(rename = "type")]
    param_type: Option<String>,
    required: bool,
    default: Option<Value>,
    pattern: Option<String>,
    source: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOutput {
    name: String,
    #[serde(rename = "type")]
    output_type: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    /// `network>=1.0` or `lib@^1.0`
    Short(String),
    Full {
        name: String,
        #[serde(default)]
        version: Option<String>,
    },
}

/// Parse and validate a raw YAML manifest.
///
/// A manifest whose fields have the wrong shape (a string where a list is
/// expected, say) is re-read field by field, so shape problems are
/// reported together with every other problem in the document.
pub fn parse_manifest(raw: &str) -> CatalogResult<ParsedManifest> {
    let (manifest, problems) = match serde_yaml::from_str::<RawManifest>(raw) {
        Ok(manifest) => (manifest, Vec::new()),
        Err(_) => {
            let document: YamlValue =
                serde_yaml::from_str(raw).map_err(|e| CatalogError::MalformedInterface {
                    template: "<unknown>".to_string(),
                    problems: vec![InterfaceProblem::new("<document>", e.to_string())],
                })?;
            LooseReader::default().read(document)
        }
    };
    ManifestValidator { problems }.validate(manifest)
}

/// Field-by-field reader for manifests that do not fit [`RawManifest`].
#[derive(Default)]
struct LooseReader {
    problems: Vec<InterfaceProblem>,
}

fn describe(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "a boolean",
        YamlValue::Number(_) => "a number",
        YamlValue::String(_) => "a string",
        YamlValue::Sequence(_) => "a sequence",
        YamlValue::Mapping(_) => "a mapping",
        YamlValue::Tagged(_) => "a tagged value",
    }
}

fn path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

impl LooseReader {
    fn problem(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.problems.push(InterfaceProblem::new(field, message));
    }

    fn read(mut self, document: YamlValue) -> (RawManifest, Vec<InterfaceProblem>) {
        let map = match document {
            YamlValue::Mapping(map) => map,
            other => {
                self.problem("<document>", format!("expected a mapping, got {}", describe(&other)));
                return (RawManifest::default(), self.problems);
            }
        };

        let manifest = RawManifest {
            name: self.text(&map, "", "name"),
            version: self.text(&map, "", "version"),
            classification: self.text(&map, "", "classification"),
            author: self.text(&map, "", "author"),
            description: self.text(&map, "", "description"),
            tags: self
                .items(&map, "tags")
                .into_iter()
                .filter_map(|(field, item)| self.scalar(&field, &item))
                .collect(),
            body: self.text(&map, "", "body"),
            parameters: self
                .items(&map, "parameters")
                .into_iter()
                .filter_map(|(field, item)| self.parameter(&field, item))
                .collect(),
            outputs: self
                .items(&map, "outputs")
                .into_iter()
                .filter_map(|(field, item)| self.output(&field, item))
                .collect(),
            dependencies: self
                .items(&map, "dependencies")
                .into_iter()
                .filter_map(|(field, item)| self.dependency(&field, item))
                .collect(),
        };
        (manifest, self.problems)
    }

    /// Scalar as text; numbers and booleans keep their YAML spelling.
    fn scalar(&mut self, field: &str, value: &YamlValue) -> Option<String> {
        match value {
            YamlValue::String(s) => Some(s.clone()),
            YamlValue::Number(n) => Some(n.to_string()),
            YamlValue::Bool(b) => Some(b.to_string()),
            other => {
                self.problem(field, format!("expected a string, got {}", describe(other)));
                None
            }
        }
    }

    fn text(&mut self, map: &Mapping, prefix: &str, key: &str) -> Option<String> {
        let value = map.get(key).filter(|v| !v.is_null())?;
        self.scalar(&path(prefix, key), value)
    }

    fn typed<T: DeserializeOwned>(&mut self, map: &Mapping, prefix: &str, key: &str) -> Option<T> {
        let value = map.get(key).filter(|v| !v.is_null())?;
        match serde_yaml::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                self.problem(path(prefix, key), e.to_string());
                None
            }
        }
    }

    fn items(&mut self, map: &Mapping, key: &str) -> Vec<(String, YamlValue)> {
        match map.get(key) {
            None | Some(YamlValue::Null) => Vec::new(),
            Some(YamlValue::Sequence(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (format!("{}[{}]", key, i), item.clone()))
                .collect(),
            Some(other) => {
                self.problem(key, format!("expected a sequence, got {}", describe(other)));
                Vec::new()
            }
        }
    }

    fn mapping(&mut self, field: &str, item: YamlValue) -> Option<Mapping> {
        match item {
            YamlValue::Mapping(map) => Some(map),
            other => {
                self.problem(field, format!("expected a mapping, got {}", describe(&other)));
                None
            }
        }
    }

    /// Elements whose name is unreadable are dropped; the problem is recorded.
    fn name(&mut self, map: &Mapping, field: &str) -> Option<String> {
        let before = self.problems.len();
        let name = self.text(map, field, "name");
        match name {
            None if self.problems.len() > before => None,
            other => Some(other.unwrap_or_default()),
        }
    }

    fn parameter(&mut self, field: &str, item: YamlValue) -> Option<RawParameter> {
        let map = self.mapping(field, item)?;
        let name = self.name(&map, field)?;
        Some(RawParameter {
            name,
            param_type: self.text(&map, field, "type"),
            required: self.typed(&map, field, "required").unwrap_or(false),
            default: self.typed(&map, field, "default"),
            pattern: self.text(&map, field, "pattern"),
            source: self.text(&map, field, "source"),
            description: self.text(&map, field, "description"),
        })
    }

    fn output(&mut self, field: &str, item: YamlValue) -> Option<RawOutput> {
        let map = self.mapping(field, item)?;
        let name = self.name(&map, field)?;
        Some(RawOutput {
            name,
            output_type: self.text(&map, field, "type"),
            description: self.text(&map, field, "description"),
        })
    }

    fn dependency(&mut self, field: &str, item: YamlValue) -> Option<RawDependency> {
        if let YamlValue::String(text) = &item {
            return Some(RawDependency::Short(text.clone()));
        }
        let map = self.mapping(field, item)?;
        let name = self.name(&map, field)?;
        Some(RawDependency::Full {
            name,
            version: self.text(&map, field, "version"),
        })
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Template names double as storage key segments.
fn is_template_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[derive(Default)]
struct ManifestValidator {
    problems: Vec<InterfaceProblem>,
}

impl ManifestValidator {
    fn problem(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.problems.push(InterfaceProblem::new(field, message));
    }

    fn validate(mut self, raw: RawManifest) -> CatalogResult<ParsedManifest> {
        let name = match raw.name.as_deref().map(str::trim) {
            None | Some("") => {
                self.problem("name", "missing template name");
                None
            }
            Some(n) if !is_template_name(n) => {
                self.problem("name", format!("invalid template name '{}'", n));
                None
            }
            Some(n) => Some(n.to_string()),
        };

        let version = match raw.version.as_deref() {
            None => {
                self.problem("version", "missing version");
                None
            }
            Some(v) => match parse_version(v) {
                Ok(version) => Some(version),
                Err(e) => {
                    self.problem("version", e.to_string());
                    None
                }
            },
        };

        let classification = match raw.classification.as_deref() {
            None => Classification::default(),
            Some(c) => Classification::from_str(c).unwrap_or_else(|| {
                self.problem(
                    "classification",
                    format!("unknown classification '{}' (expected certified, community or starter)", c),
                );
                Classification::default()
            }),
        };

        for (i, tag) in raw.tags.iter().enumerate() {
            if tag.trim().is_empty() {
                self.problem(format!("tags[{}]", i), "empty tag");
            }
        }

        let dependencies = self.validate_dependencies(name.as_deref(), raw.dependencies);
        let outputs = self.validate_outputs(raw.outputs);
        let parameters = self.validate_parameters(raw.parameters, &dependencies);

        let template = match (&name, &version) {
            (Some(n), Some(v)) => format!("{}@{}", n, v),
            (Some(n), None) => n.clone(),
            _ => "<unknown>".to_string(),
        };

        match (name, version) {
            (Some(name), Some(version)) if self.problems.is_empty() => Ok(ParsedManifest {
                name,
                version,
                metadata: TemplateMetadata {
                    author: raw.author,
                    description: raw.description,
                    tags: raw.tags.into_iter().map(|t| t.trim().to_string()).collect(),
                    classification,
                },
                interface: InterfaceDescriptor {
                    parameters,
                    outputs,
                    dependencies,
                },
                body_path: raw.body,
            }),
            _ => Err(CatalogError::MalformedInterface {
                template,
                problems: self.problems,
            }),
        }
    }

    fn validate_dependencies(
        &mut self,
        owner: Option<&str>,
        raw: Vec<RawDependency>,
    ) -> Vec<DependencyRef> {
        let mut seen = HashSet::new();
        let mut dependencies = Vec::new();

        for (i, dep) in raw.into_iter().enumerate() {
            let field = format!("dependencies[{}]", i);
            let parsed = match dep {
                RawDependency::Short(text) => parse_requirement(&text),
                RawDependency::Full { name, version } => version
                    .as_deref()
                    .unwrap_or("*")
                    .parse::<VersionConstraint>()
                    .map(|constraint| (name.trim().to_string(), constraint)),
            };
            let (name, constraint) = match parsed {
                Ok(p) => p,
                Err(e) => {
                    self.problem(field, e.to_string());
                    continue;
                }
            };

            if !is_template_name(&name) {
                self.problem(format!("{}.name", field), format!("invalid template name '{}'", name));
                continue;
            }
            if owner == Some(name.as_str()) {
                self.problem(
                    format!("{}.name", field),
                    format!("template depends on itself ({}@{})", name, constraint),
                );
                continue;
            }
            if !seen.insert(name.clone()) {
                self.problem(format!("{}.name", field), format!("duplicate dependency '{}'", name));
                continue;
            }
            dependencies.push(DependencyRef::new(name, constraint));
        }

        dependencies.sort_by(|a, b| a.name.cmp(&b.name));
        dependencies
    }

    fn validate_outputs(&mut self, raw: Vec<RawOutput>) -> Vec<OutputSpec> {
        let mut seen = HashSet::new();
        let mut outputs = Vec::new();

        for (i, output) in raw.into_iter().enumerate() {
            let field = format!("outputs[{}]", i);
            if !is_identifier(&output.name) {
                self.problem(format!("{}.name", field), format!("invalid output name '{}'", output.name));
                continue;
            }
            if !seen.insert(output.name.clone()) {
                self.problem(format!("{}.name", field), format!("duplicate output '{}'", output.name));
                continue;
            }
            let output_type = match output.output_type.as_deref() {
                None => ParamType::String,
                Some(t) => match ParamType::from_str(t) {
                    Some(t) => t,
                    None => {
                        self.problem(format!("{}.type", field), format!("unknown type '{}'", t));
                        continue;
                    }
                },
            };
            outputs.push(OutputSpec {
                name: output.name,
                output_type,
                description: output.description,
            });
        }

        outputs
    }

    fn validate_parameters(
        &mut self,
        raw: Vec<RawParameter>,
        dependencies: &[DependencyRef],
    ) -> Vec<ParameterSpec> {
        let mut seen = HashSet::new();
        let mut parameters = Vec::new();

        for (i, param) in raw.into_iter().enumerate() {
            let field = format!("parameters[{}]", i);
            let problems_before = self.problems.len();

            if !is_identifier(&param.name) {
                self.problem(format!("{}.name", field), format!("invalid parameter name '{}'", param.name));
            } else if !seen.insert(param.name.clone()) {
                self.problem(format!("{}.name", field), format!("duplicate parameter '{}'", param.name));
            }

            let param_type = match param.param_type.as_deref() {
                None => Some(ParamType::String),
                Some(t) => {
                    let parsed = ParamType::from_str(t);
                    if parsed.is_none() {
                        self.problem(format!("{}.type", field), format!("unknown type '{}'", t));
                    }
                    parsed
                }
            };

            let pattern = match param.pattern.as_deref() {
                None => None,
                Some(p) => match Regex::new(p) {
                    Ok(re) => {
                        if !matches!(param_type, Some(ParamType::String) | Some(ParamType::Any)) {
                            self.problem(
                                format!("{}.pattern", field),
                                "pattern is only allowed on string parameters",
                            );
                        }
                        Some(re)
                    }
                    Err(e) => {
                        self.problem(format!("{}.pattern", field), format!("invalid regex: {}", e));
                        None
                    }
                },
            };

            if let (Some(default), Some(param_type)) = (&param.default, param_type) {
                if !param_type.accepts(default) {
                    self.problem(
                        format!("{}.default", field),
                        format!("default {} is not assignable to type {}", default, param_type),
                    );
                } else if let (Some(re), Some(text)) = (&pattern, default.as_str()) {
                    if !re.is_match(text) {
                        self.problem(
                            format!("{}.default", field),
                            format!("default '{}' does not match pattern", text),
                        );
                    }
                }
            }

            let source = match param.source.as_deref() {
                None => None,
                Some(s) => match OutputRef::parse(s) {
                    None => {
                        self.problem(
                            format!("{}.source", field),
                            format!("expected '<dependency>.<output>', got '{}'", s),
                        );
                        None
                    }
                    Some(r) if !dependencies.iter().any(|d| d.name == r.template) => {
                        self.problem(
                            format!("{}.source", field),
                            format!("'{}' is not a declared dependency", r.template),
                        );
                        None
                    }
                    Some(r) => Some(r),
                },
            };

            if self.problems.len() > problems_before {
                continue;
            }
            if let Some(param_type) = param_type {
                parameters.push(ParameterSpec {
                    name: param.name,
                    param_type,
                    required: param.required,
                    default: param.default,
                    pattern: param.pattern,
                    source,
                    description: param.description,
                });
            }
        }

        parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const APP: &str = r#"
name: app
version: "1.0"
classification: certified
author: platform-team
tags: [compute, web]
parameters:
  - name: vpcId
    type: string
    required: true
    source: network.vpcId
  - name: instanceCount
    type: integer
    default: 2
  - name: env
    pattern: "^(dev|prod)$"
    default: dev
outputs:
  - name: url
dependencies:
  - network>=1.0
  - name: logging
    version: "^2"
"#;

    #[test]
    fn test_parse_full_manifest() {
        let parsed = parse_manifest(APP).unwrap();
        assert_eq!(parsed.name, "app");
        assert_eq!(parsed.version, Version::new(1, 0, 0));
        assert_eq!(parsed.metadata.classification, Classification::Certified);
        assert_eq!(parsed.metadata.tags, vec!["compute", "web"]);

        let iface = &parsed.interface;
        assert_eq!(iface.parameters.len(), 3);
        assert_eq!(iface.parameters[1].param_type, ParamType::Integer);
        assert_eq!(iface.parameters[1].default, Some(json!(2)));
        assert_eq!(iface.parameters[2].param_type, ParamType::String);
        assert_eq!(
            iface.parameter("vpcId").unwrap().source,
            Some(OutputRef::new("network", "vpcId"))
        );
        assert_eq!(iface.output("url").unwrap().output_type, ParamType::String);

        let deps: Vec<_> = iface.dependencies.iter().map(|d| d.to_string()).collect();
        assert_eq!(deps, vec!["logging@^2", "network@>=1.0"]);
    }

    #[test]
    fn test_reports_every_problem() {
        let raw = r#"
name: app
version: 1.0.0
parameters:
  - name: port
    type: port
  - name: port
    type: integer
    default: "eighty"
outputs:
  - name: url
  - name: url
dependencies:
  - app>=0.1
"#;
        let err = parse_manifest(raw).unwrap_err();
        let fields: Vec<_> = err.problems().iter().map(|p| p.field.as_str()).collect();
        assert!(fields.contains(&"parameters[0].type"));
        assert!(fields.contains(&"parameters[1].name"));
        assert!(fields.contains(&"parameters[1].default"));
        assert!(fields.contains(&"outputs[1].name"));
        assert!(fields.contains(&"dependencies[0].name"));
        assert!(err.to_string().contains("depends on itself"));
    }

    #[test]
    fn test_shape_errors_reported_with_other_problems() {
        let raw = r#"
name: net
version: 1.0
tags: networking
parameters:
  - name: cidr
    type: strng
  - name: ha
    type: boolean
    required: maybe
  - oops
outputs:
  - name: [vpcId]
"#;
        let err = parse_manifest(raw).unwrap_err();
        let fields: Vec<_> = err.problems().iter().map(|p| p.field.as_str()).collect();
        assert!(fields.contains(&"tags"), "{fields:?}");
        assert!(fields.contains(&"parameters[0].type"), "{fields:?}");
        assert!(fields.contains(&"parameters[1].required"), "{fields:?}");
        assert!(fields.contains(&"parameters[2]"), "{fields:?}");
        assert!(fields.contains(&"outputs[0].name"), "{fields:?}");
        assert_eq!(fields.len(), 5, "{fields:?}");
        assert!(err.to_string().contains("net@"));
    }

    #[test]
    fn test_self_dependency_at_any_constraint() {
        let raw = "name: lib\nversion: 1.0.0\ndependencies:\n  - name: lib\n";
        let err = parse_manifest(raw).unwrap_err();
        assert!(matches!(err, CatalogError::MalformedInterface { .. }));
    }

    #[test]
    fn test_source_must_name_declared_dependency() {
        let raw = r#"
name: app
version: 1.0.0
parameters:
  - name: vpcId
    source: network.vpcId
"#;
        let err = parse_manifest(raw).unwrap_err();
        assert_eq!(err.problems()[0].field, "parameters[0].source");
    }

    #[test]
    fn test_default_must_match_pattern() {
        let raw = r#"
name: app
version: 1.0.0
parameters:
  - name: env
    pattern: "^(dev|prod)$"
    default: staging
"#;
        let err = parse_manifest(raw).unwrap_err();
        assert_eq!(err.problems()[0].field, "parameters[0].default");
    }

    #[test]
    fn test_missing_name_and_version() {
        let err = parse_manifest("description: nothing\n").unwrap_err();
        let fields: Vec<_> = err.problems().iter().map(|p| p.field.clone()).collect();
        assert_eq!(fields, vec!["name", "version"]);
    }

    #[test]
    fn test_yaml_syntax_error() {
        let err = parse_manifest("name: [unclosed").unwrap_err();
        assert_eq!(err.problems()[0].field, "<document>");
    }

    #[test]
    fn test_type_assignability() {
        assert!(ParamType::Number.accepts(&json!(1.5)));
        assert!(ParamType::Integer.accepts(&json!(3)));
        assert!(!ParamType::Integer.accepts(&json!(1.5)));
        assert!(ParamType::Map.accepts(&json!({"a": 1})));
        assert!(ParamType::Integer.can_feed(ParamType::Number));
        assert!(!ParamType::Number.can_feed(ParamType::Integer));
    }

    #[test]
    fn test_check_value() {
        let spec = ParameterSpec {
            pattern: Some("^vpc-".to_string()),
            ..ParameterSpec::new("vpcId", ParamType::String)
        };
        assert!(spec.check_value(&json!("vpc-123")).is_ok());
        assert!(spec.check_value(&json!("subnet-1")).is_err());
        assert!(spec.check_value(&json!(7)).is_err());
    }
}
