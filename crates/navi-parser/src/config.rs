//! Declarative parser configuration.
//!
//! A YAML document lists, per record type, the ordered fields of that type:
//!
//! ```yaml
//! version: 1
//! parsers:
//!   Pool:
//!     properties:
//!       - label: "Pool Name:"
//!         key: name
//!         index: true
//!       - label: "LUNs:"
//!         key: luns
//!         converter: int_list
//! ```
//!
//! Every parser is compiled and checked when the document is loaded, so a
//! bad converter name or a dangling nested type fails at startup instead of
//! at the first parse.

use indexmap::IndexMap;
use navi_common::{ConfigError, NaviError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::converter::Converter;
use crate::descriptor::PropertyDescriptor;
use crate::parser::RecordParser;
use crate::record::ParsedRecord;

/// Highest document version this crate understands.
pub const CONFIG_VERSION: u32 = 1;

const BUILTIN: &str = include_str!("builtin_parsers.yaml");

#[derive(Debug, Clone, Deserialize)]
struct ParserDocument {
    version: u32,
    #[serde(default)]
    parsers: IndexMap<String, ParserSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct ParserSpec {
    #[serde(default)]
    properties: Vec<PropertySpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PropertySpec {
    label: Option<String>,
    pattern: Option<String>,
    key: String,
    converter: Option<String>,
    #[serde(default)]
    index: bool,
    end: Option<String>,
}

/// Compiled parsers for every record type of a configuration document.
#[derive(Debug, Clone)]
pub struct ParserRegistry {
    version: u32,
    parsers: HashMap<String, Arc<RecordParser>>,
    order: Vec<String>,
}

impl ParserRegistry {
    /// Parsers for the listings shipped with this crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml_str(BUILTIN)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let document: ParserDocument = serde_yaml::from_str(yaml)?;
        if document.version == 0 || document.version > CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported parser configuration version {}",
                document.version
            )));
        }

        let mut built = HashMap::new();
        for name in document.parsers.keys() {
            let mut stack = Vec::new();
            build(name, &document.parsers, &mut built, &mut stack)?;
        }

        info!(
            "Loaded {} parser(s) from configuration version {}",
            built.len(),
            document.version
        );

        Ok(Self {
            version: document.version,
            parsers: built,
            order: document.parsers.keys().cloned().collect(),
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, NaviError> {
        let yaml = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_yaml_str(&yaml)?)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Record types in document order.
    pub fn types(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, record_type: &str) -> bool {
        self.parsers.contains_key(record_type)
    }

    /// # Errors
    ///
    /// [`ConfigError::UnknownParser`] when `record_type` is not configured.
    pub fn parser(&self, record_type: &str) -> Result<Arc<RecordParser>, ConfigError> {
        self.parsers
            .get(record_type)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownParser(record_type.to_string()))
    }

    pub fn parse_all(&self, record_type: &str, text: &str) -> Result<Vec<ParsedRecord>, ConfigError> {
        Ok(self.parser(record_type)?.parse_all(text))
    }

    pub fn parse(&self, record_type: &str, text: &str) -> Result<ParsedRecord, ConfigError> {
        Ok(self.parser(record_type)?.parse(text))
    }
}

/// Compiles `name`, compiling nested types it refers to first.
fn build(
    name: &str,
    specs: &IndexMap<String, ParserSpec>,
    built: &mut HashMap<String, Arc<RecordParser>>,
    stack: &mut Vec<String>,
) -> Result<Arc<RecordParser>, ConfigError> {
    if let Some(parser) = built.get(name) {
        return Ok(Arc::clone(parser));
    }
    if stack.iter().any(|s| s == name) {
        stack.push(name.to_string());
        return Err(ConfigError::Invalid(format!(
            "circular parser reference: {}",
            stack.join(" -> ")
        )));
    }
    let spec = specs
        .get(name)
        .ok_or_else(|| ConfigError::UnknownParser(name.to_string()))?;

    stack.push(name.to_string());
    let mut descriptors = Vec::with_capacity(spec.properties.len());
    for property in &spec.properties {
        let mut descriptor = match (&property.label, &property.pattern) {
            (Some(label), None) => PropertyDescriptor::label(&property.key, label),
            (None, Some(pattern)) => PropertyDescriptor::pattern(&property.key, pattern),
            _ => return Err(ConfigError::MissingMatchSpec(property.key.clone())),
        };
        if property.index {
            descriptor = descriptor.index();
        }
        if let Some(end) = &property.end {
            descriptor = descriptor.with_end(end);
        }
        if let Some(converter) = &property.converter {
            let converter = Converter::resolve(&property.key, converter, &mut |nested| {
                build(nested, specs, built, stack)
            })?;
            descriptor = descriptor.with_converter(converter);
        }
        descriptors.push(descriptor);
    }
    stack.pop();

    let parser = Arc::new(RecordParser::new(name, descriptors)?);
    built.insert(name.to_string(), Arc::clone(&parser));
    Ok(parser)
}
