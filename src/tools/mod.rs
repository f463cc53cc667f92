//! Tool registry
//!
//! Geoprocessing capabilities are described by explicit [`ToolDescriptor`]
//! records kept in declaration order. The registry only describes tools; running
//! them is the orchestrator's job (see [`crate::planning::executor::StepRunner`]).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RegistryError;
use crate::llm::ToolDefinition;

/// Value type of a tool option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    String,
    Number,
    Integer,
    Boolean,
    /// Reference to a map layer
    Layer,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionKind::String => "string",
            OptionKind::Number => "number",
            OptionKind::Integer => "integer",
            OptionKind::Boolean => "boolean",
            OptionKind::Layer => "layer",
        };
        f.write_str(name)
    }
}

/// One entry of a tool's options schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOption {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: OptionKind,
    pub label: String,
    #[serde(default)]
    pub default: serde_json::Value,
}

impl ToolOption {
    pub fn new(key: &str, kind: OptionKind, label: &str, default: serde_json::Value) -> Self {
        Self {
            key: key.to_string(),
            kind,
            label: label.to_string(),
            default,
        }
    }
}

/// Registration record for a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name
    pub name: String,
    /// Prompt used for matching and for LLM guidance
    pub default_prompt: String,
    #[serde(default)]
    pub options: Vec<ToolOption>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, default_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_prompt: default_prompt.into(),
            options: Vec::new(),
        }
    }

    pub fn with_option(mut self, option: ToolOption) -> Self {
        self.options.push(option);
        self
    }

    /// JSON schema of the options, for LLM tool definitions
    pub fn options_schema(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .options
            .iter()
            .map(|opt| {
                let json_type = match opt.kind {
                    OptionKind::Layer => "string",
                    OptionKind::String => "string",
                    OptionKind::Number => "number",
                    OptionKind::Integer => "integer",
                    OptionKind::Boolean => "boolean",
                };
                let mut prop = serde_json::json!({
                    "type": json_type,
                    "description": opt.label,
                });
                if !opt.default.is_null() {
                    prop["default"] = opt.default.clone();
                }
                (opt.key.clone(), prop)
            })
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ToolFile {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

/// Declaration-ordered mapping from tool name to descriptor
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with the built-in geoprocessing tools
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for tool in builtin_tools() {
            // Built-in names are distinct
            let _ = registry.register(tool);
        }
        registry
    }

    /// Load `[[tools]]` tables from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, RegistryError> {
        let file: ToolFile = toml::from_str(content)?;
        let mut registry = Self::new();
        for tool in file.tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, tool: ToolDescriptor) -> Result<(), RegistryError> {
        if self.get(&tool.name).is_some() {
            return Err(RegistryError::DuplicateTool(tool.name));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Descriptors in declaration order
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions handed to the LLM alongside the plan addendum
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolDefinition::from).collect()
    }
}

fn builtin_tools() -> Vec<ToolDescriptor> {
    use serde_json::{json, Value};

    vec![
        ToolDescriptor::new(
            "geocode",
            "Geocode street addresses or place names into point features",
        )
        .with_option(ToolOption::new("address", OptionKind::String, "Address or place name", Value::Null))
        .with_option(ToolOption::new("limit", OptionKind::Integer, "Maximum results per address", json!(1))),
        ToolDescriptor::new(
            "centroid",
            "Compute the centroid point of each feature in a layer",
        )
        .with_option(ToolOption::new("layer", OptionKind::Layer, "Input layer", Value::Null)),
        ToolDescriptor::new(
            "merge",
            "Merge two layers by joining attributes on a shared key",
        )
        .with_option(ToolOption::new("source_layer", OptionKind::Layer, "Layer to join from", Value::Null))
        .with_option(ToolOption::new("target_layer", OptionKind::Layer, "Layer to join onto", Value::Null))
        .with_option(ToolOption::new("join_key", OptionKind::String, "Attribute used as join key", json!("id"))),
        ToolDescriptor::new(
            "wmts_capabilities",
            "Fetch and parse WMTS capabilities to list available tile layers",
        )
        .with_option(ToolOption::new("url", OptionKind::String, "WMTS service URL", Value::Null)),
    ]
}
