//! External interface configuration types (spec.md §6).
//!
//! These are the plug-in surfaces named "external collaborators" by spec.md
//! §1: concrete YAML/JSON loading, file watching, and CLI flags are out of
//! scope, but the shapes plug-ins produce — and a thin `serde_yaml` parse
//! function per shape, mirroring `loom::tool_source::yaml_specs`'s embedded
//! tool-definition loading — live here so the rest of the runtime has
//! something concrete to consume.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ApiType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid yaml: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),
    #[error("missing required config: {0}")]
    MissingRequired(String),
}

/// `llm_config` block shared by role and default-LLM configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfigSpec {
    pub api_type: ApiType,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    60
}

/// Plain-text configuration file per LLM agent (spec.md §6 "Role config").
///
/// The config named `"manager"` is required at startup: the system
/// instantiates it as the initial task manager (enforced by
/// [`crate::system::Mas::start`], not by this type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    pub role: String,
    pub profile: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    pub llm_config: LlmConfigSpec,
}

impl RoleConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Human-agent variant of [`RoleConfig`] (spec.md §6 "Human config").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanConfig {
    pub name: String,
    pub role: String,
    pub profile: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    /// May be empty on first use; the loader is expected to persist the
    /// generated id back to the file (out of scope here).
    #[serde(default)]
    pub agent_id: Option<String>,
    pub password: String,
    pub level: u32,
}

impl HumanConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Fallback LLM config used when agents are created dynamically without a
/// predefined role config (spec.md §6 "Default LLM config").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultLlmConfig {
    pub llm_config: LlmConfigSpec,
}

impl DefaultLlmConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// One MCP server entry (spec.md §6 "Tool-server config").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Option<std::collections::HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    pub tool_name: String,
    pub description: String,
    #[serde(rename = "mcpServers")]
    pub mcp_servers: std::collections::HashMap<String, McpServerSpec>,
}

impl ToolServerConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Per-skill use guide and prompt (spec.md §6 "Skill config"). `return_format`
/// MUST specify delimiters (e.g. `<planned_step>…</planned_step>`) so the
/// executor can extract a machine-parseable block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillConfig {
    pub skill_name: String,
    pub description: String,
    pub skill_prompt: String,
    pub return_format: String,
}

impl SkillConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }
}
