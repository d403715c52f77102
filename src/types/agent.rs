//! Agent resource, create spec and patch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::resource::{
    Resource, ResourceKind, ResourcePatch, ResourceRef, ResourceSpec, ResourceState, id_list,
    lenient_timestamp,
};
use crate::client::ApiRequest;
use crate::registry::Registry;
use crate::{Error, Result};

/// Language model selection for an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Settings this SDK does not model, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelConfig {
    pub fn named(lm_name: impl Into<String>) -> Self {
        Self {
            lm_name: Some(lm_name.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "instruction", alias = "instructions")]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tool ids.
    #[serde(default, deserialize_with = "id_list")]
    pub tools: Vec<String>,
    /// Sub-agent ids this agent may delegate to.
    #[serde(default, rename = "agents", deserialize_with = "id_list")]
    pub sub_agents: Vec<String>,
    #[serde(default, deserialize_with = "id_list")]
    pub mcps: Vec<String>,
    #[serde(default, rename = "agent_config", skip_serializing_if = "Option::is_none")]
    pub model_config: Option<ModelConfig>,
    /// Server-side execution limit, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, rename = "status", alias = "state")]
    pub state: ResourceState,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource for Agent {
    const KIND: ResourceKind = ResourceKind::Agent;

    type Spec = AgentSpec;
    type Patch = AgentPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn update_body(&self) -> Value {
        let mut body = json!({
            "name": self.name,
            "instruction": self.instructions,
            "tools": self.tools,
            "agents": self.sub_agents,
            "mcps": self.mcps,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(description) = &self.description {
                obj.insert("description".into(), json!(description));
            }
            if let Some(config) = &self.model_config {
                obj.insert("agent_config".into(), json!(config));
            }
            if let Some(timeout) = self.timeout {
                obj.insert("timeout".into(), json!(timeout));
            }
            if let Some(metadata) = &self.metadata {
                obj.insert("metadata".into(), metadata.clone());
            }
        }
        body
    }
}

/// What to create. Tool, sub-agent and MCP references may be names.
#[derive(Debug, Clone, Default)]
pub struct AgentSpec {
    pub name: String,
    pub instructions: String,
    pub description: Option<String>,
    pub tools: Vec<ResourceRef>,
    pub sub_agents: Vec<ResourceRef>,
    pub mcps: Vec<ResourceRef>,
    pub model_config: Option<ModelConfig>,
    pub timeout: Option<u64>,
    pub metadata: Option<Value>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tool(mut self, tool: impl Into<ResourceRef>) -> Self {
        self.tools.push(tool.into());
        self
    }

    pub fn sub_agent(mut self, agent: impl Into<ResourceRef>) -> Self {
        self.sub_agents.push(agent.into());
        self
    }

    pub fn mcp(mut self, mcp: impl Into<ResourceRef>) -> Self {
        self.mcps.push(mcp.into());
        self
    }

    pub fn model(mut self, lm_name: impl Into<String>) -> Self {
        self.model_config
            .get_or_insert_with(ModelConfig::default)
            .lm_name = Some(lm_name.into());
        self
    }

    pub fn model_config(mut self, config: ModelConfig) -> Self {
        self.model_config = Some(config);
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

pub(crate) fn validate_name(kind: ResourceKind, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation(format!("{} name must not be empty", kind)));
    }
    Ok(())
}

fn validate_refs(label: &str, refs: &[ResourceRef]) -> Result<()> {
    if refs.iter().any(ResourceRef::is_empty) {
        return Err(Error::validation(format!("{} references must not be empty", label)));
    }
    Ok(())
}

async fn resolve_all(
    registry: &Registry,
    kind: ResourceKind,
    refs: &[ResourceRef],
) -> Result<Vec<String>> {
    let mut ids = Vec::with_capacity(refs.len());
    for reference in refs {
        ids.push(registry.resolve_id(kind, reference).await?);
    }
    Ok(ids)
}

#[async_trait]
impl ResourceSpec for AgentSpec {
    fn validate(&self) -> Result<()> {
        validate_name(ResourceKind::Agent, &self.name)?;
        if self.instructions.trim().is_empty() {
            return Err(Error::validation("agent instructions must not be empty"));
        }
        if self.timeout == Some(0) {
            return Err(Error::validation("agent timeout must be positive"));
        }
        validate_refs("tool", &self.tools)?;
        validate_refs("sub-agent", &self.sub_agents)?;
        validate_refs("mcp", &self.mcps)
    }

    async fn to_request(&self, registry: &Registry) -> Result<ApiRequest> {
        let mut body = json!({
            "name": self.name.trim(),
            "instruction": self.instructions,
            "tools": resolve_all(registry, ResourceKind::Tool, &self.tools).await?,
            "agents": resolve_all(registry, ResourceKind::Agent, &self.sub_agents).await?,
            "mcps": resolve_all(registry, ResourceKind::Mcp, &self.mcps).await?,
            "agent_config": self.model_config.clone().unwrap_or_default(),
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(description) = &self.description {
                obj.insert("description".into(), json!(description));
            }
            if let Some(timeout) = self.timeout {
                obj.insert("timeout".into(), json!(timeout));
            }
            if let Some(metadata) = &self.metadata {
                obj.insert("metadata".into(), metadata.clone());
            }
        }
        Ok(ApiRequest::post(ResourceKind::Agent.path()).json(body))
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub instructions: Option<String>,
    pub description: Option<String>,
    pub tools: Option<Vec<ResourceRef>>,
    pub sub_agents: Option<Vec<ResourceRef>>,
    pub model_config: Option<ModelConfig>,
    pub timeout: Option<u64>,
    pub metadata: Option<Value>,
}

impl AgentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tools<I, R>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceRef>,
    {
        self.tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn sub_agents<I, R>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceRef>,
    {
        self.sub_agents = Some(agents.into_iter().map(Into::into).collect());
        self
    }

    pub fn model(mut self, lm_name: impl Into<String>) -> Self {
        self.model_config = Some(ModelConfig::named(lm_name));
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }
}

#[async_trait]
impl ResourcePatch for AgentPatch {
    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(ResourceKind::Agent, name)?;
        }
        if let Some(instructions) = &self.instructions
            && instructions.trim().is_empty()
        {
            return Err(Error::validation("agent instructions must not be empty"));
        }
        if self.timeout == Some(0) {
            return Err(Error::validation("agent timeout must be positive"));
        }
        Ok(())
    }

    async fn to_json(&self, registry: &Registry) -> Result<Value> {
        let mut obj = Map::new();
        if let Some(name) = &self.name {
            obj.insert("name".into(), json!(name.trim()));
        }
        if let Some(instructions) = &self.instructions {
            obj.insert("instruction".into(), json!(instructions));
        }
        if let Some(description) = &self.description {
            obj.insert("description".into(), json!(description));
        }
        if let Some(tools) = &self.tools {
            let ids = resolve_all(registry, ResourceKind::Tool, tools).await?;
            obj.insert("tools".into(), json!(ids));
        }
        if let Some(agents) = &self.sub_agents {
            let ids = resolve_all(registry, ResourceKind::Agent, agents).await?;
            obj.insert("agents".into(), json!(ids));
        }
        if let Some(config) = &self.model_config {
            obj.insert("agent_config".into(), json!(config));
        }
        if let Some(timeout) = self.timeout {
            obj.insert("timeout".into(), json!(timeout));
        }
        if let Some(metadata) = &self.metadata {
            obj.insert("metadata".into(), metadata.clone());
        }
        Ok(Value::Object(obj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_deserialization() {
        let agent: Agent = serde_json::from_value(json!({
            "id": "a1",
            "name": "math",
            "instruction": "Solve arithmetic.",
            "tools": [{"id": "t1", "name": "calc"}, "t2"],
            "agents": null,
            "agent_config": {"lm_name": "gpt-4.1", "memory": "mem0"},
            "status": "active",
            "created_at": "2025-03-01T10:00:00.5"
        }))
        .unwrap();
        assert_eq!(agent.instructions, "Solve arithmetic.");
        assert_eq!(agent.tools, vec!["t1", "t2"]);
        assert!(agent.sub_agents.is_empty());
        let config = agent.model_config.unwrap();
        assert_eq!(config.lm_name.as_deref(), Some("gpt-4.1"));
        assert_eq!(config.extra["memory"], "mem0");
        assert!(agent.created_at.is_some());
    }

    #[test]
    fn test_instructions_alias() {
        let agent: Agent = serde_json::from_value(json!({
            "id": "a1", "name": "x", "instructions": "hi"
        }))
        .unwrap();
        assert_eq!(agent.instructions, "hi");
        assert_eq!(agent.state, ResourceState::Active);
    }

    #[test]
    fn test_spec_validation() {
        assert!(AgentSpec::new("math", "Solve.").validate().is_ok());
        assert!(matches!(
            AgentSpec::new("math", "   ").validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            AgentSpec::new("", "Solve.").validate(),
            Err(Error::Validation(_))
        ));
        assert!(
            AgentSpec::new("math", "Solve.")
                .tool("")
                .validate()
                .is_err()
        );
        assert!(
            AgentSpec::new("math", "Solve.")
                .timeout(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_patch_validation() {
        assert!(AgentPatch::new().description("d").validate().is_ok());
        assert!(AgentPatch::new().instructions(" ").validate().is_err());
    }

    #[test]
    fn test_update_body_uses_wire_names() {
        let agent: Agent = serde_json::from_value(json!({
            "id": "a1", "name": "math", "instruction": "Solve.",
            "tools": [{"id": "t1"}], "timeout": 60
        }))
        .unwrap();
        let body = agent.update_body();
        assert_eq!(body["instruction"], "Solve.");
        assert_eq!(body["tools"], json!(["t1"]));
        assert_eq!(body["timeout"], 60);
        assert!(body.get("id").is_none());
    }
}
