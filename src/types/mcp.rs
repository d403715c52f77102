//! MCP server resource.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::agent::validate_name;
use super::resource::{
    Resource, ResourceKind, ResourcePatch, ResourceSpec, ResourceState, lenient_timestamp,
    merge_json,
};
use crate::client::ApiRequest;
use crate::registry::Registry;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    #[default]
    Http,
    Sse,
    Stdio,
    #[serde(other)]
    Unknown,
}

impl McpTransport {
    /// Config key this transport cannot work without.
    pub fn required_key(&self) -> Option<&'static str> {
        match self {
            Self::Http | Self::Sse => Some("url"),
            Self::Stdio => Some("command"),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mcp {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub transport: McpTransport,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, rename = "status", alias = "state")]
    pub state: ResourceState,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource for Mcp {
    const KIND: ResourceKind = ResourceKind::Mcp;

    type Spec = McpSpec;
    type Patch = McpPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn update_body(&self) -> Value {
        let mut body = json!({
            "name": self.name,
            "transport": self.transport,
            "config": self.config,
        });
        if let (Some(obj), Some(description)) = (body.as_object_mut(), &self.description) {
            obj.insert("description".into(), json!(description));
        }
        body
    }
}

/// A tool exposed by an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "input_schema", alias = "inputSchema")]
    pub schema: Option<Value>,
}

fn validate_config(transport: McpTransport, config: &Map<String, Value>) -> Result<()> {
    let Some(key) = transport.required_key() else {
        return Err(Error::validation("unsupported MCP transport"));
    };
    let present = config
        .get(key)
        .and_then(Value::as_str)
        .is_some_and(|v| !v.trim().is_empty());
    if !present {
        return Err(Error::validation(format!(
            "{} MCP transport requires a '{}' config entry",
            json!(transport).as_str().unwrap_or("unknown"),
            key
        )));
    }
    if key == "url"
        && let Some(raw) = config.get("url").and_then(Value::as_str)
        && url::Url::parse(raw).is_err()
    {
        return Err(Error::validation(format!("invalid MCP url '{}'", raw)));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct McpSpec {
    pub name: String,
    pub description: Option<String>,
    pub transport: McpTransport,
    pub config: Map<String, Value>,
}

impl McpSpec {
    pub fn new(name: impl Into<String>, transport: McpTransport) -> Self {
        Self {
            name: name.into(),
            transport,
            ..Default::default()
        }
    }

    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, McpTransport::Http).config_entry("url", url.into())
    }

    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(name, McpTransport::Stdio).config_entry("command", command.into())
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn config_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl ResourceSpec for McpSpec {
    fn validate(&self) -> Result<()> {
        validate_name(ResourceKind::Mcp, &self.name)?;
        validate_config(self.transport, &self.config)
    }

    async fn to_request(&self, _registry: &Registry) -> Result<ApiRequest> {
        let mut body = json!({
            "name": self.name.trim(),
            "transport": self.transport,
            "config": self.config,
        });
        if let (Some(obj), Some(description)) = (body.as_object_mut(), &self.description) {
            obj.insert("description".into(), json!(description));
        }
        Ok(ApiRequest::post(ResourceKind::Mcp.path()).json(body))
    }
}

#[derive(Debug, Clone, Default)]
pub struct McpPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub transport: Option<McpTransport>,
    /// Replaces the whole config map.
    pub config: Option<Map<String, Value>>,
}

impl McpPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn transport(mut self, transport: McpTransport, config: Map<String, Value>) -> Self {
        self.transport = Some(transport);
        self.config = Some(config);
        self
    }
}

#[async_trait]
impl ResourcePatch for McpPatch {
    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(ResourceKind::Mcp, name)?;
        }
        match (self.transport, &self.config) {
            (Some(transport), Some(config)) => validate_config(transport, config),
            (Some(_), None) => Err(Error::validation(
                "changing MCP transport requires a matching config",
            )),
            _ => Ok(()),
        }
    }

    async fn to_json(&self, _registry: &Registry) -> Result<Value> {
        let mut obj = Map::new();
        if let Some(name) = &self.name {
            obj.insert("name".into(), json!(name.trim()));
        }
        if let Some(description) = &self.description {
            obj.insert("description".into(), json!(description));
        }
        if let Some(transport) = self.transport {
            obj.insert("transport".into(), json!(transport));
        }
        Ok(Value::Object(obj))
    }

    /// Config replaces the stored map instead of merging into it.
    fn apply_to(&self, current: &mut Value, overlay: Value) {
        merge_json(current, overlay);
        if let (Some(config), Some(obj)) = (&self.config, current.as_object_mut()) {
            obj.insert("config".into(), Value::Object(config.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_rules() {
        assert!(McpSpec::http("docs", "https://mcp.example.com/sse").validate().is_ok());
        assert!(McpSpec::stdio("fs", "npx server-fs").validate().is_ok());
        assert!(matches!(
            McpSpec::new("docs", McpTransport::Sse).validate(),
            Err(Error::Validation(_))
        ));
        assert!(
            McpSpec::new("fs", McpTransport::Stdio)
                .config_entry("url", "https://x")
                .validate()
                .is_err()
        );
        assert!(McpSpec::http("docs", "not a url").validate().is_err());
        assert!(McpSpec::new("x", McpTransport::Unknown).validate().is_err());
    }

    #[test]
    fn test_mcp_deserialization() {
        let mcp: Mcp = serde_json::from_value(json!({
            "id": "m1",
            "name": "docs",
            "transport": "sse",
            "config": {"url": "https://mcp.example.com/sse"}
        }))
        .unwrap();
        assert_eq!(mcp.transport, McpTransport::Sse);
        assert_eq!(mcp.config["url"], "https://mcp.example.com/sse");

        let odd: Mcp =
            serde_json::from_value(json!({"id": "m2", "name": "x", "transport": "websocket"}))
                .unwrap();
        assert_eq!(odd.transport, McpTransport::Unknown);
    }

    #[test]
    fn test_patch_transport_needs_config() {
        assert!(
            McpPatch {
                transport: Some(McpTransport::Stdio),
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        let mut config = Map::new();
        config.insert("command".into(), json!("uvx tool"));
        assert!(
            McpPatch::new()
                .transport(McpTransport::Stdio, config)
                .validate()
                .is_ok()
        );
    }
}
