//! Tool resource. Custom tools are uploaded as plugin source files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::agent::validate_name;
use super::resource::{
    Resource, ResourceKind, ResourcePatch, ResourceSpec, ResourceState, lenient_timestamp,
};
use crate::client::{ApiRequest, FormPart};
use crate::registry::Registry;
use crate::{Error, Result};

pub const DEFAULT_FRAMEWORK: &str = "langchain";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Provided by the platform, no payload.
    Native,
    /// Caller-supplied code uploaded as a plugin.
    #[default]
    Custom,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "tool_type", alias = "type")]
    pub kind: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    /// Input parameter description.
    #[serde(
        default,
        alias = "input_schema",
        alias = "parameters",
        skip_serializing_if = "Option::is_none"
    )]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, rename = "status", alias = "state")]
    pub state: ResourceState,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource for Tool {
    const KIND: ResourceKind = ResourceKind::Tool;

    type Spec = ToolSpec;
    type Patch = ToolPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn update_body(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("name".into(), json!(self.name));
        obj.insert("tool_type".into(), json!(self.kind));
        if let Some(description) = &self.description {
            obj.insert("description".into(), json!(description));
        }
        if let Some(framework) = &self.framework {
            obj.insert("framework".into(), json!(framework));
        }
        if let Some(schema) = &self.schema {
            obj.insert("input_schema".into(), schema.clone());
        }
        Value::Object(obj)
    }
}

/// Where a custom tool's code comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    Inline {
        code: String,
        /// Upload file name; defaults to `<tool name>.py`.
        filename: Option<String>,
    },
    File(PathBuf),
}

impl ToolSource {
    pub fn inline(code: impl Into<String>) -> Self {
        Self::Inline {
            code: code.into(),
            filename: None,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Inline { code, .. } if code.trim().is_empty() => {
                Err(Error::validation("tool source code must not be empty"))
            }
            Self::File(path) if path.as_os_str().is_empty() => {
                Err(Error::validation("tool source path must not be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Loads the source as the multipart `file` part.
    pub(crate) async fn to_part(&self, tool_name: &str) -> Result<FormPart> {
        match self {
            Self::Inline { code, filename } => {
                let filename = filename
                    .clone()
                    .unwrap_or_else(|| format!("{}.py", tool_name.trim()));
                let mime = mime_guess::from_path(&filename)
                    .first_or_octet_stream()
                    .to_string();
                Ok(FormPart::file("file", filename, mime, code.clone().into_bytes()))
            }
            Self::File(path) => read_source(path).await,
        }
    }
}

async fn read_source(path: &Path) -> Result<FormPart> {
    FormPart::from_path("file", path).await.map_err(|e| match e {
        Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => Error::validation(format!(
            "tool source file not found: {}",
            path.display()
        )),
        other => other,
    })
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub framework: String,
    pub source: Option<ToolSource>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            framework: DEFAULT_FRAMEWORK.to_string(),
            source: None,
        }
    }

    pub fn inline(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(name).source(ToolSource::inline(code))
    }

    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(name).source(ToolSource::file(path))
    }

    pub fn source(mut self, source: ToolSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = framework.into();
        self
    }
}

#[async_trait]
impl ResourceSpec for ToolSpec {
    fn validate(&self) -> Result<()> {
        validate_name(ResourceKind::Tool, &self.name)?;
        if self.framework.trim().is_empty() {
            return Err(Error::validation("tool framework must not be empty"));
        }
        match &self.source {
            Some(source) => source.validate(),
            None => Err(Error::validation(
                "tool requires inline source code or a source file",
            )),
        }
    }

    async fn to_request(&self, _registry: &Registry) -> Result<ApiRequest> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| Error::validation("tool requires inline source code or a source file"))?;

        let mut parts = vec![
            source.to_part(&self.name).await?,
            FormPart::text("name", self.name.trim()),
            FormPart::text("framework", self.framework.clone()),
        ];
        if let Some(description) = &self.description {
            parts.push(FormPart::text("description", description.clone()));
        }
        Ok(ApiRequest::post(format!("{}/upload", ResourceKind::Tool.path())).multipart(parts))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub framework: Option<String>,
    pub schema: Option<Value>,
}

impl ToolPatch {
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

    pub fn framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

#[async_trait]
impl ResourcePatch for ToolPatch {
    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(ResourceKind::Tool, name)?;
        }
        Ok(())
    }

    async fn to_json(&self, _registry: &Registry) -> Result<Value> {
        let mut obj = Map::new();
        if let Some(name) = &self.name {
            obj.insert("name".into(), json!(name.trim()));
        }
        if let Some(description) = &self.description {
            obj.insert("description".into(), json!(description));
        }
        if let Some(framework) = &self.framework {
            obj.insert("framework".into(), json!(framework));
        }
        if let Some(schema) = &self.schema {
            obj.insert("input_schema".into(), schema.clone());
        }
        Ok(Value::Object(obj))
    }
}
