//! Identity and lifecycle shared by every resource kind.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::Result;
use crate::client::ApiRequest;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Agent,
    Tool,
    Mcp,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Agent, Self::Tool, Self::Mcp];

    /// Collection path on the platform API.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Agent => "agents",
            Self::Tool => "tools",
            Self::Mcp => "mcps",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Tool => "tool",
            Self::Mcp => "mcp",
        }
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.path(), id)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a caller points at a resource: by server id or by name.
///
/// Plain strings are classified by shape; anything that parses as a UUID is
/// taken to be an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    Id(String),
    Name(String),
}

impl ResourceRef {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if uuid::Uuid::parse_str(raw).is_ok() {
            Self::Id(raw.to_string())
        } else {
            Self::Name(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Id(s) | Self::Name(s) => s,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl From<&str> for ResourceRef {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for ResourceRef {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&String> for ResourceRef {
    fn from(raw: &String) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Also assumed when the platform omits the field.
    #[default]
    Active,
    Inactive,
    Error,
    #[serde(other)]
    Unknown,
}

/// A server-tracked entity with a stable id.
pub trait Resource: DeserializeOwned + Send + Sync + 'static {
    const KIND: ResourceKind;

    type Spec: ResourceSpec;
    type Patch: ResourcePatch;

    fn id(&self) -> &str;
    fn name(&self) -> &str;

    /// Writable fields of the current representation, as sent back on update.
    fn update_body(&self) -> Value;
}

/// Create-time description of a resource.
#[async_trait]
pub trait ResourceSpec: Send + Sync {
    /// Local checks; never touches the network.
    fn validate(&self) -> Result<()>;

    /// Builds the create call. May resolve referenced names through `registry`.
    async fn to_request(&self, registry: &Registry) -> Result<ApiRequest>;
}

/// Partial update overlaid on the current server representation.
#[async_trait]
pub trait ResourcePatch: Send + Sync {
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    async fn to_json(&self, registry: &Registry) -> Result<Value>;

    /// Overlays the patch JSON onto the current writable representation.
    fn apply_to(&self, current: &mut Value, overlay: Value) {
        merge_json(current, overlay);
    }
}

/// Accepts RFC 3339 as well as the offset-less timestamps some endpoints emit.
pub(crate) fn lenient_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_timestamp(&s)))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Reference lists arrive as ids or as `{id, name}` objects.
pub(crate) fn id_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| match item {
            Value::String(id) => Some(id),
            Value::Object(obj) => obj.get("id").and_then(Value::as_str).map(String::from),
            _ => None,
        })
        .collect())
}

/// Recursive JSON merge: objects merge key by key, everything else replaces.
pub(crate) fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_json(existing, value)
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ref_classification() {
        assert_eq!(
            ResourceRef::from("3f2b8c1e-9d4a-4c55-8f1a-2b7c9e0d1a23"),
            ResourceRef::Id("3f2b8c1e-9d4a-4c55-8f1a-2b7c9e0d1a23".into())
        );
        assert_eq!(ResourceRef::from(" calc "), ResourceRef::Name("calc".into()));
        assert!(ResourceRef::from("  ").is_empty());
    }

    #[test]
    fn test_kind_paths() {
        assert_eq!(ResourceKind::Mcp.path(), "mcps");
        assert_eq!(ResourceKind::Agent.item_path("a1"), "agents/a1");
        assert_eq!(ResourceKind::Tool.to_string(), "tool");
    }

    #[test]
    fn test_state_unknown_values() {
        let state: ResourceState = serde_json::from_value(json!("provisioning")).unwrap();
        assert_eq!(state, ResourceState::Unknown);
        let state: ResourceState = serde_json::from_value(json!("inactive")).unwrap();
        assert_eq!(state, ResourceState::Inactive);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-03-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2025-03-01T10:00:00.123456").is_some());
        assert!(parse_timestamp("2025-03-01 10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_merge_json() {
        let mut base = json!({"name": "math", "agent_config": {"lm_name": "a", "temperature": 0.1}});
        merge_json(
            &mut base,
            json!({"agent_config": {"lm_name": "b"}, "description": "d"}),
        );
        assert_eq!(
            base,
            json!({"name": "math", "description": "d", "agent_config": {"lm_name": "b", "temperature": 0.1}})
        );
    }
}
