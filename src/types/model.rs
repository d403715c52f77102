//! Language models offered by the platform.

use serde::{Deserialize, Serialize};

/// Catalog entry; read-only on the platform side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "lm_name")]
    pub name: String,
    #[serde(default, alias = "lm_provider", skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub supports_streaming: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_model() {
        let model: LanguageModel =
            serde_json::from_value(json!({"name": "gpt-4", "provider": "openai"})).unwrap();
        assert_eq!(model.provider.as_deref(), Some("openai"));
        assert!(model.capabilities.is_empty());
        assert_eq!(model.max_tokens, None);
        assert!(!model.supports_streaming);
    }

    #[test]
    fn test_platform_aliases() {
        let model: LanguageModel = serde_json::from_value(json!({
            "id": "lm-1",
            "lm_name": "gpt-4o-mini",
            "lm_provider": "openai",
            "capabilities": ["text-generation"],
            "max_tokens": 8192,
            "supports_streaming": true
        }))
        .unwrap();
        assert_eq!(model.id.as_deref(), Some("lm-1"));
        assert_eq!(model.name, "gpt-4o-mini");
        assert!(model.supports_streaming);
        assert_eq!(model.max_tokens, Some(8192));
    }
}
