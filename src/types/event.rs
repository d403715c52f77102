//! Typed units of streamed run output.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Running,
    #[default]
    #[serde(alias = "completed", alias = "success", alias = "done")]
    Finished,
    #[serde(alias = "error", alias = "failure")]
    Failed,
}

/// Origin of an [`RunEvent::Error`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorEventKind {
    /// A chunk could not be decoded; the stream goes on.
    Decode,
    /// The stream dropped before a final result.
    Transport,
    /// Reported by the platform; ends the run.
    #[default]
    #[serde(other)]
    Backend,
}

/// One event of a run, in the order the platform produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    TokenChunk {
        #[serde(alias = "content")]
        text: String,
    },
    ToolInvocation {
        #[serde(alias = "name")]
        tool_name: String,
        #[serde(default, alias = "arguments", alias = "input")]
        args: Value,
        #[serde(default, deserialize_with = "lenient_millis")]
        elapsed_ms: u64,
        #[serde(default)]
        status: InvocationStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
    },
    DelegationInvocation {
        #[serde(alias = "agent_name", alias = "agent")]
        target_agent: String,
        #[serde(default, deserialize_with = "lenient_millis")]
        elapsed_ms: u64,
        #[serde(default)]
        status: InvocationStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
    },
    FinalResult {
        #[serde(alias = "content", alias = "output")]
        text: String,
        #[serde(default)]
        metadata: Value,
    },
    Error {
        #[serde(default)]
        kind: ErrorEventKind,
        #[serde(alias = "error")]
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl RunEvent {
    /// Decodes one chunk payload. Anything unreadable becomes a decode error event.
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str::<RunEvent>(raw) {
            Ok(event) => event,
            Err(e) => {
                let preview: String = raw.chars().take(120).collect();
                tracing::debug!(error = %e, chunk = %preview, "undecodable chunk");
                Self::error(
                    ErrorEventKind::Decode,
                    format!("undecodable chunk ({}): {}", e, preview),
                )
            }
        }
    }

    pub fn error(kind: ErrorEventKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
            code: None,
        }
    }

    /// Wire discriminator.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TokenChunk { .. } => "token_chunk",
            Self::ToolInvocation { .. } => "tool_invocation",
            Self::DelegationInvocation { .. } => "delegation_invocation",
            Self::FinalResult { .. } => "final_result",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::FinalResult { .. } => true,
            Self::Error { kind, .. } => *kind != ErrorEventKind::Decode,
            _ => false,
        }
    }
}

fn lenient_millis<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(raw
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0).round() as u64)))
        .unwrap_or(0))
}
