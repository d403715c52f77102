//! # aip-sdk
//!
//! Rust SDK for the AI Agent Platform: create, configure, run and tear down
//! agents, tools and MCP servers, and observe agent runs as a live event stream.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aip_sdk::{AgentSpec, Client, RunEvent, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), aip_sdk::Error> {
//!     let client = Client::builder()
//!         .api_url("https://aip.example.com/api")
//!         .api_key("sk-test")
//!         .build()?;
//!
//!     let agent = client
//!         .agents()
//!         .create(&AgentSpec::new("math", "You solve arithmetic problems."))
//!         .await?;
//!
//!     let mut run = client.agents().run(agent.id.as_str(), RunRequest::new("2+2")).await?;
//!     while let Some(event) = run.next_event().await {
//!         if let RunEvent::TokenChunk { text } = &event {
//!             print!("{}", text);
//!         }
//!     }
//!     let result = run.finish().await?;
//!     println!("\n{} invocations", result.invocations.len());
//!
//!     client.agents().delete(agent.id.as_str()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Scoped cleanup
//!
//! ```rust,no_run
//! use aip_sdk::{Client, ResourceManager, ToolSpec};
//!
//! # async fn example(client: Client) -> Result<(), aip_sdk::Error> {
//! let tools = ResourceManager::scoped(client.deleter(), |resources| {
//!     let client = client.clone();
//!     async move {
//!         let tool = client.tools().create(&ToolSpec::inline("calc", "def calc(): ...")).await?;
//!         resources.register_resource(&tool);
//!         client.tools().list_all().await
//!     }
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod cleanup;
pub mod client;
pub mod config;
pub mod history;
pub mod registry;
pub mod run;
pub mod types;

pub use cleanup::{CleanupFailure, CleanupReport, ResourceDeleter, ResourceManager};
pub use client::{
    ApiRequest, Client, ClientBuilder, ExponentialBackoff, HttpTransport, NdjsonFramer,
    RequestBody, Retry, RetryConfig, SseFramer, StreamFraming, Transport,
};
pub use config::{ClientConfig, ConfigError};
pub use history::{AlternationPolicy, ChatMessage, Role, normalize, normalize_with};
pub use registry::{ListFilter, Models, Registry, Resources};
pub use run::{Attachment, Invocation, InvocationKind, Run, RunRequest, RunResult, RunState};
pub use types::{
    Agent, AgentPatch, AgentSpec, ErrorEventKind, InvocationStatus, LanguageModel, Mcp, McpPatch,
    McpSpec, McpTransport, ModelConfig, RemoteTool, Resource, ResourceKind, ResourcePatch,
    ResourceRef, ResourceSpec, ResourceState, RunEvent, Tool, ToolKind, ToolPatch, ToolSource,
    ToolSpec,
};

use serde::Serialize;
use std::time::Duration;

/// Error type for aip-sdk operations.
///
/// Local validation failures never reach the network; everything else maps a
/// transport or backend condition. Failed and cancelled runs are reported as
/// [`Error::RunAborted`], which keeps every event observed before the failure.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Local pre-flight validation failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Resource does not exist (HTTP 404 or no match for a name).
    #[error("Not found: {0}")]
    NotFound(String),

    /// A name matched more than one resource of the same kind.
    #[error("Ambiguous {kind} name '{name}': {matches} resources match")]
    AmbiguousName {
        kind: ResourceKind,
        name: String,
        matches: usize,
    },

    /// Duplicate name or conflicting state (HTTP 409).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Credential rejected (HTTP 401).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Credential lacks permission (HTTP 403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Network connectivity or request failed.
    #[error("Network request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Stream dropped before a terminal event arrived.
    #[error("Stream disconnected: {0}")]
    Disconnected(String),

    /// A stream chunk could not be decoded.
    #[error("Malformed stream chunk: {0}")]
    Decode(String),

    /// Operation exceeded its deadline.
    #[error("Operation timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Operation cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Structured error reported by the backend, carried verbatim.
    #[error("Backend error (HTTP {}): {message}", status.map(|s| s.to_string()).unwrap_or_else(|| "n/a".into()))]
    Backend {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A run ended `Failed` or `Cancelled`; `partial` holds everything observed.
    #[error("Run {}: {cause}", partial.state)]
    RunAborted {
        cause: Box<Error>,
        partial: Box<RunResult>,
    },
}

/// Taxonomy name of an [`Error`], stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    AmbiguousName,
    Conflict,
    Authentication,
    Forbidden,
    Transport,
    Decode,
    Timeout,
    Cancelled,
    Backend,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::AmbiguousName => "ambiguous_name",
            Self::Conflict => "conflict",
            Self::Authentication => "authentication",
            Self::Forbidden => "forbidden",
            Self::Transport => "transport",
            Self::Decode => "decode",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Backend => "backend",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn not_found(kind: ResourceKind, reference: impl std::fmt::Display) -> Self {
        Error::NotFound(format!("{} '{}'", kind, reference))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AmbiguousName { .. } => ErrorKind::AmbiguousName,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Transport(_) | Error::Disconnected(_) => ErrorKind::Transport,
            Error::Decode(_) => ErrorKind::Decode,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Backend { .. } => ErrorKind::Backend,
            Error::Config(_) => ErrorKind::Config,
            Error::Json(_) | Error::Io(_) => ErrorKind::Internal,
            Error::RunAborted { cause, .. } => cause.kind(),
        }
    }

    /// Transient network-level failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Error::Backend {
                status: Some(502..=504),
                ..
            } => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Backend { status, .. } => *status,
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            Error::RunAborted { cause, .. } => cause.status_code(),
            _ => None,
        }
    }

    /// Backend error code, when the server supplied one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Backend { code, .. } => code.as_deref(),
            Error::RunAborted { cause, .. } => cause.code(),
            _ => None,
        }
    }

    /// Events and partial output observed before a run failed or was cancelled.
    pub fn partial_run(&self) -> Option<&RunResult> {
        match self {
            Error::RunAborted { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::Missing { key } => {
                Error::Config(format!("{} is not set", key))
            }
            config::ConfigError::InvalidValue { key, message } => {
                Error::Config(format!("Invalid value for {}: {}", key, message))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Backend {
            message: "Invalid agent config".to_string(),
            status: Some(422),
            code: Some("invalid_config".to_string()),
        };
        assert!(err.to_string().contains("Invalid agent config"));
        assert!(err.to_string().contains("422"));
        assert_eq!(err.code(), Some("invalid_config"));
    }

    #[test]
    fn test_error_is_retryable() {
        let gateway = Error::Backend {
            message: "Bad gateway".to_string(),
            status: Some(502),
            code: None,
        };
        assert!(gateway.is_retryable());

        let server_error = Error::Backend {
            message: "Internal error".to_string(),
            status: Some(500),
            code: None,
        };
        assert!(!server_error.is_retryable());

        assert!(!Error::validation("empty instruction").is_retryable());
        assert!(!Error::Disconnected("reset".into()).is_retryable());
    }

    #[test]
    fn test_error_kind_names() {
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            Error::Timeout(Duration::from_secs(1)).kind().as_str(),
            "timeout"
        );
        assert_eq!(
            Error::not_found(ResourceKind::Tool, "calc").to_string(),
            "Not found: tool 'calc'"
        );
        let ambiguous = Error::AmbiguousName {
            kind: ResourceKind::Agent,
            name: "math".into(),
            matches: 2,
        };
        assert_eq!(ambiguous.kind(), ErrorKind::AmbiguousName);
        assert!(ambiguous.to_string().contains("'math'"));
    }

    #[test]
    fn test_run_aborted_reports_cause_kind() {
        let partial = RunResult::partial(RunState::Cancelled, Vec::new(), Duration::ZERO);
        let err = Error::RunAborted {
            cause: Box::new(Error::Timeout(Duration::from_secs(1))),
            partial: Box::new(partial),
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().starts_with("Run cancelled"));
        assert!(err.partial_run().is_some());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: Error = config::ConfigError::Missing {
            key: "AIP_API_KEY".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
