//! Resource and event types exchanged with the platform.

mod agent;
mod event;
mod mcp;
mod model;
mod resource;
mod tool;

pub use agent::{Agent, AgentPatch, AgentSpec, ModelConfig};
pub use event::{ErrorEventKind, InvocationStatus, RunEvent};
pub use mcp::{Mcp, McpPatch, McpSpec, McpTransport, RemoteTool};
pub use model::LanguageModel;
pub use resource::{
    Resource, ResourceKind, ResourcePatch, ResourceRef, ResourceSpec, ResourceState,
};
pub use tool::{DEFAULT_FRAMEWORK, Tool, ToolKind, ToolPatch, ToolSource, ToolSpec};

