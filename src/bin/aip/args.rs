use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Manage agents, tools and MCP servers on the AI Agent Platform
#[derive(Parser, Debug)]
#[command(name = "aip", version, about, long_about = None)]
pub struct Cli {
    /// Platform API base URL
    #[arg(long, env = "AIP_API_URL", global = true)]
    pub api_url: Option<String>,

    /// API key sent as X-API-Key
    #[arg(long, env = "AIP_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Output style
    #[arg(long, value_enum, default_value_t = View::Rich, global = true)]
    pub view: View,

    /// Request timeout in seconds; also bounds a whole run
    #[arg(long, global = true)]
    pub timeout: Option<f64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Rich,
    Plain,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage agents
    Agents {
        #[command(subcommand)]
        action: AgentCommand,
    },
    /// Manage tools
    Tools {
        #[command(subcommand)]
        action: ToolCommand,
    },
    /// Manage MCP servers
    Mcps {
        #[command(subcommand)]
        action: McpCommand,
    },
    /// Browse available language models
    Models {
        #[command(subcommand)]
        action: ModelCommand,
    },
}

#[derive(Args, Debug)]
pub struct Reference {
    /// Id or exact name
    pub reference: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only resources whose name contains this text
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum AgentCommand {
    Create {
        name: String,
        #[arg(long, short)]
        instructions: String,
        #[arg(long)]
        description: Option<String>,
        /// Tool id or name; repeatable
        #[arg(long = "tool")]
        tools: Vec<String>,
        /// Sub-agent id or name; repeatable
        #[arg(long = "sub-agent")]
        sub_agents: Vec<String>,
        /// MCP id or name; repeatable
        #[arg(long = "mcp")]
        mcps: Vec<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        temperature: Option<f64>,
        /// Server-side run timeout in seconds
        #[arg(long)]
        run_timeout: Option<u64>,
    },
    Get(Reference),
    List(ListArgs),
    Update {
        reference: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, short)]
        instructions: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Replaces the tool list; repeatable
        #[arg(long = "tool")]
        tools: Vec<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        run_timeout: Option<u64>,
    },
    Delete(Reference),
    /// Run an agent and stream its events
    Run {
        reference: String,
        input: String,
        /// Prior turns as a JSON list of {role, content}
        #[arg(long)]
        chat_history: Option<String>,
        /// File to attach; repeatable
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Merge consecutive turns of the same role instead of rejecting them
        #[arg(long)]
        relaxed_history: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ToolCommand {
    Create {
        name: String,
        /// Plugin source file
        #[arg(long, conflicts_with = "code", required_unless_present = "code")]
        file: Option<PathBuf>,
        /// Plugin source given inline
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        framework: Option<String>,
    },
    Get(Reference),
    List(ListArgs),
    Update {
        reference: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        framework: Option<String>,
        /// Replace the plugin source with this file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    Delete(Reference),
    /// Print the source of a custom tool
    Script(Reference),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportArg {
    Http,
    Sse,
    Stdio,
}

#[derive(Subcommand, Debug)]
pub enum McpCommand {
    Create {
        name: String,
        #[arg(long, value_enum, default_value_t = TransportArg::Http)]
        transport: TransportArg,
        /// Server URL (http, sse)
        #[arg(long)]
        url: Option<String>,
        /// Launch command (stdio)
        #[arg(long)]
        command: Option<String>,
        /// Command argument; repeatable
        #[arg(long = "arg")]
        args: Vec<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Get(Reference),
    List(ListArgs),
    Update {
        reference: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// New transport; replaces the whole connection config
        #[arg(long, value_enum)]
        transport: Option<TransportArg>,
        #[arg(long, requires = "transport")]
        url: Option<String>,
        #[arg(long, requires = "transport")]
        command: Option<String>,
        #[arg(long = "arg", requires = "transport")]
        args: Vec<String>,
    },
    Delete(Reference),
    /// List the tools an MCP server exposes
    Tools(Reference),
}

#[derive(Subcommand, Debug)]
pub enum ModelCommand {
    List,
    /// Show one model by id or exact name
    Get(Reference),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "aip", "agents", "run", "math", "2+2", "--view", "json", "--timeout", "1.5",
        ]);
        assert_eq!(cli.view, View::Json);
        assert_eq!(cli.timeout, Some(1.5));
        match cli.command {
            Command::Agents {
                action: AgentCommand::Run { reference, input, .. },
            } => {
                assert_eq!(reference, "math");
                assert_eq!(input, "2+2");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_repeatable_flags() {
        let cli = Cli::parse_from([
            "aip", "agents", "create", "math", "-i", "Solve it", "--tool", "calc", "--tool",
            "clock",
        ]);
        match cli.command {
            Command::Agents {
                action: AgentCommand::Create { tools, .. },
            } => assert_eq!(tools, vec!["calc", "clock"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_tool_create_needs_source() {
        assert!(Cli::try_parse_from(["aip", "tools", "create", "calc"]).is_err());
        assert!(Cli::try_parse_from(["aip", "tools", "create", "calc", "--code", "x"]).is_ok());
    }

    #[test]
    fn test_mcp_update_connection_flags() {
        let cli = Cli::parse_from([
            "aip", "mcps", "update", "fs", "--transport", "stdio", "--command", "uvx",
            "--arg", "mcp-fs", "--arg", "/srv",
        ]);
        match cli.command {
            Command::Mcps {
                action:
                    McpCommand::Update {
                        transport,
                        command,
                        args,
                        url,
                        ..
                    },
            } => {
                assert_eq!(transport, Some(TransportArg::Stdio));
                assert_eq!(command.as_deref(), Some("uvx"));
                assert_eq!(args, vec!["mcp-fs", "/srv"]);
                assert_eq!(url, None);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(
            Cli::try_parse_from(["aip", "mcps", "update", "docs", "--url", "https://x"]).is_err()
        );
    }

    #[test]
    fn test_models_commands() {
        let cli = Cli::parse_from(["aip", "models", "get", "gpt-4o-mini"]);
        assert!(matches!(
            cli.command,
            Command::Models {
                action: ModelCommand::Get(Reference { ref reference })
            } if reference == "gpt-4o-mini"
        ));
        assert!(Cli::try_parse_from(["aip", "models", "list"]).is_ok());
        assert!(Cli::try_parse_from(["aip", "models", "delete", "x"]).is_err());
    }

    #[test]
    fn test_run_only_for_agents() {
        assert!(Cli::try_parse_from(["aip", "tools", "run", "calc", "x"]).is_err());
    }
}
