//! `aip`: command-line front end for the AI Agent Platform.

mod args;
mod render;

use std::process::ExitCode;
use std::time::Duration;

use aip_sdk::history::parse_json;
use aip_sdk::{
    AgentPatch, AgentSpec, AlternationPolicy, Client, Error, ErrorKind, McpPatch,
    McpSpec, McpTransport, ModelConfig, Result, RunRequest, ToolPatch, ToolSource, ToolSpec,
};
use clap::Parser;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use args::{AgentCommand, Cli, Command, McpCommand, ModelCommand, ToolCommand, TransportArg};
use render::Renderer;

const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut renderer = Renderer::new(cli.view);

    match execute(cli, &mut renderer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            renderer.error(&e);
            match e.kind() {
                ErrorKind::Cancelled => ExitCode::from(EXIT_CANCELLED),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn execute(cli: Cli, renderer: &mut Renderer) -> Result<()> {
    let timeout = cli.timeout.map(seconds).transpose()?;

    let mut builder = Client::builder();
    if let Some(url) = cli.api_url {
        builder = builder.api_url(url);
    }
    if let Some(key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build()?;

    match cli.command {
        Command::Agents { action } => agents(&client, action, timeout, renderer).await,
        Command::Tools { action } => tools(&client, action, renderer).await,
        Command::Mcps { action } => mcps(&client, action, renderer).await,
        Command::Models { action } => models(&client, action, renderer).await,
    }
}

async fn agents(
    client: &Client,
    action: AgentCommand,
    timeout: Option<Duration>,
    renderer: &mut Renderer,
) -> Result<()> {
    let agents = client.agents();
    match action {
        AgentCommand::Create {
            name,
            instructions,
            description,
            tools,
            sub_agents,
            mcps,
            model,
            provider,
            temperature,
            run_timeout,
        } => {
            let mut spec = AgentSpec::new(name, instructions);
            if let Some(description) = description {
                spec = spec.description(description);
            }
            for tool in tools {
                spec = spec.tool(tool);
            }
            for agent in sub_agents {
                spec = spec.sub_agent(agent);
            }
            for mcp in mcps {
                spec = spec.mcp(mcp);
            }
            if model.is_some() || provider.is_some() || temperature.is_some() {
                spec = spec.model_config(ModelConfig {
                    lm_name: model,
                    lm_provider: provider,
                    temperature,
                    ..Default::default()
                });
            }
            if let Some(seconds) = run_timeout {
                spec = spec.timeout(seconds);
            }
            renderer.item(&agents.create(&spec).await?);
        }
        AgentCommand::Get(r) => renderer.item(&agents.get(r.reference).await?),
        AgentCommand::List(args) => {
            let items = match args.name {
                Some(fragment) => agents.find(&fragment).await?,
                None => agents.list_all().await?,
            };
            renderer.list(&items);
        }
        AgentCommand::Update {
            reference,
            name,
            instructions,
            description,
            tools,
            model,
            run_timeout,
        } => {
            let mut patch = AgentPatch::new();
            if let Some(name) = name {
                patch = patch.name(name);
            }
            if let Some(instructions) = instructions {
                patch = patch.instructions(instructions);
            }
            if let Some(description) = description {
                patch = patch.description(description);
            }
            if !tools.is_empty() {
                patch = patch.tools(tools);
            }
            if let Some(model) = model {
                patch = patch.model(model);
            }
            if let Some(seconds) = run_timeout {
                patch = patch.timeout(seconds);
            }
            renderer.item(&agents.update(reference, &patch).await?);
        }
        AgentCommand::Delete(r) => {
            agents.delete(r.reference.as_str()).await?;
            renderer.deleted("agent", &r.reference);
        }
        AgentCommand::Run {
            reference,
            input,
            chat_history,
            files,
            relaxed_history,
        } => {
            let cancel = CancellationToken::new();
            let mut request = RunRequest::new(input).cancellation(cancel.clone());
            if let Some(raw) = chat_history {
                request = request.history(parse_json(&raw)?);
            }
            for file in files {
                request = request.file(file);
            }
            if relaxed_history {
                request = request.alternation(AlternationPolicy::Relaxed);
            }
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            let mut run = agents.run(reference, request).await?;
            let listener = cancel_on_interrupt(cancel.clone());

            while let Some(event) = run.next_event().await {
                renderer.event(&event);
            }
            let finished = run.finish().await;
            listener.abort();
            renderer.run_summary(&finished?);
        }
    }
    Ok(())
}

async fn tools(client: &Client, action: ToolCommand, renderer: &mut Renderer) -> Result<()> {
    let tools = client.tools();
    match action {
        ToolCommand::Create {
            name,
            file,
            code,
            description,
            framework,
        } => {
            let source = match (file, code) {
                (Some(path), _) => ToolSource::file(path),
                (None, Some(code)) => ToolSource::inline(code),
                (None, None) => return Err(Error::validation("a tool needs --file or --code")),
            };
            let mut spec = ToolSpec::new(name).source(source);
            if let Some(description) = description {
                spec = spec.description(description);
            }
            if let Some(framework) = framework {
                spec = spec.framework(framework);
            }
            renderer.item(&tools.create(&spec).await?);
        }
        ToolCommand::Get(r) => renderer.item(&tools.get(r.reference).await?),
        ToolCommand::List(args) => {
            let items = match args.name {
                Some(fragment) => tools.find(&fragment).await?,
                None => tools.list_all().await?,
            };
            renderer.list(&items);
        }
        ToolCommand::Update {
            reference,
            name,
            description,
            framework,
            file,
        } => {
            let changes_fields = name.is_some() || description.is_some() || framework.is_some();
            let mut patch = ToolPatch::new();
            if let Some(name) = name {
                patch = patch.name(name);
            }
            if let Some(description) = description {
                patch = patch.description(description);
            }
            if let Some(framework) = framework {
                patch = patch.framework(framework);
            }

            let id = tools.resolve(reference).await?;
            let mut updated = None;
            if changes_fields {
                updated = Some(tools.update(id.as_str(), &patch).await?);
            }
            if let Some(path) = file {
                updated = Some(tools.upload_source(id.as_str(), &ToolSource::file(path)).await?);
            }
            let tool = match updated {
                Some(tool) => tool,
                None => tools.get(id.as_str()).await?,
            };
            renderer.item(&tool);
        }
        ToolCommand::Delete(r) => {
            tools.delete(r.reference.as_str()).await?;
            renderer.deleted("tool", &r.reference);
        }
        ToolCommand::Script(r) => renderer.text(&tools.script(r.reference).await?),
    }
    Ok(())
}

async fn mcps(client: &Client, action: McpCommand, renderer: &mut Renderer) -> Result<()> {
    let mcps = client.mcps();
    match action {
        McpCommand::Create {
            name,
            transport,
            url,
            command,
            args,
            description,
        } => {
            let (transport, config) = connection(transport, url, command, args);
            let mut spec = McpSpec::new(name, transport);
            spec.config = config;
            if let Some(description) = description {
                spec = spec.description(description);
            }
            renderer.item(&mcps.create(&spec).await?);
        }
        McpCommand::Get(r) => renderer.item(&mcps.get(r.reference).await?),
        McpCommand::List(args) => {
            let items = match args.name {
                Some(fragment) => mcps.find(&fragment).await?,
                None => mcps.list_all().await?,
            };
            renderer.list(&items);
        }
        McpCommand::Update {
            reference,
            name,
            description,
            transport,
            url,
            command,
            args,
        } => {
            let mut patch = McpPatch::new();
            if let Some(name) = name {
                patch = patch.name(name);
            }
            if let Some(description) = description {
                patch = patch.description(description);
            }
            if let Some(transport) = transport {
                let (transport, config) = connection(transport, url, command, args);
                patch = patch.transport(transport, config);
            }
            renderer.item(&mcps.update(reference, &patch).await?);
        }
        McpCommand::Delete(r) => {
            mcps.delete(r.reference.as_str()).await?;
            renderer.deleted("mcp", &r.reference);
        }
        McpCommand::Tools(r) => renderer.list(&mcps.remote_tools(r.reference).await?),
    }
    Ok(())
}

async fn models(client: &Client, action: ModelCommand, renderer: &mut Renderer) -> Result<()> {
    let models = client.models();
    match action {
        ModelCommand::List => renderer.list(&models.list().await?),
        ModelCommand::Get(r) => renderer.item(&models.get(&r.reference).await?),
    }
    Ok(())
}

/// Transport plus the config map its flags describe.
fn connection(
    transport: TransportArg,
    url: Option<String>,
    command: Option<String>,
    args: Vec<String>,
) -> (McpTransport, Map<String, Value>) {
    let transport = match transport {
        TransportArg::Http => McpTransport::Http,
        TransportArg::Sse => McpTransport::Sse,
        TransportArg::Stdio => McpTransport::Stdio,
    };
    let mut config = Map::new();
    if let Some(url) = url {
        config.insert("url".into(), Value::from(url));
    }
    if let Some(command) = command {
        config.insert("command".into(), Value::from(command));
    }
    if !args.is_empty() {
        config.insert("args".into(), Value::from(args));
    }
    (transport, config)
}

/// Cancels `token` on Ctrl-C. Abort the handle once the run is over.
fn cancel_on_interrupt(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

fn seconds(raw: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(raw)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| Error::validation(format!("--timeout must be a positive number of seconds, got {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds() {
        assert_eq!(seconds(1.5).unwrap(), Duration::from_millis(1500));
        assert!(seconds(0.0).is_err());
        assert!(seconds(-1.0).is_err());
        assert!(seconds(f64::NAN).is_err());
    }

    #[test]
    fn test_connection_config() {
        let (transport, config) = connection(
            TransportArg::Stdio,
            None,
            Some("uvx".into()),
            vec!["mcp-fs".into(), "/srv".into()],
        );
        assert_eq!(transport, McpTransport::Stdio);
        assert_eq!(config["command"], "uvx");
        assert_eq!(config["args"], serde_json::json!(["mcp-fs", "/srv"]));
        assert!(!config.contains_key("url"));

        let patch = McpPatch::new().transport(transport, config);
        assert!(aip_sdk::ResourcePatch::validate(&patch).is_ok());
    }

    #[tokio::test]
    async fn test_interrupt_listener_stops_when_aborted() {
        let token = CancellationToken::new();
        let listener = cancel_on_interrupt(token.clone());
        listener.abort();
        let joined = listener.await;
        assert!(joined.is_err_and(|e| e.is_cancelled()));
        assert!(!token.is_cancelled());
    }
}
