use std::io::{self, Write};

use aip_sdk::{
    Agent, Error, ErrorEventKind, InvocationStatus, LanguageModel, Mcp, RemoteTool, RunEvent,
    RunResult, Tool,
};
use crossterm::style::Stylize;
use serde::Serialize;
use serde_json::{Value, json};

use crate::args::View;

/// Field rows shown for one item in rich and plain views.
pub trait Summary: Serialize {
    fn title(&self) -> String;
    fn rows(&self) -> Vec<(&'static str, String)>;
}

impl Summary for Agent {
    fn title(&self) -> String {
        format!("{} ({})", self.name, self.id)
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![("instructions", self.instructions.clone())];
        if let Some(description) = &self.description {
            rows.push(("description", description.clone()));
        }
        if let Some(model) = self.model_config.as_ref().and_then(|m| m.lm_name.clone()) {
            rows.push(("model", model));
        }
        if !self.tools.is_empty() {
            rows.push(("tools", self.tools.join(", ")));
        }
        if !self.sub_agents.is_empty() {
            rows.push(("agents", self.sub_agents.join(", ")));
        }
        if !self.mcps.is_empty() {
            rows.push(("mcps", self.mcps.join(", ")));
        }
        rows
    }
}

impl Summary for Tool {
    fn title(&self) -> String {
        format!("{} ({})", self.name, self.id)
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![("kind", format!("{:?}", self.kind).to_lowercase())];
        if let Some(framework) = &self.framework {
            rows.push(("framework", framework.clone()));
        }
        if let Some(description) = &self.description {
            rows.push(("description", description.clone()));
        }
        rows
    }
}

impl Summary for Mcp {
    fn title(&self) -> String {
        format!("{} ({})", self.name, self.id)
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![("transport", format!("{:?}", self.transport).to_lowercase())];
        for key in ["url", "command"] {
            if let Some(value) = self.config.get(key).and_then(Value::as_str) {
                rows.push((key, value.to_string()));
            }
        }
        if let Some(description) = &self.description {
            rows.push(("description", description.clone()));
        }
        rows
    }
}

impl Summary for RemoteTool {
    fn title(&self) -> String {
        self.name.clone()
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        self.description
            .iter()
            .map(|d| ("description", d.clone()))
            .collect()
    }
}

impl Summary for LanguageModel {
    fn title(&self) -> String {
        match &self.provider {
            Some(provider) => format!("{}/{}", provider, self.name),
            None => self.name.clone(),
        }
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = Vec::new();
        if let Some(id) = &self.id {
            rows.push(("id", id.clone()));
        }
        if let Some(description) = &self.description {
            rows.push(("description", description.clone()));
        }
        if !self.capabilities.is_empty() {
            rows.push(("capabilities", self.capabilities.join(", ")));
        }
        if let Some(max_tokens) = self.max_tokens {
            rows.push(("max tokens", max_tokens.to_string()));
        }
        rows.push(("streaming", self.supports_streaming.to_string()));
        rows
    }
}

pub struct Renderer {
    view: View,
    streamed_text: bool,
}

impl Renderer {
    pub fn new(view: View) -> Self {
        Self {
            view,
            streamed_text: false,
        }
    }

    pub fn item<T: Summary>(&self, item: &T) {
        match self.view {
            View::Json => self.json(item),
            View::Plain | View::Rich => {
                self.title(&item.title());
                for (key, value) in item.rows() {
                    self.row(key, &value);
                }
            }
        }
    }

    pub fn list<T: Summary>(&self, items: &[T]) {
        match self.view {
            View::Json => self.json(&items),
            View::Plain => {
                for item in items {
                    println!("{}", item.title());
                }
            }
            View::Rich => {
                if items.is_empty() {
                    println!("{}", "(none)".dim());
                }
                for item in items {
                    self.title(&item.title());
                }
            }
        }
    }

    pub fn deleted(&self, kind: &str, reference: &str) {
        match self.view {
            View::Json => self.json(&json!({"deleted": true, "kind": kind, "reference": reference})),
            View::Plain => println!("deleted {} {}", kind, reference),
            View::Rich => println!("{} {} {}", "deleted".green(), kind, reference.bold()),
        }
    }

    pub fn text(&self, text: &str) {
        match self.view {
            View::Json => self.json(&json!({"text": text})),
            View::Plain | View::Rich => println!("{}", text),
        }
    }

    /// Renders one event as it arrives.
    pub fn event(&mut self, event: &RunEvent) {
        if self.view == View::Json {
            self.json(event);
            return;
        }
        let rich = self.view == View::Rich;
        match event {
            RunEvent::TokenChunk { text } => {
                self.streamed_text = true;
                print!("{}", text);
                let _ = io::stdout().flush();
            }
            RunEvent::ToolInvocation {
                tool_name,
                args,
                elapsed_ms,
                status,
                ..
            } => self.invocation("tool", tool_name, Some(args), *elapsed_ms, *status, rich),
            RunEvent::DelegationInvocation {
                target_agent,
                elapsed_ms,
                status,
                ..
            } => self.invocation("agent", target_agent, None, *elapsed_ms, *status, rich),
            RunEvent::FinalResult { text, .. } => {
                if self.streamed_text {
                    println!();
                } else {
                    println!("{}", text);
                }
            }
            RunEvent::Error { kind, message, .. } => {
                let label = match kind {
                    ErrorEventKind::Decode => "[decode]",
                    ErrorEventKind::Transport => "[transport]",
                    ErrorEventKind::Backend => "[backend]",
                };
                if rich {
                    eprintln!("{} {}", label.red(), message);
                } else {
                    eprintln!("{} {}", label, message);
                }
            }
        }
    }

    pub fn run_summary(&self, result: &RunResult) {
        if self.view != View::Rich {
            return;
        }
        let line = format!(
            "{} in {:.1}s, {} invocation(s)",
            result.state,
            result.elapsed.as_secs_f64(),
            result.invocations.len()
        );
        eprintln!("{}", line.dim());
    }

    /// One line by default; the full structured error under `--view json`.
    pub fn error(&self, error: &Error) {
        match self.view {
            View::Json => {
                let mut body = json!({
                    "kind": error.kind(),
                    "message": error.to_string(),
                });
                if let Some(status) = error.status_code() {
                    body["status"] = json!(status);
                }
                if let Some(code) = error.code() {
                    body["code"] = json!(code);
                }
                if let Some(partial) = error.partial_run() {
                    body["partial"] = serde_json::to_value(partial).unwrap_or(Value::Null);
                }
                eprintln!("{}", json!({ "error": body }));
            }
            View::Plain => eprintln!("error: {}", error),
            View::Rich => eprintln!("{} {}", "error:".red().bold(), error),
        }
    }

    fn invocation(
        &self,
        label: &str,
        name: &str,
        args: Option<&Value>,
        elapsed_ms: u64,
        status: InvocationStatus,
        rich: bool,
    ) {
        let args = args
            .filter(|a| !a.is_null())
            .map(|a| a.to_string())
            .unwrap_or_default();
        let status = format!("{:?}", status).to_lowercase();
        if self.streamed_text {
            println!();
        }
        if rich {
            println!(
                "{} {}{} {}",
                format!("[{}]", label).cyan(),
                name.bold(),
                format!("({})", args).dim(),
                format!("{} {}ms", status, elapsed_ms).dim()
            );
        } else {
            println!("[{}] {}({}) {} {}ms", label, name, args, status, elapsed_ms);
        }
    }

    fn title(&self, title: &str) {
        match self.view {
            View::Rich => println!("{}", title.bold()),
            _ => println!("{}", title),
        }
    }

    fn row(&self, key: &str, value: &str) {
        match self.view {
            View::Rich => println!("  {} {}", format!("{}:", key).dim(), value),
            _ => println!("  {}: {}", key, value),
        }
    }

    fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string(value) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("error: {}", e),
        }
    }
}
