use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::Value;

use super::RunState;
use crate::types::{ErrorEventKind, InvocationStatus, RunEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    Tool,
    Delegation,
}

/// A tool call or sub-agent delegation reported during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    pub kind: InvocationKind,
    /// Tool name or target agent.
    pub name: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub args: Value,
    pub elapsed_ms: u64,
    pub status: InvocationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl Invocation {
    fn from_event(event: &RunEvent) -> Option<Self> {
        match event {
            RunEvent::ToolInvocation {
                tool_name,
                args,
                elapsed_ms,
                status,
                output,
            } => Some(Self {
                kind: InvocationKind::Tool,
                name: tool_name.clone(),
                args: args.clone(),
                elapsed_ms: *elapsed_ms,
                status: *status,
                output: output.clone(),
            }),
            RunEvent::DelegationInvocation {
                target_agent,
                elapsed_ms,
                status,
                output,
            } => Some(Self {
                kind: InvocationKind::Delegation,
                name: target_agent.clone(),
                args: Value::Null,
                elapsed_ms: *elapsed_ms,
                status: *status,
                output: output.clone(),
            }),
            _ => None,
        }
    }
}

/// Everything a run produced, folded from its event sequence.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub state: RunState,
    /// Final answer; the streamed transcript when no final result arrived.
    pub text: String,
    /// Concatenated token chunks.
    pub transcript: String,
    /// Tool calls and delegations in emission order.
    pub invocations: Vec<Invocation>,
    pub metadata: Value,
    pub events: Vec<RunEvent>,
    #[serde(rename = "elapsed_ms", serialize_with = "duration_millis")]
    pub elapsed: Duration,
}

impl RunResult {
    pub(crate) fn from_events(state: RunState, events: Vec<RunEvent>, elapsed: Duration) -> Self {
        let mut transcript = String::new();
        let mut invocations = Vec::new();
        let mut final_text = None;
        let mut metadata = Value::Null;

        for event in &events {
            match event {
                RunEvent::TokenChunk { text } => transcript.push_str(text),
                RunEvent::FinalResult { text, metadata: m } => {
                    final_text = Some(text.clone());
                    metadata = m.clone();
                }
                other => invocations.extend(Invocation::from_event(other)),
            }
        }

        Self {
            state,
            text: final_text.unwrap_or_else(|| transcript.clone()),
            transcript,
            invocations,
            metadata,
            events,
            elapsed,
        }
    }

    /// Result of a run that stopped short of completion.
    pub fn partial(state: RunState, events: Vec<RunEvent>, elapsed: Duration) -> Self {
        Self::from_events(state, events, elapsed)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Chunks that could not be decoded.
    #[must_use]
    pub fn decode_errors(&self) -> usize {
        self.events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    RunEvent::Error {
                        kind: ErrorEventKind::Decode,
                        ..
                    }
                )
            })
            .count()
    }

    #[must_use]
    pub fn tool_calls(&self) -> impl Iterator<Item = &Invocation> {
        self.invocations
            .iter()
            .filter(|i| i.kind == InvocationKind::Tool)
    }
}

fn duration_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<RunEvent> {
        vec![
            RunEvent::TokenChunk { text: "Let me ".into() },
            RunEvent::ToolInvocation {
                tool_name: "calc".into(),
                args: json!({"expr": "2+2"}),
                elapsed_ms: 5,
                status: InvocationStatus::Finished,
                output: Some(json!(4)),
            },
            RunEvent::error(ErrorEventKind::Decode, "garbled"),
            RunEvent::DelegationInvocation {
                target_agent: "checker".into(),
                elapsed_ms: 40,
                status: InvocationStatus::Finished,
                output: None,
            },
            RunEvent::TokenChunk { text: "check.".into() },
            RunEvent::FinalResult {
                text: "4".into(),
                metadata: json!({"tokens": 12}),
            },
        ]
    }

    #[test]
    fn test_folds_events() {
        let result = RunResult::from_events(RunState::Completed, sample(), Duration::from_millis(80));
        assert!(result.is_completed());
        assert_eq!(result.text(), "4");
        assert_eq!(result.transcript, "Let me check.");
        assert_eq!(result.invocations.len(), 2);
        assert_eq!(result.invocations[0].name, "calc");
        assert_eq!(result.invocations[1].kind, InvocationKind::Delegation);
        assert_eq!(result.tool_calls().count(), 1);
        assert_eq!(result.decode_errors(), 1);
        assert_eq!(result.metadata["tokens"], 12);
    }

    #[test]
    fn test_partial_falls_back_to_transcript() {
        let mut events = sample();
        events.truncate(2);
        let result = RunResult::partial(RunState::Cancelled, events, Duration::from_secs(1));
        assert_eq!(result.text(), "Let me ");
        assert!(!result.is_completed());
    }

    #[test]
    fn test_serializes_elapsed_as_millis() {
        let result = RunResult::partial(RunState::Failed, Vec::new(), Duration::from_millis(1500));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["elapsed_ms"], 1500);
        assert_eq!(value["state"], "failed");
    }
}
