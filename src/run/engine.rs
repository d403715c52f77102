use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt, stream};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{RunRequest, RunResult, RunState};
use crate::client::transport::ChunkStream;
use crate::client::{ApiRequest, Transport};
use crate::types::{ErrorEventKind, RunEvent};
use crate::{Error, Result};

enum Phase {
    Dispatch(ApiRequest),
    Streaming(ChunkStream),
    Done,
}

enum Wait<T> {
    Ready(T),
    Cancelled,
    TimedOut,
}

/// A single agent run, observed one event at a time.
///
/// Nothing is sent until the first [`next_event`](Run::next_event). Events are
/// yielded in arrival order; once a terminal state is reached no further event
/// is produced. Dropping a run mid-stream closes the connection.
pub struct Run {
    transport: Arc<dyn Transport>,
    agent_id: String,
    phase: Phase,
    state: RunState,
    events: Vec<RunEvent>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    started: Option<Instant>,
    cancel: CancellationToken,
    failure: Option<Error>,
}

impl Run {
    /// Validates the request and prepares the call; invalid input fails here.
    pub async fn start(
        transport: Arc<dyn Transport>,
        agent_id: impl Into<String>,
        request: RunRequest,
    ) -> Result<Self> {
        let agent_id = agent_id.into();
        let prepared = request.prepare()?;
        let api_request = request.to_api_request(&agent_id, &prepared).await?;
        let cancel = request
            .cancel
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default();

        Ok(Self {
            transport,
            agent_id,
            phase: Phase::Dispatch(api_request),
            state: RunState::Idle,
            events: Vec::new(),
            timeout: request.timeout,
            deadline: None,
            started: None,
            cancel,
            failure: None,
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Events observed so far.
    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    /// Token that cancels this run only.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Time since dispatch.
    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Next event, or `None` once the run is terminal.
    ///
    /// Undecodable chunks surface as [`ErrorEventKind::Decode`] events and the
    /// run continues. Cancellation and timeout end the run without an event.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Dispatch(request) => {
                    let now = Instant::now();
                    self.started = Some(now);
                    self.deadline = self.timeout.map(|t| now + t);
                    self.state = RunState::Dispatched;
                    tracing::debug!(agent_id = %self.agent_id, "dispatching run");

                    let opened =
                        wait(&self.cancel, self.deadline, self.transport.stream(request)).await;
                    match opened {
                        Wait::Ready(Ok(stream)) => self.phase = Phase::Streaming(stream),
                        Wait::Ready(Err(e)) => return Some(self.fail(e)),
                        Wait::Cancelled => return self.abort(Error::Cancelled),
                        Wait::TimedOut => return self.abort(self.timeout_error()),
                    }
                }
                Phase::Streaming(mut stream) => {
                    let polled = wait(&self.cancel, self.deadline, stream.next()).await;
                    match polled {
                        Wait::Ready(Some(chunk)) => {
                            if self.state == RunState::Dispatched {
                                self.state = RunState::Streaming;
                            }
                            let event = match chunk {
                                Ok(raw) => RunEvent::decode(&raw),
                                Err(Error::Decode(message)) => {
                                    RunEvent::error(ErrorEventKind::Decode, message)
                                }
                                Err(e) => return Some(self.fail(e)),
                            };
                            self.events.push(event.clone());

                            match &event {
                                RunEvent::FinalResult { .. } => {
                                    self.settle(RunState::Completed, None)
                                }
                                RunEvent::Error {
                                    kind: ErrorEventKind::Backend,
                                    message,
                                    code,
                                } => {
                                    let cause = Error::Backend {
                                        status: None,
                                        code: code.clone(),
                                        message: message.clone(),
                                    };
                                    self.settle(RunState::Failed, Some(cause));
                                }
                                RunEvent::Error {
                                    kind: ErrorEventKind::Transport,
                                    message,
                                    ..
                                } => {
                                    let cause = Error::Disconnected(message.clone());
                                    self.settle(RunState::Failed, Some(cause));
                                }
                                _ => self.phase = Phase::Streaming(stream),
                            }
                            return Some(event);
                        }
                        Wait::Ready(None) => {
                            return Some(self.fail(Error::Disconnected(
                                "stream ended before a final result".into(),
                            )));
                        }
                        Wait::Cancelled => return self.abort(Error::Cancelled),
                        Wait::TimedOut => return self.abort(self.timeout_error()),
                    }
                }
                Phase::Done => return None,
            }
        }
    }

    /// Adapts the run into a [`Stream`] of events.
    pub fn events_stream(&mut self) -> impl Stream<Item = RunEvent> + Send + '_ {
        stream::unfold(self, |run| async move {
            run.next_event().await.map(|event| (event, run))
        })
    }

    /// Drains remaining events and returns the accumulated result.
    ///
    /// A failed or cancelled run yields [`Error::RunAborted`] carrying every
    /// event observed before it stopped.
    pub async fn finish(mut self) -> Result<RunResult> {
        while self.next_event().await.is_some() {}

        let result = RunResult::from_events(
            self.state,
            std::mem::take(&mut self.events),
            self.elapsed(),
        );
        match (self.state, self.failure.take()) {
            (RunState::Completed, None) => Ok(result),
            (_, cause) => Err(Error::RunAborted {
                cause: Box::new(
                    cause.unwrap_or_else(|| Error::Disconnected("run ended without a result".into())),
                ),
                partial: Box::new(result),
            }),
        }
    }

    /// Records a synthesized error event for `cause` and fails the run.
    fn fail(&mut self, cause: Error) -> RunEvent {
        let kind = match cause {
            Error::Transport(_) | Error::Disconnected(_) | Error::Io(_) => {
                ErrorEventKind::Transport
            }
            _ => ErrorEventKind::Backend,
        };
        let event = RunEvent::Error {
            kind,
            message: cause.to_string(),
            code: cause.code().map(String::from),
        };
        self.events.push(event.clone());
        self.settle(RunState::Failed, Some(cause));
        event
    }

    fn abort(&mut self, cause: Error) -> Option<RunEvent> {
        self.settle(RunState::Cancelled, Some(cause));
        None
    }

    fn timeout_error(&self) -> Error {
        Error::Timeout(self.timeout.unwrap_or_default())
    }

    fn settle(&mut self, state: RunState, cause: Option<Error>) {
        debug_assert!(self.state.can_transition_to(state));
        self.state = state;
        self.phase = Phase::Done;
        let elapsed_ms = self.elapsed().as_millis() as u64;

        match &cause {
            None => tracing::info!(
                agent_id = %self.agent_id,
                state = %state,
                events = self.events.len(),
                elapsed_ms,
                "run finished"
            ),
            Some(e) => tracing::warn!(
                agent_id = %self.agent_id,
                state = %state,
                events = self.events.len(),
                elapsed_ms,
                error = %e,
                "run stopped"
            ),
        }
        self.failure = cause;
    }
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("agent_id", &self.agent_id)
            .field("state", &self.state)
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}

/// Races `fut` against cancellation and the deadline. Cancellation wins ties.
async fn wait<F: std::future::Future>(
    cancel: &CancellationToken,
    deadline: Option<Instant>,
    fut: F,
) -> Wait<F::Output> {
    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Wait::Cancelled,
        _ = expired => Wait::TimedOut,
        out = fut => Wait::Ready(out),
    }
}
