use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::client::ApiRequest;
use crate::client::transport::FormPart;
use crate::history::{AlternationPolicy, ChatMessage, Role, normalize_with};
use crate::types::ResourceKind;
use crate::{Error, Result};

/// A file sent along with the run input.
#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    Path(PathBuf),
    Bytes {
        filename: String,
        mime: String,
        data: Bytes,
    },
}

impl Attachment {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// In-memory content; the MIME type is guessed from `filename`.
    pub fn bytes(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        let mime = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();
        Self::Bytes {
            filename,
            mime,
            data: data.into(),
        }
    }

    async fn to_part(&self) -> Result<FormPart> {
        match self {
            Self::Path(path) => FormPart::from_path("files", path).await.map_err(|e| match e {
                Error::Io(io) => Error::validation(format!(
                    "attachment '{}' cannot be read: {}",
                    path.display(),
                    io
                )),
                other => other,
            }),
            Self::Bytes {
                filename,
                mime,
                data,
            } => Ok(FormPart::file("files", filename.clone(), mime.clone(), data.clone())),
        }
    }
}

/// Input and history as they go on the wire.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Prepared {
    pub input: String,
    pub history: Vec<ChatMessage>,
}

/// Input of one agent run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub input: String,
    pub history: Vec<ChatMessage>,
    pub attachments: Vec<Attachment>,
    /// Wall-clock budget measured from dispatch. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    pub alternation: AlternationPolicy,
}

impl RunRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    pub fn history(mut self, history: impl IntoIterator<Item = ChatMessage>) -> Self {
        self.history = history.into_iter().collect();
        self
    }

    pub fn turn(mut self, message: ChatMessage) -> Self {
        self.history.push(message);
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn file(self, path: impl Into<PathBuf>) -> Self {
        self.attachment(Attachment::path(path))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cancelling `token` cancels the run. The run itself only ever cancels a child of it.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn alternation(mut self, policy: AlternationPolicy) -> Self {
        self.alternation = policy;
        self
    }

    /// Local checks plus history normalization.
    ///
    /// The input is the next user turn, so the history must not already end
    /// with one. Under [`AlternationPolicy::Relaxed`] a trailing user turn is
    /// folded into the input instead.
    pub(crate) fn prepare(&self) -> Result<Prepared> {
        if self.input.trim().is_empty() {
            return Err(Error::validation("run input must not be empty"));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::validation("run timeout must be greater than zero"));
        }
        let mut history = normalize_with(&self.history, self.alternation)?;
        let mut input = self.input.clone();

        let ends_with_user = history
            .last()
            .is_some_and(|turn| turn.role == Role::User.as_str());
        if ends_with_user {
            match self.alternation {
                AlternationPolicy::Strict => {
                    return Err(Error::validation(format!(
                        "history turn {}: the last turn must be from the assistant, the run input is the next user turn",
                        history.len() - 1
                    )));
                }
                AlternationPolicy::Relaxed => {
                    if let Some(last) = history.pop() {
                        input = format!("{}\n\n{}", last.content, input);
                    }
                }
            }
        }
        Ok(Prepared { input, history })
    }

    /// Streaming run call: JSON when there is nothing to upload, multipart otherwise.
    pub(crate) async fn to_api_request(
        &self,
        agent_id: &str,
        prepared: &Prepared,
    ) -> Result<ApiRequest> {
        let path = format!("{}/run", ResourceKind::Agent.item_path(agent_id));
        let history = &prepared.history;

        if self.attachments.is_empty() {
            return Ok(ApiRequest::post(path).json(json!({
                "input": prepared.input,
                "chat_history": history,
                "stream": true,
            })));
        }

        let mut parts = vec![
            FormPart::text("input", prepared.input.clone()),
            FormPart::text("chat_history", serde_json::to_string(history)?),
            FormPart::text("stream", "true"),
        ];
        for attachment in &self.attachments {
            parts.push(attachment.to_part().await?);
        }
        Ok(ApiRequest::post(path).multipart(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RequestBody;

    #[test]
    fn test_prepare_rejects_blank_input() {
        assert!(matches!(
            RunRequest::new("   ").prepare(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            RunRequest::new("hi").timeout(Duration::ZERO).prepare(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_prepare_normalizes_history() {
        let prepared = RunRequest::new("and 3+3?")
            .turn(ChatMessage::new("Human", "2+2?"))
            .turn(ChatMessage::new("AI", "4"))
            .prepare()
            .unwrap();
        assert_eq!(
            prepared.history,
            vec![ChatMessage::user("2+2?"), ChatMessage::assistant("4")]
        );
        assert_eq!(prepared.input, "and 3+3?");

        let err = RunRequest::new("x")
            .turn(ChatMessage::assistant("first"))
            .prepare()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_strict_rejects_history_ending_with_user() {
        let err = RunRequest::new("second question")
            .turn(ChatMessage::user("first question"))
            .prepare()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(m) if m.contains("turn 0")));

        let with_system = RunRequest::new("next")
            .turn(ChatMessage::system("Be brief."))
            .turn(ChatMessage::user("hi"))
            .turn(ChatMessage::assistant("hello"))
            .turn(ChatMessage::user("still there?"))
            .prepare();
        assert!(matches!(with_system, Err(Error::Validation(_))));

        let system_only = RunRequest::new("hi")
            .turn(ChatMessage::system("Be brief."))
            .prepare()
            .unwrap();
        assert_eq!(system_only.history.len(), 1);
    }

    #[test]
    fn test_relaxed_folds_trailing_user_into_input() {
        let prepared = RunRequest::new("second question")
            .turn(ChatMessage::user("first question"))
            .alternation(AlternationPolicy::Relaxed)
            .prepare()
            .unwrap();
        assert!(prepared.history.is_empty());
        assert_eq!(prepared.input, "first question\n\nsecond question");
    }

    fn bare(input: &str) -> Prepared {
        Prepared {
            input: input.to_string(),
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_json_request() {
        let request = RunRequest::new("2+2");
        let prepared = Prepared {
            input: "2+2".into(),
            history: vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
        };
        let api = request.to_api_request("a1", &prepared).await.unwrap();
        assert_eq!(api.target(), "agents/a1/run");
        match api.body {
            RequestBody::Json(body) => {
                assert_eq!(body["input"], "2+2");
                assert_eq!(body["stream"], true);
                assert_eq!(body["chat_history"][1]["role"], "assistant");
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multipart_request() {
        let request = RunRequest::new("summarize")
            .attachment(Attachment::bytes("notes.txt", &b"hello"[..]));
        let api = request.to_api_request("a1", &bare("summarize")).await.unwrap();
        match api.body {
            RequestBody::Multipart(parts) => {
                let names: Vec<&str> = parts.iter().map(FormPart::name).collect();
                assert_eq!(names, vec!["input", "chat_history", "stream", "files"]);
                assert!(matches!(
                    &parts[3],
                    FormPart::File { filename, mime, .. } if filename == "notes.txt" && mime == "text/plain"
                ));
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_attachment_is_validation() {
        let request = RunRequest::new("x").file("/definitely/not/here.pdf");
        assert!(matches!(
            request.to_api_request("a1", &bare("x")).await,
            Err(Error::Validation(_))
        ));
    }
}
