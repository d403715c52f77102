//! Request/response exchange with the platform.
//!
//! [`Transport`] is the seam between resource logic and the network: the
//! registry and the run engine only ever see [`ApiRequest`] values going out
//! and JSON values (or chunk payloads) coming back.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::Value;
use url::form_urlencoded;

use super::error::{ErrorResponse, unwrap_envelope};
use super::framing::FramedStream;
use super::resilience::Retry;
use crate::config::ClientConfig;
use crate::{Error, Result};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Chunk payloads of a streaming response, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Clone)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        mime: String,
        data: Bytes,
    },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        mime: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self::File {
            name: name.into(),
            filename: filename.into(),
            mime: mime.into(),
            data: data.into(),
        }
    }

    /// Reads `path` and guesses its MIME type from the extension.
    pub async fn from_path(name: impl Into<String>, path: &std::path::Path) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .unwrap_or_else(|| "file".to_string());
        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        Ok(Self::file(name, filename, mime, data))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::File { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    /// Kept as parts so the form can be rebuilt for every attempt.
    Multipart(Vec<FormPart>),
}

/// A single platform call, independent of the HTTP client that sends it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn is_idempotent(&self) -> bool {
        self.method == Method::GET
    }

    /// Path plus encoded query string.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let encoded: String = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();
        format!("{}?{}", self.path, encoded)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request and returns the unwrapped response payload.
    ///
    /// An empty success body comes back as `Value::Null`.
    async fn send(&self, request: ApiRequest) -> Result<Value>;

    /// Opens a streaming response and frames it into chunk payloads.
    async fn stream(&self, request: ApiRequest) -> Result<ChunkStream>;
}

/// [`Transport`] over HTTPS using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut key = HeaderValue::from_str(config.api_key.expose_secret())
            .map_err(|_| Error::Config("API key contains invalid header characters".into()))?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn build_request(&self, request: &ApiRequest, request_id: &str) -> Result<reqwest::RequestBuilder> {
        let url = self.config.endpoint(&request.target());
        let builder = self
            .http
            .request(request.method.clone(), url)
            .header(REQUEST_ID_HEADER, request_id);

        Ok(match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        })
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        request_id: &str,
        streaming: bool,
    ) -> Result<reqwest::Response> {
        let mut builder = self.build_request(request, request_id)?;
        if !streaming {
            builder = builder.timeout(self.config.timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            request_id,
            status = status.as_u16(),
            "response received"
        );

        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ErrorResponse::into_error(status.as_u16(), &body))
    }

    async fn with_retry<T, F, Fut>(&self, request: &ApiRequest, retry_safe: bool, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let label = format!("{} {}", request.method, request.path);
        if retry_safe {
            Retry::new(&self.config.retry).execute(&label, op).await
        } else {
            let mut op = op;
            op(1).await
        }
    }
}

fn build_form(parts: &[FormPart]) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
            FormPart::File {
                name,
                filename,
                mime,
                data,
            } => {
                let file = reqwest::multipart::Part::bytes(data.to_vec())
                    .file_name(filename.clone())
                    .mime_str(mime)
                    .map_err(|e| Error::validation(format!("invalid MIME type '{}': {}", mime, e)))?;
                form.part(name.clone(), file)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value> {
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            request_id = %request_id,
            "sending request"
        );

        let (req, id) = (&request, request_id.as_str());
        self.with_retry(req, req.is_idempotent(), |_| async move {
            let response = self.execute(req, id, false).await?;
            let status = response.status().as_u16();
            let text = response.text().await?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            let value: Value = serde_json::from_str(&text)?;
            unwrap_envelope(status, value)
        })
        .await
    }

    async fn stream(&self, request: ApiRequest) -> Result<ChunkStream> {
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            request_id = %request_id,
            "opening stream"
        );

        let (req, id) = (&request, request_id.as_str());
        let response = self
            .with_retry(req, true, |_| self.execute(req, id, true))
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let framer = self.config.framing.framer(content_type.as_deref());
        Ok(Box::pin(FramedStream::new(response.bytes_stream(), framer)))
    }
}
