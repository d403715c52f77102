//! Platform client: transport, framing, retry, and the resource entry points.

mod error;
pub mod framing;
pub mod resilience;
pub mod transport;

pub use framing::{ChunkFramer, FramedStream, NdjsonFramer, SseFramer, StreamFraming};
pub use resilience::{ExponentialBackoff, Retry, RetryConfig};
pub use transport::{ApiRequest, ChunkStream, FormPart, HttpTransport, RequestBody, Transport};

use std::sync::Arc;
use std::time::Duration;

use crate::cleanup::ResourceDeleter;
use crate::config::{ClientConfig, EnvSource};
use crate::registry::{Models, Registry, Resources};
use crate::types::{Agent, Mcp, Tool};
use crate::Result;

/// Entry point to the platform.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone)]
pub struct Client {
    registry: Registry,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new(config)?))
    }

    /// Configuration from `AIP_API_URL` / `AIP_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self::from_shared(Arc::new(transport))
    }

    pub fn from_shared(transport: Arc<dyn Transport>) -> Self {
        Self {
            registry: Registry::new(transport),
        }
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn agents(&self) -> Resources<'_, Agent> {
        self.registry.agents()
    }

    pub fn tools(&self) -> Resources<'_, Tool> {
        self.registry.tools()
    }

    pub fn mcps(&self) -> Resources<'_, Mcp> {
        self.registry.mcps()
    }

    /// Language models the platform can run agents on.
    pub fn models(&self) -> Models<'_> {
        self.registry.models()
    }

    /// Deleter for a [`ResourceManager`](crate::ResourceManager) bound to this client.
    pub fn deleter(&self) -> Arc<dyn ResourceDeleter> {
        Arc::new(self.registry.clone())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

/// Builder for [`Client`]. URL and key fall back to the environment when unset.
#[derive(Default)]
pub struct ClientBuilder {
    api_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    retry: Option<RetryConfig>,
    framing: Option<StreamFraming>,
    user_agent: Option<String>,
}

impl ClientBuilder {
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn framing(mut self, framing: StreamFraming) -> Self {
        self.framing = Some(framing);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn into_config(self) -> Result<ClientConfig> {
        let env = EnvSource::new();
        let url = match self.api_url {
            Some(url) => url,
            None => env.require("api.url")?,
        };
        let key = match self.api_key {
            Some(key) => key,
            None => env.require("api.key")?,
        };

        let mut config = ClientConfig::new(&url, key)?;
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        } else if let Some(secs) = env.parse::<f64>("timeout")?
            && secs.is_finite()
            && secs > 0.0
        {
            config.timeout = Duration::from_secs_f64(secs);
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout = timeout;
        }
        if let Some(retry) = self.retry {
            config.retry = retry;
        }
        if let Some(framing) = self.framing {
            config.framing = framing;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        Ok(config)
    }

    pub fn build(self) -> Result<Client> {
        Client::new(self.into_config()?)
    }
}
