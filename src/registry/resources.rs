use std::marker::PhantomData;

use futures::Stream;
use serde_json::Value;

use super::{ListFilter, Registry, decode, items_of};
use crate::client::ApiRequest;
use crate::run::{Run, RunRequest};
use crate::types::{Agent, Mcp, RemoteTool, Resource, ResourceRef, Tool, ToolSource};
use crate::{Error, Result};

/// Operations on one resource kind, borrowed from a [`Registry`].
pub struct Resources<'a, R> {
    registry: &'a Registry,
    _kind: PhantomData<fn() -> R>,
}

impl<'a, R: Resource> Resources<'a, R> {
    pub(crate) fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            _kind: PhantomData,
        }
    }

    pub async fn create(&self, spec: &R::Spec) -> Result<R> {
        self.registry.create::<R>(spec).await
    }

    pub async fn get(&self, reference: impl Into<ResourceRef>) -> Result<R> {
        self.registry.get(&reference.into()).await
    }

    pub fn list(&self, filter: ListFilter) -> impl Stream<Item = Result<R>> + Send + 'a {
        self.registry.list(filter)
    }

    pub async fn list_all(&self) -> Result<Vec<R>> {
        self.registry.list_all(ListFilter::new()).await
    }

    pub async fn find(&self, fragment: &str) -> Result<Vec<R>> {
        self.registry.find(fragment).await
    }

    pub async fn update(&self, reference: impl Into<ResourceRef>, patch: &R::Patch) -> Result<R> {
        self.registry.update::<R>(&reference.into(), patch).await
    }

    pub async fn delete(&self, reference: impl Into<ResourceRef>) -> Result<()> {
        self.registry.delete(R::KIND, &reference.into()).await
    }

    pub async fn resolve(&self, reference: impl Into<ResourceRef>) -> Result<String> {
        self.registry.resolve_id(R::KIND, &reference.into()).await
    }
}

impl Resources<'_, Agent> {
    /// Starts a streaming run. The request is sent on the first `next_event`.
    pub async fn run(&self, reference: impl Into<ResourceRef>, request: RunRequest) -> Result<Run> {
        let id = self.resolve(reference).await?;
        Run::start(self.registry.transport().clone(), id, request).await
    }
}

impl Resources<'_, Tool> {
    /// Source code of a custom tool.
    pub async fn script(&self, reference: impl Into<ResourceRef>) -> Result<String> {
        let id = self.resolve(reference).await?;
        let value = self
            .registry
            .transport()
            .send(ApiRequest::get(format!("{}/script", Tool::KIND.item_path(&id))))
            .await?;
        match value {
            Value::String(script) => Ok(script),
            Value::Object(obj) => ["script", "content", "code"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str).map(String::from))
                .ok_or_else(|| Error::Decode("tool script response has no script field".into())),
            other => Err(Error::Decode(format!(
                "unexpected tool script response: {}",
                other
            ))),
        }
    }

    /// Replaces the plugin source of an existing custom tool.
    pub async fn upload_source(
        &self,
        reference: impl Into<ResourceRef>,
        source: &ToolSource,
    ) -> Result<Tool> {
        let id = self.resolve(reference).await?;
        let current: Tool = self.registry.fetch(&id).await?;
        let part = source.to_part(&current.name).await?;
        let value = self
            .registry
            .transport()
            .send(
                ApiRequest::put(format!("{}/upload", Tool::KIND.item_path(&id)))
                    .multipart(vec![part]),
            )
            .await?;
        if value.is_null() {
            return self.registry.fetch(&id).await;
        }
        decode(value)
    }
}

impl Resources<'_, Mcp> {
    /// Tools the MCP server currently exposes.
    pub async fn remote_tools(&self, reference: impl Into<ResourceRef>) -> Result<Vec<RemoteTool>> {
        let id = self.resolve(reference).await?;
        let value = self
            .registry
            .transport()
            .send(ApiRequest::get(format!("{}/tools", Mcp::KIND.item_path(&id))))
            .await?;
        items_of(value).into_iter().map(decode).collect()
    }
}
