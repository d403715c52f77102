//! Typed CRUD over agents, tools and MCP servers.
//!
//! Every call is answered by the server. Names are resolved to ids inside the
//! operation that needs them and forgotten afterwards, so a name reassigned
//! on the server is picked up by the very next call.

mod models;
mod resources;

pub use models::Models;
pub use resources::Resources;

use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt, stream};
use serde_json::Value;

use crate::cleanup::ResourceDeleter;
use crate::client::{ApiRequest, Transport};
use crate::types::{Agent, Mcp, Resource, ResourceKind, ResourceRef, ResourceSpec, Tool};
use crate::types::ResourcePatch;
use crate::{Error, Result};

/// Query parameters for `list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub name: Option<String>,
    /// Kind-specific filters passed through verbatim (e.g. `tool_type`).
    pub params: Vec<(String, String)>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    fn to_request(&self, kind: ResourceKind) -> ApiRequest {
        let mut request = ApiRequest::get(kind.path());
        if let Some(name) = &self.name {
            request = request.query("name", name.clone());
        }
        for (key, value) in &self.params {
            request = request.query(key.clone(), value.clone());
        }
        request
    }
}

#[derive(Clone)]
pub struct Registry {
    transport: Arc<dyn Transport>,
}

impl Registry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn agents(&self) -> Resources<'_, Agent> {
        Resources::new(self)
    }

    pub fn tools(&self) -> Resources<'_, Tool> {
        Resources::new(self)
    }

    pub fn mcps(&self) -> Resources<'_, Mcp> {
        Resources::new(self)
    }

    pub fn models(&self) -> Models<'_> {
        Models::new(self)
    }

    /// Validates locally, then creates. Invalid specs never reach the network.
    pub async fn create<R: Resource>(&self, spec: &R::Spec) -> Result<R> {
        spec.validate()?;
        let request = spec.to_request(self).await?;
        let value = self.transport.send(request).await?;
        let created: R = decode(value)?;
        tracing::debug!(kind = %R::KIND, id = created.id(), "resource created");
        Ok(created)
    }

    pub async fn get<R: Resource>(&self, reference: &ResourceRef) -> Result<R> {
        let id = self.resolve_id(R::KIND, reference).await?;
        self.fetch(&id).await
    }

    /// Lazy sequence of resources; nothing is requested until first polled.
    pub fn list<R: Resource>(
        &self,
        filter: ListFilter,
    ) -> impl Stream<Item = Result<R>> + Send + '_ {
        let request = filter.to_request(R::KIND);
        stream::once(async move { self.list_values(request).await })
            .map(|page| match page {
                Ok(items) => stream::iter(items.into_iter().map(decode::<R>)).left_stream(),
                Err(e) => stream::iter(vec![Err(e)]).right_stream(),
            })
            .flatten()
    }

    pub async fn list_all<R: Resource>(&self, filter: ListFilter) -> Result<Vec<R>> {
        self.list(filter).try_collect().await
    }

    /// Resources whose name contains `fragment`, case-insensitively.
    pub async fn find<R: Resource>(&self, fragment: &str) -> Result<Vec<R>> {
        let needle = fragment.trim().to_lowercase();
        let mut filter = ListFilter::new();
        if !needle.is_empty() {
            filter = filter.name(fragment.trim());
        }
        let all: Vec<R> = self.list_all(filter).await?;
        Ok(all
            .into_iter()
            .filter(|r| r.name().to_lowercase().contains(&needle))
            .collect())
    }

    /// Fetches the current representation, overlays `patch`, and writes it back.
    pub async fn update<R: Resource>(&self, reference: &ResourceRef, patch: &R::Patch) -> Result<R> {
        patch.validate()?;
        let id = self.resolve_id(R::KIND, reference).await?;
        let overlay = patch.to_json(self).await?;

        let current: R = self.fetch(&id).await?;
        let mut body = current.update_body();
        patch.apply_to(&mut body, overlay);

        let value = self
            .transport
            .send(ApiRequest::put(R::KIND.item_path(&id)).json(body))
            .await?;
        if value.is_null() {
            return self.fetch(&id).await;
        }
        decode(value)
    }

    /// A missing resource yields [`Error::NotFound`].
    pub async fn delete(&self, kind: ResourceKind, reference: &ResourceRef) -> Result<()> {
        let id = self.resolve_id(kind, reference).await?;
        self.transport
            .send(ApiRequest::delete(kind.item_path(&id)))
            .await?;
        tracing::debug!(%kind, id = %id, "resource deleted");
        Ok(())
    }

    /// Ids pass through untouched; names must match exactly one resource.
    pub async fn resolve_id(&self, kind: ResourceKind, reference: &ResourceRef) -> Result<String> {
        let name = match reference {
            ResourceRef::Id(id) => return Ok(id.clone()),
            ResourceRef::Name(name) => name.trim(),
        };
        if name.is_empty() {
            return Err(Error::validation(format!("{} reference must not be empty", kind)));
        }

        let candidates = self
            .list_values(ListFilter::new().name(name).to_request(kind))
            .await?;
        let mut matches: Vec<String> = candidates
            .iter()
            .filter(|item| item.get("name").and_then(Value::as_str) == Some(name))
            .filter_map(|item| item.get("id").and_then(Value::as_str).map(String::from))
            .collect();

        match matches.len() {
            0 => Err(Error::not_found(kind, name)),
            1 => Ok(matches.remove(0)),
            n => Err(Error::AmbiguousName {
                kind,
                name: name.to_string(),
                matches: n,
            }),
        }
    }

    pub(crate) async fn fetch<R: Resource>(&self, id: &str) -> Result<R> {
        let value = self
            .transport
            .send(ApiRequest::get(R::KIND.item_path(id)))
            .await?;
        if value.is_null() {
            return Err(Error::not_found(R::KIND, id));
        }
        decode(value)
    }

    async fn list_values(&self, request: ApiRequest) -> Result<Vec<Value>> {
        let value = self.transport.send(request).await?;
        Ok(items_of(value))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

#[async_trait]
impl ResourceDeleter for Registry {
    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
        Registry::delete(self, kind, &ResourceRef::id(id)).await
    }
}

pub(crate) fn decode<R: serde::de::DeserializeOwned>(value: Value) -> Result<R> {
    Ok(serde_json::from_value(value)?)
}

/// List payloads arrive bare or wrapped in `items`/`results`/`data`.
pub(crate) fn items_of(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => ["items", "results", "data", "tools"]
            .iter()
            .find_map(|key| match obj.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_to_request() {
        let request = ListFilter::new()
            .name("calc")
            .param("tool_type", "custom")
            .to_request(ResourceKind::Tool);
        assert_eq!(request.target(), "tools?name=calc&tool_type=custom");
        assert_eq!(
            ListFilter::new().to_request(ResourceKind::Mcp).target(),
            "mcps"
        );
    }

    #[test]
    fn test_items_of_shapes() {
        assert_eq!(items_of(json!([{"id": 1}])).len(), 1);
        assert_eq!(items_of(json!({"items": [{"id": 1}, {"id": 2}]})).len(), 2);
        assert_eq!(items_of(json!({"tools": [{"name": "a"}]})).len(), 1);
        assert!(items_of(json!({"count": 0})).is_empty());
        assert!(items_of(Value::Null).is_empty());
    }
}
