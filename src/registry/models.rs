use super::{Registry, decode, items_of};
use crate::client::ApiRequest;
use crate::types::LanguageModel;
use crate::{Error, Result};

const PATH: &str = "language-models";

/// Read-only view of the language model catalog.
pub struct Models<'a> {
    registry: &'a Registry,
}

impl<'a> Models<'a> {
    pub(crate) fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    pub async fn list(&self) -> Result<Vec<LanguageModel>> {
        let value = self.registry.transport().send(ApiRequest::get(PATH)).await?;
        items_of(value).into_iter().map(decode).collect()
    }

    /// Looks a model up by id, falling back to its exact name.
    pub async fn get(&self, reference: &str) -> Result<LanguageModel> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(Error::validation("language model reference must not be empty"));
        }
        let models = self.list().await?;

        if let Some(model) = models.iter().find(|m| m.id.as_deref() == Some(reference)) {
            return Ok(model.clone());
        }
        let mut named: Vec<LanguageModel> =
            models.into_iter().filter(|m| m.name == reference).collect();
        match named.len() {
            0 => Err(Error::NotFound(format!("language model '{}'", reference))),
            1 => Ok(named.remove(0)),
            n => Err(Error::validation(format!(
                "language model name '{}' matches {} models; use its id",
                reference, n
            ))),
        }
    }
}
