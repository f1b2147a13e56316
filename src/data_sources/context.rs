//! `circleci_context` data source: look a context up by id or name.

use super::{lookup, lookup_diagnostics, DataSource, Lookup};
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::resources::context::{owner_type, Context, OwnerState};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Inputs and outputs of the context lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextModel {
    /// Context id.
    pub id: Option<String>,
    /// Context name.
    pub name: Option<String>,
    /// Owning organization or account.
    pub owner: Option<OwnerState>,
}

/// Reads an existing context.
pub struct ContextDataSource {
    client: Arc<CircleCiClient>,
}

impl ContextDataSource {
    /// Create the data source bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }

    async fn find(&self, config: &ContextModel) -> Result<Context, ProviderError> {
        match lookup(&config.id, &config.name)? {
            Lookup::ById(id) => self
                .client
                .get::<Context>(&format!("/context/{}", id))
                .await
                .map_err(|e| ProviderError::client("read context", e)),
            Lookup::ByName(name) => {
                let contexts: Vec<Context> = self
                    .client
                    .get_all_pages("/context", &[])
                    .await
                    .map_err(|e| ProviderError::client("list contexts", e))?;
                debug!(count = contexts.len(), name = %name, "Searching contexts by name");
                contexts
                    .into_iter()
                    .find(|c| c.name == name)
                    .ok_or_else(|| {
                        ProviderError::NotFound(format!("Context with name '{}' not found", name))
                    })
            }
        }
    }
}

#[async_trait]
impl DataSource for ContextDataSource {
    type Model = ContextModel;
    const KIND: &'static str = "context";

    fn schema(&self) -> Schema {
        let lookup_key = || Attribute::new(AttributeType::String, AttributeFlags::optional_computed());
        Schema::v0()
            .with_description("Use this data source to get information about an existing context.")
            .with_attribute(
                "id",
                lookup_key().with_description(
                    "The unique identifier of the context. Either 'id' or 'name' must be specified.",
                ),
            )
            .with_attribute(
                "name",
                lookup_key().with_description(
                    "The name of the context. Either 'id' or 'name' must be specified.",
                ),
            )
            .with_attribute(
                "owner",
                Attribute::new(owner_type(), AttributeFlags::computed())
                    .with_description("The owner of the context."),
            )
    }

    fn validate(&self, config: &ContextModel) -> Vec<Diagnostic> {
        lookup_diagnostics(&config.id, &config.name)
    }

    async fn read(&self, config: ContextModel) -> Result<ContextModel, ProviderError> {
        let context = self.find(&config).await?;
        Ok(ContextModel {
            id: Some(context.id),
            name: Some(context.name),
            owner: context.owner.map(OwnerState::from),
        })
    }
}
