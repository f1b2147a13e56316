//! `circleci_organization` data source: look an organization up by id or name.

use super::{lookup, lookup_diagnostics, DataSource, Lookup};
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An organization as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Organization {
    /// Organization id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Slug, e.g. `gh/acme`.
    pub slug: String,
    /// VCS type, e.g. `github`.
    pub vcs_type: String,
    /// Avatar URL.
    pub avatar_url: String,
    /// Creation timestamp.
    pub created_at: String,
}

/// Inputs and outputs of the organization lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationModel {
    /// Organization id.
    pub id: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Slug.
    pub slug: Option<String>,
    /// VCS type.
    pub vcs_type: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<String>,
}

impl From<Organization> for OrganizationModel {
    fn from(org: Organization) -> Self {
        Self {
            id: Some(org.id),
            name: Some(org.name),
            slug: Some(org.slug),
            vcs_type: Some(org.vcs_type),
            avatar_url: Some(org.avatar_url),
            created_at: Some(org.created_at),
        }
    }
}

/// Reads an organization.
pub struct OrganizationDataSource {
    client: Arc<CircleCiClient>,
}

impl OrganizationDataSource {
    /// Create the data source bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for OrganizationDataSource {
    type Model = OrganizationModel;
    const KIND: &'static str = "organization";

    fn schema(&self) -> Schema {
        let lookup_key = || Attribute::new(AttributeType::String, AttributeFlags::optional_computed());
        Schema::v0()
            .with_description("Use this data source to get information about an organization.")
            .with_attribute(
                "id",
                lookup_key().with_description(
                    "The unique identifier of the organization. Either 'id' or 'name' must be specified.",
                ),
            )
            .with_attribute(
                "name",
                lookup_key().with_description(
                    "The name of the organization. Either 'id' or 'name' must be specified.",
                ),
            )
            .with_attribute("slug", Attribute::computed_string())
            .with_attribute(
                "vcs_type",
                Attribute::computed_string()
                    .with_description("The version control system type (e.g., 'github', 'bitbucket')."),
            )
            .with_attribute("avatar_url", Attribute::computed_string())
            .with_attribute("created_at", Attribute::computed_string())
    }

    fn validate(&self, config: &OrganizationModel) -> Vec<Diagnostic> {
        lookup_diagnostics(&config.id, &config.name)
    }

    async fn read(&self, config: OrganizationModel) -> Result<OrganizationModel, ProviderError> {
        let org = match lookup(&config.id, &config.name)? {
            Lookup::ById(id) => self
                .client
                .get::<Organization>(&format!("/organization/{}", id))
                .await
                .map_err(|e| ProviderError::client("read organization", e))?,
            Lookup::ByName(name) => self
                .client
                .get_all_pages::<Organization>("/organization", &[])
                .await
                .map_err(|e| ProviderError::client("list organizations", e))?
                .into_iter()
                .find(|o| o.name == name)
                .ok_or_else(|| {
                    ProviderError::NotFound(format!("Organization with name '{}' not found", name))
                })?,
        };
        Ok(org.into())
    }
}
