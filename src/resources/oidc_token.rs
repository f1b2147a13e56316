//! `circleci_oidc_token`: an organization OIDC token definition.
//!
//! Only the description can change in place.

use super::{found, required, Resource};
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::ids::parse_composite_id;
use crate::schema::{Attribute, Diagnostic, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const IMPORT_FORMAT: &str = "org_id:token_id";

/// An OIDC token as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OidcToken {
    /// Token id.
    pub id: String,
    /// Token name.
    pub name: String,
    /// Owning organization.
    pub org_id: String,
    /// Intended audience.
    pub audience: String,
    /// Free-form description.
    pub description: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
struct OidcTokenRequest<'a> {
    name: &'a str,
    audience: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Terraform state of an OIDC token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcTokenState {
    /// Token id.
    pub id: Option<String>,
    /// Token name.
    pub name: String,
    /// Owning organization.
    pub org_id: String,
    /// Intended audience.
    pub audience: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Last update timestamp.
    pub updated_at: Option<String>,
}

impl OidcTokenState {
    fn collection_path(&self) -> String {
        format!("/organization/{}/oidc-token", self.org_id)
    }

    fn request(&self) -> OidcTokenRequest<'_> {
        OidcTokenRequest {
            name: &self.name,
            audience: &self.audience,
            description: self.description.as_deref(),
        }
    }

    fn refresh(&mut self, token: OidcToken) {
        self.id = Some(token.id);
        self.name = token.name;
        self.audience = token.audience;
        if !token.description.is_empty() || self.description.is_some() {
            self.description = Some(token.description);
        }
        self.created_at = Some(token.created_at);
        self.updated_at = Some(token.updated_at);
    }
}

/// Manages organization OIDC tokens.
pub struct OidcTokenResource {
    client: Arc<CircleCiClient>,
}

impl OidcTokenResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Resource for OidcTokenResource {
    type State = OidcTokenState;
    const KIND: &'static str = "oidc_token";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "CircleCI OIDC Token resource. OIDC tokens allow you to use OpenID Connect to authenticate with external services without storing long-lived credentials.",
            )
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute(
                "org_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The ID of the organization that owns the token."),
            )
            .with_attribute(
                "audience",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The audience claim of issued tokens."),
            )
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("created_at", Attribute::computed_string())
            .with_attribute("updated_at", Attribute::computed_string())
    }

    async fn create(&self, planned: OidcTokenState) -> Result<OidcTokenState, ProviderError> {
        let token: OidcToken = self
            .client
            .post(&planned.collection_path(), &planned.request())
            .await
            .map_err(|e| ProviderError::client("create OIDC token", e))?;

        info!(org_id = %planned.org_id, token_id = %token.id, "Created OIDC token");

        let mut state = planned;
        state.refresh(token);
        Ok(state)
    }

    async fn read(&self, current: OidcTokenState) -> Result<Option<OidcTokenState>, ProviderError> {
        let id = required(&current.id, "id")?;
        let path = format!("{}/{}", current.collection_path(), id);
        let Some(token) = found(self.client.get::<OidcToken>(&path).await, "read OIDC token")?
        else {
            return Ok(None);
        };

        let mut state = current;
        state.refresh(token);
        Ok(Some(state))
    }

    async fn update(
        &self,
        prior: OidcTokenState,
        planned: OidcTokenState,
    ) -> Result<(OidcTokenState, Vec<Diagnostic>), ProviderError> {
        let id = required(&prior.id, "id")?;
        let path = format!("{}/{}", planned.collection_path(), id);
        let token: OidcToken = self
            .client
            .put(&path, &planned.request())
            .await
            .map_err(|e| ProviderError::client("update OIDC token", e))?;

        info!(token_id = %id, "Updated OIDC token");

        let mut state = planned;
        state.refresh(token);
        Ok((state, Vec::new()))
    }

    async fn delete(&self, current: OidcTokenState) -> Result<Vec<Diagnostic>, ProviderError> {
        let id = required(&current.id, "id")?;
        let path = format!("{}/{}", current.collection_path(), id);
        self.client
            .delete(&path)
            .await
            .map_err(|e| ProviderError::client("delete OIDC token", e))?;
        info!(token_id = %id, "Deleted OIDC token");
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<OidcTokenState, ProviderError> {
        let (org_id, token_id) = parse_composite_id(id, IMPORT_FORMAT)?;
        Ok(OidcTokenState {
            id: Some(token_id),
            org_id,
            ..Default::default()
        })
    }
}
