//! `circleci_context`: a named container for shared environment variables.
//!
//! Contexts cannot be renamed or moved, so every configurable attribute
//! forces replacement and Update always fails.

use super::{found, required, update_not_supported, Resource};
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::ids::require_id;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, Diagnostic, NestedBlock, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Owner of a context as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// Owner id; may be omitted on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owner slug, e.g. `github`.
    #[serde(default)]
    pub slug: String,
    /// `organization` or `account`.
    #[serde(rename = "type", default)]
    pub owner_type: String,
}

/// A context as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Context id.
    pub id: String,
    /// Context name.
    pub name: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Owning organization or account.
    #[serde(default)]
    pub owner: Option<Owner>,
}

#[derive(Debug, Serialize)]
struct CreateContextRequest<'a> {
    name: &'a str,
    owner: &'a Owner,
}

/// Owner block in state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerState {
    /// Owner id.
    pub id: Option<String>,
    /// Owner slug.
    pub slug: String,
    /// Owner type.
    #[serde(rename = "type")]
    pub owner_type: String,
}

impl From<Owner> for OwnerState {
    fn from(owner: Owner) -> Self {
        Self {
            id: owner.id,
            slug: owner.slug,
            owner_type: owner.owner_type,
        }
    }
}

/// Terraform state of a context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextState {
    /// Context id.
    pub id: Option<String>,
    /// Context name.
    pub name: String,
    /// Owning organization or account.
    pub owner: Option<OwnerState>,
    /// Creation timestamp.
    pub created_at: Option<String>,
}

impl ContextState {
    fn refresh(&mut self, context: Context) {
        self.id = Some(context.id);
        self.name = context.name;
        self.created_at = context.created_at;
        if let Some(owner) = context.owner {
            self.owner = Some(owner.into());
        }
    }
}

/// Manages CircleCI contexts.
pub struct ContextResource {
    client: Arc<CircleCiClient>,
}

impl ContextResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

/// Schema of the context owner block, shared with the data source.
pub fn owner_type() -> AttributeType {
    AttributeType::object([
        ("id", AttributeType::String),
        ("slug", AttributeType::String),
        ("type", AttributeType::String),
    ])
}

#[async_trait]
impl Resource for ContextResource {
    type State = ContextState;
    const KIND: &'static str = "context";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "Contexts provide a mechanism for securing and sharing environment variables across projects.",
            )
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("The unique identifier of the context."),
            )
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The name of the context."),
            )
            .with_attribute("created_at", Attribute::computed_string())
            .with_block(
                "owner",
                NestedBlock::single(
                    Block::new()
                        .with_description("The owner of the context (organization or user).")
                        .with_attribute(
                            "id",
                            Attribute::new(AttributeType::String, AttributeFlags::optional_computed()),
                        )
                        .with_attribute(
                            "slug",
                            Attribute::required_string()
                                .with_description("The slug of the owner (e.g., 'github', 'bitbucket')."),
                        )
                        .with_attribute(
                            "type",
                            Attribute::required_string()
                                .with_description("The type of the owner ('organization' or 'account')."),
                        ),
                )
                .required()
                .with_force_new(),
            )
    }

    async fn create(&self, planned: ContextState) -> Result<ContextState, ProviderError> {
        let owner_state = planned
            .owner
            .clone()
            .ok_or_else(|| ProviderError::Validation("'owner' must be set".to_string()))?;
        let owner = Owner {
            id: owner_state.id.clone(),
            slug: owner_state.slug.clone(),
            owner_type: owner_state.owner_type.clone(),
        };

        let request = CreateContextRequest {
            name: &planned.name,
            owner: &owner,
        };
        let context: Context = self
            .client
            .post("/context", &request)
            .await
            .map_err(|e| ProviderError::client("create context", e))?;

        info!(context_id = %context.id, name = %context.name, "Created context");

        let mut state = planned;
        state.refresh(context);
        if let Some(owner) = state.owner.as_mut() {
            if owner.id.is_none() {
                owner.id = owner_state.id;
            }
        }
        Ok(state)
    }

    async fn read(&self, current: ContextState) -> Result<Option<ContextState>, ProviderError> {
        let id = required(&current.id, "id")?;
        let fetched = self.client.get::<Context>(&format!("/context/{}", id)).await;
        let Some(context) = found(fetched, "read context")? else {
            return Ok(None);
        };

        let mut state = current;
        state.refresh(context);
        Ok(Some(state))
    }

    async fn update(
        &self,
        _prior: ContextState,
        _planned: ContextState,
    ) -> Result<(ContextState, Vec<Diagnostic>), ProviderError> {
        Err(update_not_supported(
            "CircleCI contexts cannot be updated. Changes to name or owner require destroying and recreating the context.",
        ))
    }

    async fn delete(&self, current: ContextState) -> Result<Vec<Diagnostic>, ProviderError> {
        let id = required(&current.id, "id")?;
        self.client
            .delete(&format!("/context/{}", id))
            .await
            .map_err(|e| ProviderError::client("delete context", e))?;
        info!(context_id = %id, "Deleted context");
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<ContextState, ProviderError> {
        Ok(ContextState {
            id: Some(require_id(id)?),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::is_uuid;
    use crate::resources::test_support::client_for;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONTEXT_ID: &str = "8a5fbc08-ff2b-4a9b-a5f5-4a9b33e2a2a6";

    fn context_body() -> serde_json::Value {
        json!({
            "id": CONTEXT_ID,
            "name": "shared-context",
            "created_at": "2024-05-01T10:00:00Z",
            "owner": {"id": "org-1", "slug": "github", "type": "organization"}
        })
    }

    fn planned() -> ContextState {
        ContextState {
            name: "shared-context".to_string(),
            owner: Some(OwnerState {
                id: None,
                slug: "github".to_string(),
                owner_type: "organization".to_string(),
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/context"))
            .and(body_json(json!({
                "name": "shared-context",
                "owner": {"slug": "github", "type": "organization"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(context_body()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/context/{}", CONTEXT_ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(context_body()))
            .mount(&server)
            .await;

        let resource = ContextResource::new(client_for(&server));
        let created = resource.create(planned()).await.unwrap();
        let id = created.id.clone().unwrap();
        assert!(is_uuid(&id));

        let read = resource.read(created.clone()).await.unwrap().unwrap();
        assert_eq!(read.id.as_deref(), Some(id.as_str()));
        assert_eq!(read.name, "shared-context");
        let owner = read.owner.unwrap();
        assert_eq!(owner.slug, "github");
        assert_eq!(owner.owner_type, "organization");
    }

    #[tokio::test]
    async fn test_read_missing_context_is_gone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/context/gone"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "Context not found"})),
            )
            .mount(&server)
            .await;

        let resource = ContextResource::new(client_for(&server));
        let state = resource.import("gone").unwrap();
        assert!(resource.read(state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_server_error_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/context/c1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let resource = ContextResource::new(client_for(&server));
        let err = resource
            .read(resource.import("c1").unwrap())
            .await
            .unwrap_err();
        assert!(err.message().contains("Unable to read context"));
    }

    #[tokio::test]
    async fn test_update_is_rejected() {
        let server = MockServer::start().await;
        let resource = ContextResource::new(client_for(&server));
        let err = resource.update(planned(), planned()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unimplemented(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/context/c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let resource = ContextResource::new(client_for(&server));
        let warnings = resource
            .delete(resource.import("c1").unwrap())
            .await
            .unwrap();
        assert!(warnings.is_empty());
    }
}
