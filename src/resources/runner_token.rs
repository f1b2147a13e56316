//! `circleci_runner_token`: a runner registration token.
//!
//! The token value is returned only by create. Reads keep the value held in
//! state, and the token can never be updated.

use super::{found, required, update_not_supported, Resource};
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::ids::require_id;
use crate::schema::{Attribute, Diagnostic, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A runner token as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunnerToken {
    /// Token id.
    pub id: String,
    /// Resource class the token registers runners into.
    pub resource_class: String,
    /// Human-readable label.
    pub nickname: String,
    /// Secret value; present only in the create response.
    pub token: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
}

#[derive(Debug, Serialize)]
struct CreateRunnerTokenRequest<'a> {
    resource_class: &'a str,
    nickname: &'a str,
}

/// Terraform state of a runner token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerTokenState {
    /// Token id.
    pub id: Option<String>,
    /// Resource class.
    pub resource_class: String,
    /// Human-readable label.
    pub nickname: String,
    /// Secret value.
    pub token: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<String>,
}

impl RunnerTokenState {
    fn refresh(&mut self, token: RunnerToken) {
        self.id = Some(token.id);
        if !token.resource_class.is_empty() {
            self.resource_class = token.resource_class;
        }
        if !token.nickname.is_empty() {
            self.nickname = token.nickname;
        }
        if let Some(value) = token.token.filter(|t| !t.is_empty()) {
            self.token = Some(value);
        }
        self.created_at = Some(token.created_at);
    }
}

/// Manages runner registration tokens.
pub struct RunnerTokenResource {
    client: Arc<CircleCiClient>,
}

impl RunnerTokenResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Resource for RunnerTokenResource {
    type State = RunnerTokenState;
    const KIND: &'static str = "runner_token";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("CircleCI runner registration token.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "resource_class",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The resource class in the form 'namespace/name'."),
            )
            .with_attribute("nickname", Attribute::required_string().with_force_new())
            .with_attribute(
                "token",
                Attribute::computed_string()
                    .sensitive()
                    .with_description("The token value. Only available after creation."),
            )
            .with_attribute("created_at", Attribute::computed_string())
    }

    async fn create(&self, planned: RunnerTokenState) -> Result<RunnerTokenState, ProviderError> {
        let request = CreateRunnerTokenRequest {
            resource_class: &planned.resource_class,
            nickname: &planned.nickname,
        };
        let token: RunnerToken = self
            .client
            .post("/runner/token", &request)
            .await
            .map_err(|e| ProviderError::client("create runner token", e))?;

        info!(token_id = %token.id, resource_class = %planned.resource_class, "Created runner token");

        let mut state = planned;
        state.refresh(token);
        Ok(state)
    }

    async fn read(
        &self,
        current: RunnerTokenState,
    ) -> Result<Option<RunnerTokenState>, ProviderError> {
        let id = required(&current.id, "id")?;
        let fetched = self
            .client
            .get::<RunnerToken>(&format!("/runner/token/{}", id))
            .await;
        let Some(token) = found(fetched, "read runner token")? else {
            return Ok(None);
        };

        let mut state = current;
        state.refresh(token);
        Ok(Some(state))
    }

    async fn update(
        &self,
        _prior: RunnerTokenState,
        _planned: RunnerTokenState,
    ) -> Result<(RunnerTokenState, Vec<Diagnostic>), ProviderError> {
        Err(update_not_supported(
            "Runner tokens are immutable. Any changes require creating a new token.",
        ))
    }

    async fn delete(&self, current: RunnerTokenState) -> Result<Vec<Diagnostic>, ProviderError> {
        let id = required(&current.id, "id")?;
        self.client
            .delete(&format!("/runner/token/{}", id))
            .await
            .map_err(|e| ProviderError::client("delete runner token", e))?;
        info!(token_id = %id, "Deleted runner token");
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<RunnerTokenState, ProviderError> {
        Ok(RunnerTokenState {
            id: Some(require_id(id)?),
            ..Default::default()
        })
    }
}
