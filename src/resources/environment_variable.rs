//! `circleci_environment_variable`: a variable stored in a context.
//!
//! The API never returns the value, so Read keeps whatever value state
//! already holds. Remote changes to the value cannot be detected.

use super::{found, required, Resource};
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::ids::{composite_id, parse_composite_id};
use crate::schema::{Attribute, Diagnostic, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const IMPORT_FORMAT: &str = "context_id:variable_name";

/// An environment variable as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnvironmentVariable {
    /// Variable name.
    pub variable: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutVariableRequest<'a> {
    name: &'a str,
    value: &'a str,
}

/// Terraform state of a context environment variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentVariableState {
    /// `context_id:name`.
    pub id: Option<String>,
    /// Owning context.
    pub context_id: String,
    /// Variable name.
    pub name: String,
    /// Write-only value.
    pub value: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Last update timestamp.
    pub updated_at: Option<String>,
}

impl EnvironmentVariableState {
    fn path(&self) -> String {
        format!(
            "/context/{}/environment-variable/{}",
            self.context_id,
            urlencoding::encode(&self.name)
        )
    }
}

/// Manages environment variables inside CircleCI contexts.
pub struct EnvironmentVariableResource {
    client: Arc<CircleCiClient>,
}

impl EnvironmentVariableResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }

    async fn put(
        &self,
        mut state: EnvironmentVariableState,
        action: &str,
    ) -> Result<EnvironmentVariableState, ProviderError> {
        let value = required(&state.value, "value")?;
        let request = PutVariableRequest {
            name: &state.name,
            value,
        };
        let variable: EnvironmentVariable = self
            .client
            .put(&state.path(), &request)
            .await
            .map_err(|e| ProviderError::client(action, e))?;

        state.id = Some(composite_id(&state.context_id, &state.name));
        state.created_at = variable.created_at;
        state.updated_at = variable.updated_at;
        Ok(state)
    }
}

#[async_trait]
impl Resource for EnvironmentVariableResource {
    type State = EnvironmentVariableState;
    const KIND: &'static str = "environment_variable";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "Environment variables set at the context level are shared across projects.",
            )
            .with_attribute(
                "id",
                Attribute::computed_string()
                    .with_description("Identifier in the form context_id:variable_name."),
            )
            .with_attribute(
                "context_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The ID of the context this variable belongs to."),
            )
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The name of the environment variable."),
            )
            .with_attribute(
                "value",
                Attribute::required_string()
                    .sensitive()
                    .with_description("The value of the environment variable. Never read back from CircleCI."),
            )
            .with_attribute("created_at", Attribute::computed_string())
            .with_attribute("updated_at", Attribute::computed_string())
    }

    async fn create(
        &self,
        planned: EnvironmentVariableState,
    ) -> Result<EnvironmentVariableState, ProviderError> {
        let state = self.put(planned, "create environment variable").await?;
        info!(context_id = %state.context_id, name = %state.name, "Created environment variable");
        Ok(state)
    }

    async fn read(
        &self,
        current: EnvironmentVariableState,
    ) -> Result<Option<EnvironmentVariableState>, ProviderError> {
        let fetched = self.client.get::<EnvironmentVariable>(&current.path()).await;
        let Some(variable) = found(fetched, "read environment variable")? else {
            return Ok(None);
        };

        // `value` is left untouched: the API does not return it.
        let mut state = current;
        state.name = variable.variable;
        state.id = Some(composite_id(&state.context_id, &state.name));
        state.created_at = variable.created_at;
        state.updated_at = variable.updated_at;
        Ok(Some(state))
    }

    async fn update(
        &self,
        _prior: EnvironmentVariableState,
        planned: EnvironmentVariableState,
    ) -> Result<(EnvironmentVariableState, Vec<Diagnostic>), ProviderError> {
        let state = self.put(planned, "update environment variable").await?;
        Ok((state, Vec::new()))
    }

    async fn delete(
        &self,
        current: EnvironmentVariableState,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.client
            .delete(&current.path())
            .await
            .map_err(|e| ProviderError::client("delete environment variable", e))?;
        info!(context_id = %current.context_id, name = %current.name, "Deleted environment variable");
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<EnvironmentVariableState, ProviderError> {
        let (context_id, name) = parse_composite_id(id, IMPORT_FORMAT)?;
        Ok(EnvironmentVariableState {
            id: Some(composite_id(&context_id, &name)),
            context_id,
            name,
            ..Default::default()
        })
    }
}
