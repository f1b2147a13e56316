//! Managed resource mappings.
//!
//! Each CircleCI object type implements [`Resource`] against a typed state
//! struct. [`DynamicResource`] erases that type so the provider can hold
//! every mapping in one registry keyed by type name.

use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::schema::{Diagnostic, Schema};
use crate::types::type_name;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod checkout_key;
pub mod context;
pub mod environment_variable;
pub mod job;
pub mod oidc_token;
pub mod pipeline;
pub mod policy;
pub mod project;
pub mod runner;
pub mod runner_token;
pub mod schedule;
pub mod usage_export;
pub mod user;
pub mod webhook;

/// The lifecycle contract every managed CircleCI object implements.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Typed Terraform state for this resource.
    type State: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Type name without the provider prefix, e.g. `"context"`.
    const KIND: &'static str;

    /// Attribute schema.
    fn schema(&self) -> Schema;

    /// Type-specific configuration checks beyond the schema.
    fn validate(&self, _config: &Self::State) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Create the remote object and return the populated state.
    async fn create(&self, planned: Self::State) -> Result<Self::State, ProviderError>;

    /// Refresh state. `None` means the remote object is gone.
    async fn read(&self, current: Self::State) -> Result<Option<Self::State>, ProviderError>;

    /// Apply in-place changes. Returned diagnostics are warnings.
    async fn update(
        &self,
        prior: Self::State,
        planned: Self::State,
    ) -> Result<(Self::State, Vec<Diagnostic>), ProviderError>;

    /// Delete the remote object. Returned diagnostics are warnings.
    async fn delete(&self, current: Self::State) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Turn an import identifier into the minimal state a read can refresh.
    fn import(&self, id: &str) -> Result<Self::State, ProviderError>;
}

/// A type-erased [`Resource`] working on JSON state.
#[async_trait]
pub trait DynamicResource: Send + Sync {
    /// Full type name, e.g. `"circleci_context"`.
    fn type_name(&self) -> String;
    /// Attribute schema.
    fn schema(&self) -> Schema;
    /// Type-specific configuration checks.
    fn validate(&self, config: &Value) -> Vec<Diagnostic>;
    /// See [`Resource::create`].
    async fn create(&self, planned: Value) -> Result<Value, ProviderError>;
    /// See [`Resource::read`].
    async fn read(&self, current: Value) -> Result<Option<Value>, ProviderError>;
    /// See [`Resource::update`].
    async fn update(
        &self,
        prior: Value,
        planned: Value,
    ) -> Result<(Value, Vec<Diagnostic>), ProviderError>;
    /// See [`Resource::delete`].
    async fn delete(&self, current: Value) -> Result<Vec<Diagnostic>, ProviderError>;
    /// See [`Resource::import`].
    fn import(&self, id: &str) -> Result<Value, ProviderError>;
}

struct Erased<R>(R);

#[async_trait]
impl<R: Resource> DynamicResource for Erased<R> {
    fn type_name(&self) -> String {
        type_name(R::KIND)
    }

    fn schema(&self) -> Schema {
        self.0.schema()
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        // Shape errors are reported by schema validation.
        match serde_json::from_value::<R::State>(config.clone()) {
            Ok(state) => self.0.validate(&state),
            Err(_) => Vec::new(),
        }
    }

    async fn create(&self, planned: Value) -> Result<Value, ProviderError> {
        let planned = serde_json::from_value(planned)?;
        Ok(serde_json::to_value(self.0.create(planned).await?)?)
    }

    async fn read(&self, current: Value) -> Result<Option<Value>, ProviderError> {
        let current = serde_json::from_value(current)?;
        match self.0.read(current).await? {
            Some(state) => Ok(Some(serde_json::to_value(state)?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        prior: Value,
        planned: Value,
    ) -> Result<(Value, Vec<Diagnostic>), ProviderError> {
        let prior = serde_json::from_value(prior)?;
        let planned = serde_json::from_value(planned)?;
        let (state, warnings) = self.0.update(prior, planned).await?;
        Ok((serde_json::to_value(state)?, warnings))
    }

    async fn delete(&self, current: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let current = serde_json::from_value(current)?;
        self.0.delete(current).await
    }

    fn import(&self, id: &str) -> Result<Value, ProviderError> {
        Ok(serde_json::to_value(self.0.import(id)?)?)
    }
}

/// Box a typed resource for the registry.
pub fn erase<R: Resource>(resource: R) -> Box<dyn DynamicResource> {
    Box::new(Erased(resource))
}

/// Every resource, keyed by full type name, sharing one client.
pub fn registry(client: Arc<CircleCiClient>) -> BTreeMap<String, Box<dyn DynamicResource>> {
    let resources = vec![
        erase(context::ContextResource::new(client.clone())),
        erase(environment_variable::EnvironmentVariableResource::new(
            client.clone(),
        )),
        erase(project::ProjectResource::new(client.clone())),
        erase(checkout_key::CheckoutKeyResource::new(client.clone())),
        erase(webhook::WebhookResource::new(client.clone())),
        erase(schedule::ScheduleResource::new(client.clone())),
        erase(pipeline::PipelineResource::new(client.clone())),
        erase(oidc_token::OidcTokenResource::new(client.clone())),
        erase(job::JobResource::new(client.clone())),
        erase(policy::PolicyResource::new(client.clone())),
        erase(user::UserResource::new(client.clone())),
        erase(usage_export::UsageExportResource::new(client.clone())),
        erase(runner::RunnerResource::new(client.clone())),
        erase(runner_token::RunnerTokenResource::new(client)),
    ];

    resources
        .into_iter()
        .map(|r| (r.type_name(), r))
        .collect()
}

/// Read helper: map a 404 to "gone" and wrap everything else.
pub(crate) fn found<T>(
    result: Result<T, crate::error::ClientError>,
    action: &str,
) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => {
            tracing::warn!(action = %action, "Remote object not found, removing from state");
            Ok(None)
        }
        Err(err) => Err(ProviderError::client(action, err)),
    }
}

/// Error for resources whose remote object cannot change in place.
pub(crate) fn update_not_supported(message: &str) -> ProviderError {
    ProviderError::Unimplemented(message.to_string())
}

/// Fetch a required string attribute from typed state.
pub(crate) fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ProviderError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProviderError::Validation(format!("'{}' must be set", name)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::client::CircleCiClient;
    use crate::config::ProviderConfig;
    use std::sync::Arc;
    use wiremock::MockServer;

    pub fn client_for(server: &MockServer) -> Arc<CircleCiClient> {
        Arc::new(CircleCiClient::new(ProviderConfig::new(
            "test-token",
            server.uri(),
        )))
    }

    /// A client for tests that must not reach the network.
    pub fn offline_client() -> Arc<CircleCiClient> {
        Arc::new(CircleCiClient::new(ProviderConfig::new(
            "test-token",
            "http://127.0.0.1:1",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_every_resource() {
        let registry = registry(test_support::offline_client());
        let names: Vec<_> = registry.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "circleci_checkout_key",
                "circleci_context",
                "circleci_environment_variable",
                "circleci_job",
                "circleci_oidc_token",
                "circleci_pipeline",
                "circleci_policy",
                "circleci_project",
                "circleci_runner",
                "circleci_runner_token",
                "circleci_schedule",
                "circleci_usage_export",
                "circleci_user",
                "circleci_webhook",
            ]
        );
        for (name, resource) in &registry {
            assert!(
                resource.schema().block.attributes.contains_key("id"),
                "{name} has no id attribute"
            );
        }
    }
}
