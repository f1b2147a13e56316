//! `circleci_policy`: a config policy (Rego) in an organization.

use super::{found, required, Resource};
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::ids::parse_composite_id;
use crate::schema::{Attribute, Diagnostic, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const IMPORT_FORMAT: &str = "org_id:policy_id";

/// A policy as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Policy id.
    pub id: String,
    /// Policy name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Rego source.
    pub content: String,
    /// Owning organization.
    pub org_id: String,
    /// Whether the policy is enforced.
    pub enabled: bool,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
struct PolicyRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    content: &'a str,
    enabled: bool,
}

/// Terraform state of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyState {
    /// Policy id.
    pub id: Option<String>,
    /// Owning organization.
    pub org_id: String,
    /// Policy name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Rego source.
    pub content: String,
    /// Whether the policy is enforced.
    pub enabled: bool,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Last update timestamp.
    pub updated_at: Option<String>,
}

impl Default for PolicyState {
    fn default() -> Self {
        Self {
            id: None,
            org_id: String::new(),
            name: String::new(),
            description: None,
            content: String::new(),
            enabled: true,
            created_at: None,
            updated_at: None,
        }
    }
}

impl PolicyState {
    fn collection_path(&self) -> String {
        format!("/policy/{}", self.org_id)
    }

    fn request(&self) -> PolicyRequest<'_> {
        PolicyRequest {
            name: &self.name,
            description: self.description.as_deref(),
            content: &self.content,
            enabled: self.enabled,
        }
    }

    fn refresh(&mut self, policy: Policy) {
        self.id = Some(policy.id);
        self.name = policy.name;
        if !policy.description.is_empty() || self.description.is_some() {
            self.description = Some(policy.description);
        }
        self.content = policy.content;
        self.enabled = policy.enabled;
        self.created_at = Some(policy.created_at);
        self.updated_at = Some(policy.updated_at);
    }
}

/// Manages organization config policies.
pub struct PolicyResource {
    client: Arc<CircleCiClient>,
}

impl PolicyResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Resource for PolicyResource {
    type State = PolicyState;
    const KIND: &'static str = "policy";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("CircleCI config policy written in Rego.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "org_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The organization ID."),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute(
                "content",
                Attribute::required_string().with_description("The Rego policy content."),
            )
            .with_attribute(
                "enabled",
                Attribute::optional_bool()
                    .with_default(json!(true))
                    .with_description("Whether the policy is enabled."),
            )
            .with_attribute("created_at", Attribute::computed_string())
            .with_attribute("updated_at", Attribute::computed_string())
    }

    async fn create(&self, planned: PolicyState) -> Result<PolicyState, ProviderError> {
        let policy: Policy = self
            .client
            .post(&planned.collection_path(), &planned.request())
            .await
            .map_err(|e| ProviderError::client("create policy", e))?;

        info!(org_id = %planned.org_id, policy_id = %policy.id, "Created policy");

        let mut state = planned;
        state.refresh(policy);
        Ok(state)
    }

    async fn read(&self, current: PolicyState) -> Result<Option<PolicyState>, ProviderError> {
        let id = required(&current.id, "id")?;
        let path = format!("{}/{}", current.collection_path(), id);
        let Some(policy) = found(self.client.get::<Policy>(&path).await, "read policy")? else {
            return Ok(None);
        };

        let mut state = current;
        state.refresh(policy);
        Ok(Some(state))
    }

    async fn update(
        &self,
        prior: PolicyState,
        planned: PolicyState,
    ) -> Result<(PolicyState, Vec<Diagnostic>), ProviderError> {
        let id = required(&prior.id, "id")?;
        let path = format!("{}/{}", planned.collection_path(), id);
        let policy: Policy = self
            .client
            .put(&path, &planned.request())
            .await
            .map_err(|e| ProviderError::client("update policy", e))?;

        info!(policy_id = %id, "Updated policy");

        let mut state = planned;
        state.refresh(policy);
        Ok((state, Vec::new()))
    }

    async fn delete(&self, current: PolicyState) -> Result<Vec<Diagnostic>, ProviderError> {
        let id = required(&current.id, "id")?;
        let path = format!("{}/{}", current.collection_path(), id);
        self.client
            .delete(&path)
            .await
            .map_err(|e| ProviderError::client("delete policy", e))?;
        info!(policy_id = %id, "Deleted policy");
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<PolicyState, ProviderError> {
        let (org_id, policy_id) = parse_composite_id(id, IMPORT_FORMAT)?;
        Ok(PolicyState {
            id: Some(policy_id),
            org_id,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::client_for;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REGO: &str = "package org\n\npolicy_name[\"no_docker\"]";

    fn policy_body(enabled: bool) -> serde_json::Value {
        json!({
            "id": "pol-1",
            "name": "no-docker",
            "description": "",
            "content": REGO,
            "org_id": "org-1",
            "enabled": enabled,
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_create_defaults_to_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/policy/org-1"))
            .and(body_json(json!({"name": "no-docker", "content": REGO, "enabled": true})))
            .respond_with(ResponseTemplate::new(201).set_body_json(policy_body(true)))
            .expect(1)
            .mount(&server)
            .await;

        let resource = PolicyResource::new(client_for(&server));
        let planned: PolicyState = serde_json::from_value(json!({
            "org_id": "org-1",
            "name": "no-docker",
            "content": REGO
        }))
        .unwrap();
        let state = resource.create(planned).await.unwrap();
        assert_eq!(state.id.as_deref(), Some("pol-1"));
        assert!(state.enabled);
        assert_eq!(state.description, None);
    }

    #[tokio::test]
    async fn test_import_then_read_missing_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/policy/org-1/pol-1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
            .mount(&server)
            .await;

        let resource = PolicyResource::new(client_for(&server));
        let state = resource.import("org-1:pol-1").unwrap();
        assert!(resource.read(state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_disables() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/policy/org-1/pol-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(policy_body(false)))
            .expect(1)
            .mount(&server)
            .await;

        let resource = PolicyResource::new(client_for(&server));
        let prior = PolicyState {
            id: Some("pol-1".to_string()),
            org_id: "org-1".to_string(),
            name: "no-docker".to_string(),
            content: REGO.to_string(),
            ..Default::default()
        };
        let mut planned = prior.clone();
        planned.enabled = false;

        let (state, _) = resource.update(prior, planned).await.unwrap();
        assert!(!state.enabled);
    }
}
