//! `circleci_policies` data source: every config policy of an organization.

use super::DataSource;
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::resources::policy::Policy;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One policy in the list output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySummary {
    /// Policy id.
    pub id: String,
    /// Policy name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Rego source.
    pub content: String,
    /// Whether the policy is enforced.
    pub enabled: bool,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

impl From<Policy> for PolicySummary {
    fn from(policy: Policy) -> Self {
        Self {
            id: policy.id,
            name: policy.name,
            description: policy.description,
            content: policy.content,
            enabled: policy.enabled,
            created_at: policy.created_at,
            updated_at: policy.updated_at,
        }
    }
}

/// Inputs and outputs of the policies query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoliciesModel {
    /// Organization to list.
    pub org_id: String,
    /// Policies in server order.
    pub policies: Option<Vec<PolicySummary>>,
}

/// Lists organization policies.
pub struct PoliciesDataSource {
    client: Arc<CircleCiClient>,
}

impl PoliciesDataSource {
    /// Create the data source bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for PoliciesDataSource {
    type Model = PoliciesModel;
    const KIND: &'static str = "policies";

    fn schema(&self) -> Schema {
        let policy = AttributeType::object([
            ("id", AttributeType::String),
            ("name", AttributeType::String),
            ("description", AttributeType::String),
            ("content", AttributeType::String),
            ("enabled", AttributeType::Bool),
            ("created_at", AttributeType::String),
            ("updated_at", AttributeType::String),
        ]);
        Schema::v0()
            .with_description("Use this data source to list the config policies of an organization.")
            .with_attribute("org_id", Attribute::required_string())
            .with_attribute(
                "policies",
                Attribute::new(AttributeType::list(policy), AttributeFlags::computed()),
            )
    }

    async fn read(&self, config: PoliciesModel) -> Result<PoliciesModel, ProviderError> {
        let policies: Vec<Policy> = self
            .client
            .get_all_pages(&format!("/policy/{}", config.org_id), &[])
            .await
            .map_err(|e| ProviderError::client("list policies", e))?;

        Ok(PoliciesModel {
            org_id: config.org_id,
            policies: Some(policies.into_iter().map(PolicySummary::from).collect()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::client_for;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_policies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/policy/org-1"))
            .and(header("Circle-Token", "test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "pol-1",
                    "name": "no-docker",
                    "content": "package org",
                    "enabled": true,
                    "org_id": "org-1"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let data_source = PoliciesDataSource::new(client_for(&server));
        let model = data_source
            .read(PoliciesModel {
                org_id: "org-1".to_string(),
                policies: None,
            })
            .await
            .unwrap();
        let policies = model.policies.unwrap();
        assert_eq!(policies.len(), 1);
        assert!(policies[0].enabled);
        assert_eq!(policies[0].description, "");
    }
}
