//! `circleci_webhook`: outbound event notifications.
//!
//! The signing secret is write-only and is kept from prior state on Read.

use super::{found, required, Resource};
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::ids::require_id;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// What a webhook is attached to, e.g. a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope {
    /// Scope id.
    pub id: String,
    /// Scope type, e.g. `project`.
    #[serde(rename = "type")]
    pub scope_type: String,
}

/// A webhook as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Webhook {
    /// Webhook id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Target URL.
    pub url: String,
    /// Subscribed events.
    pub events: Vec<String>,
    /// Whether TLS certificates are verified.
    pub verify_tls: bool,
    /// Attachment scope.
    pub scope: Scope,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
struct WebhookRequest<'a> {
    name: &'a str,
    url: &'a str,
    events: &'a [String],
    verify_tls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    signing_secret: Option<&'a str>,
    scope: &'a Scope,
}

/// Terraform state of a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookState {
    /// Webhook id.
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Target URL.
    pub url: String,
    /// Subscribed events.
    pub events: Vec<String>,
    /// Write-only signing secret.
    pub signing_secret: Option<String>,
    /// Whether TLS certificates are verified.
    pub verify_tls: bool,
    /// Attachment scope.
    pub scope: Option<Scope>,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Last update timestamp.
    pub updated_at: Option<String>,
}

impl Default for WebhookState {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            url: String::new(),
            events: Vec::new(),
            signing_secret: None,
            verify_tls: true,
            scope: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl WebhookState {
    fn request(&self) -> Result<WebhookRequest<'_>, ProviderError> {
        let scope = self
            .scope
            .as_ref()
            .ok_or_else(|| ProviderError::Validation("'scope' must be set".to_string()))?;
        Ok(WebhookRequest {
            name: &self.name,
            url: &self.url,
            events: &self.events,
            verify_tls: self.verify_tls,
            signing_secret: self.signing_secret.as_deref(),
            scope,
        })
    }

    fn refresh(&mut self, webhook: Webhook) {
        self.id = Some(webhook.id);
        self.name = webhook.name;
        self.url = webhook.url;
        self.events = webhook.events;
        self.verify_tls = webhook.verify_tls;
        self.scope = Some(webhook.scope);
        self.created_at = Some(webhook.created_at);
        self.updated_at = Some(webhook.updated_at);
    }
}

/// Manages webhooks.
pub struct WebhookResource {
    client: Arc<CircleCiClient>,
}

impl WebhookResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Resource for WebhookResource {
    type State = WebhookState;
    const KIND: &'static str = "webhook";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("CircleCI Webhook resource. Webhooks notify external services of CircleCI events.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "name",
                Attribute::required_string().with_description("The name of the webhook."),
            )
            .with_attribute(
                "url",
                Attribute::required_string().with_description("The URL the webhook sends events to."),
            )
            .with_attribute(
                "events",
                Attribute::required_string_list()
                    .with_force_new()
                    .with_description("Events that trigger the webhook, e.g. 'workflow-completed', 'job-completed'."),
            )
            .with_attribute(
                "signing_secret",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Secret used to sign webhook payloads. Never read back from CircleCI."),
            )
            .with_attribute(
                "verify_tls",
                Attribute::optional_bool()
                    .with_default(json!(true))
                    .with_description("Whether to verify the TLS certificate of the target URL."),
            )
            .with_attribute("created_at", Attribute::computed_string())
            .with_attribute("updated_at", Attribute::computed_string())
            .with_block(
                "scope",
                NestedBlock::single(
                    Block::new()
                        .with_description("What the webhook is attached to.")
                        .with_attribute("id", Attribute::required_string())
                        .with_attribute(
                            "type",
                            Attribute::required_string().with_description("The scope type, e.g. 'project'."),
                        ),
                )
                .required(),
            )
    }

    async fn create(&self, planned: WebhookState) -> Result<WebhookState, ProviderError> {
        let webhook: Webhook = self
            .client
            .post("/webhook", &planned.request()?)
            .await
            .map_err(|e| ProviderError::client("create webhook", e))?;

        info!(webhook_id = %webhook.id, name = %webhook.name, "Created webhook");

        let mut state = planned;
        state.refresh(webhook);
        Ok(state)
    }

    async fn read(&self, current: WebhookState) -> Result<Option<WebhookState>, ProviderError> {
        let id = required(&current.id, "id")?;
        let fetched = self.client.get::<Webhook>(&format!("/webhook/{}", id)).await;
        let Some(webhook) = found(fetched, "read webhook")? else {
            return Ok(None);
        };

        let mut state = current;
        state.refresh(webhook);
        Ok(Some(state))
    }

    async fn update(
        &self,
        prior: WebhookState,
        planned: WebhookState,
    ) -> Result<(WebhookState, Vec<Diagnostic>), ProviderError> {
        let id = required(&prior.id, "id")?;
        let webhook: Webhook = self
            .client
            .put(&format!("/webhook/{}", id), &planned.request()?)
            .await
            .map_err(|e| ProviderError::client("update webhook", e))?;

        info!(webhook_id = %id, "Updated webhook");

        let mut state = planned;
        state.refresh(webhook);
        Ok((state, Vec::new()))
    }

    async fn delete(&self, current: WebhookState) -> Result<Vec<Diagnostic>, ProviderError> {
        let id = required(&current.id, "id")?;
        self.client
            .delete(&format!("/webhook/{}", id))
            .await
            .map_err(|e| ProviderError::client("delete webhook", e))?;
        info!(webhook_id = %id, "Deleted webhook");
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<WebhookState, ProviderError> {
        Ok(WebhookState {
            id: Some(require_id(id)?),
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

    fn webhook_body(name: &str) -> serde_json::Value {
        json!({
            "id": "wh-1",
            "name": name,
            "url": "https://hooks.example.com/ci",
            "events": ["workflow-completed"],
            "verify_tls": true,
            "scope": {"id": "p-1", "type": "project"},
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        })
    }

    fn planned() -> WebhookState {
        WebhookState {
            name: "notify".to_string(),
            url: "https://hooks.example.com/ci".to_string(),
            events: vec!["workflow-completed".to_string()],
            signing_secret: Some("shh".to_string()),
            scope: Some(Scope {
                id: "p-1".to_string(),
                scope_type: "project".to_string(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_verify_tls_defaults_to_true() {
        let state: WebhookState = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert!(state.verify_tls);
    }

    #[tokio::test]
    async fn test_create_sends_scope_and_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .and(body_json(json!({
                "name": "notify",
                "url": "https://hooks.example.com/ci",
                "events": ["workflow-completed"],
                "verify_tls": true,
                "signing_secret": "shh",
                "scope": {"id": "p-1", "type": "project"}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(webhook_body("notify")))
            .expect(1)
            .mount(&server)
            .await;

        let resource = WebhookResource::new(client_for(&server));
        let state = resource.create(planned()).await.unwrap();
        assert_eq!(state.id.as_deref(), Some("wh-1"));
        assert_eq!(state.signing_secret.as_deref(), Some("shh"));
    }

    #[tokio::test]
    async fn test_read_preserves_signing_secret() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/webhook/wh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(webhook_body("notify")))
            .mount(&server)
            .await;

        let resource = WebhookResource::new(client_for(&server));
        let mut current = planned();
        current.id = Some("wh-1".to_string());
        let state = resource.read(current).await.unwrap().unwrap();
        assert_eq!(state.signing_secret.as_deref(), Some("shh"));
        assert_eq!(state.scope.unwrap().scope_type, "project");
    }

    #[tokio::test]
    async fn test_update_puts_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/webhook/wh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(webhook_body("renamed")))
            .expect(1)
            .mount(&server)
            .await;

        let resource = WebhookResource::new(client_for(&server));
        let mut prior = planned();
        prior.id = Some("wh-1".to_string());
        let mut next = prior.clone();
        next.name = "renamed".to_string();

        let (state, _) = resource.update(prior, next).await.unwrap();
        assert_eq!(state.name, "renamed");
        assert_eq!(state.id.as_deref(), Some("wh-1"));
    }
}
