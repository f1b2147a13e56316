//! `circleci_checkout_key`: SSH keys CircleCI uses to clone a repository.

use super::{found, required, update_not_supported, Resource};
use crate::client::{escape_project_slug, CircleCiClient};
use crate::error::ProviderError;
use crate::ids::{composite_id, parse_composite_id};
use crate::schema::{Attribute, Diagnostic, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const IMPORT_FORMAT: &str = "project_slug:fingerprint";
const KEY_TYPES: [&str; 2] = ["deploy-key", "user-key"];

/// A checkout key as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CheckoutKey {
    /// SSH public key.
    pub public_key: String,
    /// `deploy-key` or `user-key`.
    #[serde(rename = "type")]
    pub key_type: String,
    /// Key fingerprint, colon separated.
    pub fingerprint: String,
    /// Whether CircleCI prefers this key for checkout.
    pub preferred: bool,
    /// Creation timestamp.
    pub created_at: String,
}

#[derive(Debug, Serialize)]
struct CreateCheckoutKeyRequest<'a> {
    #[serde(rename = "type")]
    key_type: &'a str,
}

/// Terraform state of a checkout key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutKeyState {
    /// `project_slug:fingerprint`.
    pub id: Option<String>,
    /// Project the key belongs to.
    pub project_slug: String,
    /// `deploy-key` or `user-key`.
    #[serde(rename = "type")]
    pub key_type: String,
    /// Key fingerprint.
    pub fingerprint: Option<String>,
    /// SSH public key.
    pub public_key: Option<String>,
    /// Whether the key is preferred.
    pub preferred: Option<bool>,
    /// Creation timestamp.
    pub created_at: Option<String>,
}

impl CheckoutKeyState {
    fn refresh(&mut self, key: CheckoutKey) {
        self.id = Some(composite_id(&self.project_slug, &key.fingerprint));
        self.key_type = key.key_type;
        self.fingerprint = Some(key.fingerprint);
        self.public_key = Some(key.public_key);
        self.preferred = Some(key.preferred);
        self.created_at = Some(key.created_at);
    }

    fn key_path(&self, fingerprint: &str) -> String {
        format!(
            "/project/{}/checkout-key/{}",
            escape_project_slug(&self.project_slug),
            fingerprint
        )
    }
}

/// Manages project checkout keys.
pub struct CheckoutKeyResource {
    client: Arc<CircleCiClient>,
}

impl CheckoutKeyResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Resource for CheckoutKeyResource {
    type State = CheckoutKeyState;
    const KIND: &'static str = "checkout_key";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "CircleCI Checkout Key resource. Checkout keys are used to access your repository during builds.",
            )
            .with_attribute(
                "id",
                Attribute::computed_string()
                    .with_description("Identifier in the form project_slug:fingerprint."),
            )
            .with_attribute(
                "project_slug",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The project slug (e.g., 'gh/circleci/circleci-docs')."),
            )
            .with_attribute(
                "type",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The type of checkout key: 'deploy-key' or 'user-key'."),
            )
            .with_attribute("fingerprint", Attribute::computed_string())
            .with_attribute("public_key", Attribute::computed_string())
            .with_attribute("preferred", Attribute::computed_bool())
            .with_attribute("created_at", Attribute::computed_string())
    }

    fn validate(&self, config: &CheckoutKeyState) -> Vec<Diagnostic> {
        if config.key_type.is_empty() || KEY_TYPES.contains(&config.key_type.as_str()) {
            return Vec::new();
        }
        vec![Diagnostic::error("Invalid checkout key type")
            .with_detail(format!(
                "Expected one of {}, got {:?}",
                KEY_TYPES.join(", "),
                config.key_type
            ))
            .with_attribute("type")]
    }

    async fn create(&self, planned: CheckoutKeyState) -> Result<CheckoutKeyState, ProviderError> {
        let path = format!(
            "/project/{}/checkout-key",
            escape_project_slug(&planned.project_slug)
        );
        let request = CreateCheckoutKeyRequest {
            key_type: &planned.key_type,
        };
        let key: CheckoutKey = self
            .client
            .post(&path, &request)
            .await
            .map_err(|e| ProviderError::client("create checkout key", e))?;

        info!(project_slug = %planned.project_slug, fingerprint = %key.fingerprint, "Created checkout key");

        let mut state = planned;
        state.refresh(key);
        Ok(state)
    }

    async fn read(
        &self,
        current: CheckoutKeyState,
    ) -> Result<Option<CheckoutKeyState>, ProviderError> {
        let fingerprint = required(&current.fingerprint, "fingerprint")?;
        let fetched = self
            .client
            .get::<CheckoutKey>(&current.key_path(fingerprint))
            .await;
        let Some(key) = found(fetched, "read checkout key")? else {
            return Ok(None);
        };

        let mut state = current;
        state.refresh(key);
        Ok(Some(state))
    }

    async fn update(
        &self,
        _prior: CheckoutKeyState,
        _planned: CheckoutKeyState,
    ) -> Result<(CheckoutKeyState, Vec<Diagnostic>), ProviderError> {
        Err(update_not_supported(
            "CircleCI checkout keys cannot be updated. Changes require destroying and recreating the key.",
        ))
    }

    async fn delete(&self, current: CheckoutKeyState) -> Result<Vec<Diagnostic>, ProviderError> {
        let fingerprint = required(&current.fingerprint, "fingerprint")?;
        self.client
            .delete(&current.key_path(fingerprint))
            .await
            .map_err(|e| ProviderError::client("delete checkout key", e))?;
        info!(project_slug = %current.project_slug, fingerprint = %fingerprint, "Deleted checkout key");
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<CheckoutKeyState, ProviderError> {
        let (project_slug, fingerprint) = parse_composite_id(id, IMPORT_FORMAT)?;
        Ok(CheckoutKeyState {
            id: Some(id.to_string()),
            project_slug,
            fingerprint: Some(fingerprint),
            ..Default::default()
        })
    }
}
