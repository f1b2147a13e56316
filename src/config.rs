//! Provider configuration.
//!
//! The provider block accepts an `api_token` and an optional `base_url`.
//! When the token is not configured it is read from `CIRCLECI_TOKEN`.

use crate::schema::{Attribute, Diagnostic, Schema};
use serde::Deserialize;

/// Public CircleCI API v2 endpoint.
pub const DEFAULT_BASE_URL: &str = "https://circleci.com/api/v2";

/// Environment variable consulted when `api_token` is not configured.
pub const TOKEN_ENV_VAR: &str = "CIRCLECI_TOKEN";

/// Raw provider block as sent by the host.
#[derive(Debug, Clone, Default, Deserialize)]
struct ProviderBlock {
    #[serde(default)]
    api_token: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
}

/// Resolved provider configuration shared by every resource and data source.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    api_token: String,
    base_url: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a configuration from explicit values.
    ///
    /// A trailing `/` on the base URL is dropped so paths can always start
    /// with `/`.
    pub fn new(api_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            api_token: api_token.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The token sent in the `Circle-Token` header.
    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    /// The API root every request path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve the provider block, falling back to `CIRCLECI_TOKEN`.
    pub fn from_value(config: &serde_json::Value) -> Result<Self, Vec<Diagnostic>> {
        Self::resolve(config, std::env::var(TOKEN_ENV_VAR).ok())
    }

    /// Resolve the provider block against an explicit fallback token.
    pub fn resolve(
        config: &serde_json::Value,
        env_token: Option<String>,
    ) -> Result<Self, Vec<Diagnostic>> {
        let block: ProviderBlock = if config.is_null() {
            ProviderBlock::default()
        } else {
            serde_json::from_value(config.clone()).map_err(|e| {
                vec![Diagnostic::error("Invalid provider configuration").with_detail(e.to_string())]
            })?
        };

        let api_token = block
            .api_token
            .filter(|t| !t.is_empty())
            .or(env_token.filter(|t| !t.is_empty()));

        let Some(api_token) = api_token else {
            return Err(vec![Diagnostic::error("Unable to find API token")
                .with_detail(format!(
                    "API token cannot be an empty string. Set the api_token attribute \
                     in the provider configuration or the {} environment variable.",
                    TOKEN_ENV_VAR
                ))
                .with_attribute("api_token")]);
        };

        let base_url = block
            .base_url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self::new(api_token, base_url))
    }

    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Interact with CircleCI.")
            .with_attribute(
                "api_token",
                Attribute::optional_string()
                    .sensitive()
                    .with_description(format!(
                        "CircleCI API token. May also be provided via the {} environment variable.",
                        TOKEN_ENV_VAR
                    )),
            )
            .with_attribute(
                "base_url",
                Attribute::optional_string().with_description(format!(
                    "CircleCI API base URL. Defaults to {}.",
                    DEFAULT_BASE_URL
                )),
            )
    }
}
