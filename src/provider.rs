//! The CircleCI provider.
//!
//! [`CircleCiProvider`] publishes the schemas of every resource and data
//! source, validates and plans against them, and once configured routes
//! lifecycle operations to the mapping registered for the requested type.
//!
//! Configuration happens once. The resolved client is shared by every
//! mapping and is never replaced afterwards.

use crate::client::CircleCiClient;
use crate::config::{ProviderConfig, DEFAULT_BASE_URL};
use crate::data_sources::{self, DynamicDataSource};
use crate::error::ProviderError;
use crate::plan::plan;
use crate::resources::{self, DynamicResource};
use crate::schema::{Diagnostic, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation::validate;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Resource and data source mappings bound to one client.
struct Registries {
    resources: BTreeMap<String, Box<dyn DynamicResource>>,
    data_sources: BTreeMap<String, Box<dyn DynamicDataSource>>,
}

impl Registries {
    fn new(client: Arc<CircleCiClient>) -> Self {
        Self {
            resources: resources::registry(client.clone()),
            data_sources: data_sources::registry(client),
        }
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn DynamicResource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(Box::as_ref)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn data_source(&self, data_source_type: &str) -> Result<&dyn DynamicDataSource, ProviderError> {
        self.data_sources
            .get(data_source_type)
            .map(Box::as_ref)
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }
}

/// Provider for the CircleCI API v2.
pub struct CircleCiProvider {
    /// Mappings used for schema, validation and planning. Their client is
    /// never used to send requests.
    catalog: Registries,
    configured: OnceLock<Registries>,
}

impl Default for CircleCiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CircleCiProvider {
    /// An unconfigured provider.
    pub fn new() -> Self {
        let unconfigured = Arc::new(CircleCiClient::new(ProviderConfig::new("", DEFAULT_BASE_URL)));
        Self {
            catalog: Registries::new(unconfigured),
            configured: OnceLock::new(),
        }
    }

    /// A provider already configured with `config`, skipping `configure`.
    pub fn with_config(config: ProviderConfig) -> Self {
        let provider = Self::new();
        let client = Arc::new(CircleCiClient::new(config));
        let _ = provider.configured.set(Registries::new(client));
        provider
    }

    /// Whether `configure` has succeeded.
    pub fn is_configured(&self) -> bool {
        self.configured.get().is_some()
    }

    fn live(&self) -> Result<&Registries, ProviderError> {
        self.configured
            .get()
            .ok_or_else(|| ProviderError::Configuration("provider has not been configured".to_string()))
    }
}

#[async_trait::async_trait]
impl ProviderService for CircleCiProvider {
    fn schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        let schema = self
            .catalog
            .resources
            .iter()
            .fold(schema, |s, (name, r)| s.with_resource(name, r.schema()));
        self.catalog
            .data_sources
            .iter()
            .fold(schema, |s, (name, d)| s.with_data_source(name, d.schema()))
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&ProviderConfig::schema(), &config);
        if let Err(mut resolved) = ProviderConfig::from_value(&config) {
            diagnostics.append(&mut resolved);
        }
        Ok(diagnostics)
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        if self.is_configured() {
            return Ok(vec![Diagnostic::error("Provider Already Configured")
                .with_detail("The provider can only be configured once.")]);
        }

        let config = match ProviderConfig::from_value(&config) {
            Ok(config) => config,
            Err(diagnostics) => return Ok(diagnostics),
        };

        debug!(base_url = %config.base_url(), "Configuring CircleCI client");
        let client = Arc::new(CircleCiClient::new(config));
        if self.configured.set(Registries::new(client)).is_err() {
            return Ok(vec![Diagnostic::error("Provider Already Configured")
                .with_detail("The provider can only be configured once.")]);
        }

        info!("Configured CircleCI client");
        Ok(vec![])
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.catalog.resource(resource_type)?;
        let mut diagnostics = validate(&resource.schema(), &config);
        diagnostics.extend(resource.validate(&config));
        Ok(diagnostics)
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.catalog.resource(resource_type)?;
        let prior = prior_state.filter(|p| !p.is_null());
        Ok(plan(&resource.schema(), prior.as_ref(), proposed_state))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.live()?.resource(resource_type)?.create(planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let resource = self.live()?.resource(resource_type)?;
        match resource.read(current_state).await? {
            Some(state) => Ok(state),
            None => {
                info!(resource_type, "Resource no longer exists");
                Ok(Value::Null)
            }
        }
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<(Value, Vec<Diagnostic>), ProviderError> {
        self.live()?
            .resource(resource_type)?
            .update(prior_state, planned_state)
            .await
    }

    async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.live()?.resource(resource_type)?.delete(current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let state = self.catalog.resource(resource_type)?.import(id)?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let data_source = self.catalog.data_source(data_source_type)?;
        let mut diagnostics = validate(&data_source.schema(), &config);
        diagnostics.extend(data_source.validate(&config));
        Ok(diagnostics)
    }

    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        self.live()?.data_source(data_source_type)?.read(config).await
    }
}
