//! Read-only data source mappings.
//!
//! A data source takes its configuration, queries CircleCI and returns the
//! same model with the computed attributes filled in. Nothing is persisted
//! remotely.

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

pub mod artifacts;
pub mod context;
pub mod insight;
pub mod jobs;
pub mod organization;
pub mod policies;
pub mod project;
pub mod workflow;
pub mod workflows;

/// A read-only query against CircleCI.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Configuration in, populated model out.
    type Model: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Type name without the provider prefix, e.g. `"workflow"`.
    const KIND: &'static str;

    /// Attribute schema.
    fn schema(&self) -> Schema;

    /// Type-specific configuration checks beyond the schema.
    fn validate(&self, _config: &Self::Model) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Run the query.
    async fn read(&self, config: Self::Model) -> Result<Self::Model, ProviderError>;
}

/// A type-erased [`DataSource`] working on JSON values.
#[async_trait]
pub trait DynamicDataSource: Send + Sync {
    /// Full type name, e.g. `"circleci_workflow"`.
    fn type_name(&self) -> String;
    /// Attribute schema.
    fn schema(&self) -> Schema;
    /// Type-specific configuration checks.
    fn validate(&self, config: &Value) -> Vec<Diagnostic>;
    /// See [`DataSource::read`].
    async fn read(&self, config: Value) -> Result<Value, ProviderError>;
}

struct Erased<D>(D);

#[async_trait]
impl<D: DataSource> DynamicDataSource for Erased<D> {
    fn type_name(&self) -> String {
        type_name(D::KIND)
    }

    fn schema(&self) -> Schema {
        self.0.schema()
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        match serde_json::from_value::<D::Model>(config.clone()) {
            Ok(model) => self.0.validate(&model),
            Err(_) => Vec::new(),
        }
    }

    async fn read(&self, config: Value) -> Result<Value, ProviderError> {
        let config = serde_json::from_value(config)?;
        Ok(serde_json::to_value(self.0.read(config).await?)?)
    }
}

/// Box a typed data source for the registry.
pub fn erase<D: DataSource>(data_source: D) -> Box<dyn DynamicDataSource> {
    Box::new(Erased(data_source))
}

/// Every data source, keyed by full type name, sharing one client.
pub fn registry(client: Arc<CircleCiClient>) -> BTreeMap<String, Box<dyn DynamicDataSource>> {
    let data_sources = vec![
        erase(context::ContextDataSource::new(client.clone())),
        erase(project::ProjectDataSource::new(client.clone())),
        erase(insight::InsightDataSource::new(client.clone())),
        erase(organization::OrganizationDataSource::new(client.clone())),
        erase(workflow::WorkflowDataSource::new(client.clone())),
        erase(workflows::WorkflowsDataSource::new(client.clone())),
        erase(policies::PoliciesDataSource::new(client.clone())),
        erase(artifacts::ArtifactsDataSource::new(client.clone())),
        erase(tests::TestsDataSource::new(client.clone())),
        erase(jobs::JobsDataSource::new(client)),
    ];

    data_sources
        .into_iter()
        .map(|d| (d.type_name(), d))
        .collect()
}

/// Lookup inputs shared by the context and organization data sources.
pub(crate) enum Lookup<'a> {
    ById(&'a str),
    ByName(&'a str),
}

/// Pick the lookup mode from optional `id`/`name` inputs. `id` wins when
/// both are set.
pub(crate) fn lookup<'a>(
    id: &'a Option<String>,
    name: &'a Option<String>,
) -> Result<Lookup<'a>, ProviderError> {
    let present = |v: &'a Option<String>| v.as_deref().filter(|s| !s.is_empty());
    match (present(id), present(name)) {
        (Some(id), _) => Ok(Lookup::ById(id)),
        (None, Some(name)) => Ok(Lookup::ByName(name)),
        (None, None) => Err(ProviderError::Validation(
            "Either 'id' or 'name' must be specified".to_string(),
        )),
    }
}

/// Diagnostic form of a missing `id`/`name` pair, for config validation.
pub(crate) fn lookup_diagnostics(id: &Option<String>, name: &Option<String>) -> Vec<Diagnostic> {
    match lookup(id, name) {
        Ok(_) => Vec::new(),
        Err(err) => vec![Diagnostic::error("Missing Required Attribute").with_detail(err.message())],
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use crate::resources::test_support::offline_client;

    #[test]
    fn test_registry_contains_every_data_source() {
        let registry = registry(offline_client());
        let names: Vec<_> = registry.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "circleci_artifacts",
                "circleci_context",
                "circleci_insight",
                "circleci_jobs",
                "circleci_organization",
                "circleci_policies",
                "circleci_project",
                "circleci_tests",
                "circleci_workflow",
                "circleci_workflows",
            ]
        );
    }

    #[test]
    fn test_lookup_prefers_id() {
        let id = Some("ctx-1".to_string());
        let name = Some("deploy".to_string());
        assert!(matches!(lookup(&id, &name), Ok(Lookup::ById("ctx-1"))));
        assert!(matches!(lookup(&None, &name), Ok(Lookup::ByName("deploy"))));

        let err = lookup(&None, &Some(String::new())).err().unwrap();
        assert_eq!(err.message(), "Either 'id' or 'name' must be specified");
        assert_eq!(lookup_diagnostics(&None, &None).len(), 1);
    }
}
