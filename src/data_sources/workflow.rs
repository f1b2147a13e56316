//! `circleci_workflow` data source.

use super::DataSource;
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeType, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A workflow as returned by the API, also the element of the workflows list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workflow {
    /// Workflow id.
    pub id: String,
    /// Workflow name.
    pub name: String,
    /// Owning pipeline.
    pub pipeline_id: String,
    /// `vcs/org/repo`.
    pub project_slug: String,
    /// Workflow status.
    pub status: String,
    /// User id that started the workflow.
    pub started_by: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Stop timestamp.
    pub stopped_at: Option<String>,
    /// Tag, e.g. `setup` for setup workflows.
    pub tag: Option<String>,
}

/// Field names and types of [`Workflow`], shared with the workflows list.
pub(crate) fn workflow_fields() -> Vec<(&'static str, AttributeType)> {
    [
        "id",
        "name",
        "pipeline_id",
        "project_slug",
        "status",
        "started_by",
        "created_at",
        "stopped_at",
        "tag",
    ]
    .into_iter()
    .map(|name| (name, AttributeType::String))
    .collect()
}

/// Inputs and outputs of the workflow lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowModel {
    /// Workflow id.
    pub id: String,
    /// Workflow name.
    pub name: Option<String>,
    /// Owning pipeline.
    pub pipeline_id: Option<String>,
    /// `vcs/org/repo`.
    pub project_slug: Option<String>,
    /// Workflow status.
    pub status: Option<String>,
    /// User id that started the workflow.
    pub started_by: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Stop timestamp.
    pub stopped_at: Option<String>,
    /// Workflow tag.
    pub tag: Option<String>,
}

/// Reads one workflow by id.
pub struct WorkflowDataSource {
    client: Arc<CircleCiClient>,
}

impl WorkflowDataSource {
    /// Create the data source bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for WorkflowDataSource {
    type Model = WorkflowModel;
    const KIND: &'static str = "workflow";

    fn schema(&self) -> Schema {
        let schema = Schema::v0()
            .with_description("Use this data source to get information about a workflow.")
            .with_attribute(
                "id",
                Attribute::required_string().with_description("The unique identifier of the workflow."),
            );
        workflow_fields()
            .into_iter()
            .filter(|(name, _)| *name != "id")
            .fold(schema, |schema, (name, _)| {
                schema.with_attribute(name, Attribute::computed_string())
            })
    }

    async fn read(&self, config: WorkflowModel) -> Result<WorkflowModel, ProviderError> {
        if config.id.is_empty() {
            return Err(ProviderError::Validation("The workflow ID is required".to_string()));
        }
        let workflow: Workflow = self
            .client
            .get(&format!("/workflow/{}", config.id))
            .await
            .map_err(|e| ProviderError::client("read workflow", e))?;

        Ok(WorkflowModel {
            id: config.id,
            name: Some(workflow.name),
            pipeline_id: Some(workflow.pipeline_id),
            project_slug: Some(workflow.project_slug),
            status: Some(workflow.status),
            started_by: Some(workflow.started_by),
            created_at: Some(workflow.created_at),
            stopped_at: workflow.stopped_at,
            tag: workflow.tag,
        })
    }
}
