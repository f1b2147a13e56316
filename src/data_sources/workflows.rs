//! `circleci_workflows` data source: every workflow of a pipeline.

use super::workflow::{workflow_fields, Workflow};
use super::DataSource;
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Inputs and outputs of the workflows query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsModel {
    /// Pipeline to list.
    pub pipeline_id: String,
    /// Workflows in server order.
    pub workflows: Option<Vec<Workflow>>,
}

/// Lists the workflows of a pipeline.
pub struct WorkflowsDataSource {
    client: Arc<CircleCiClient>,
}

impl WorkflowsDataSource {
    /// Create the data source bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for WorkflowsDataSource {
    type Model = WorkflowsModel;
    const KIND: &'static str = "workflows";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Use this data source to list the workflows of a pipeline.")
            .with_attribute(
                "pipeline_id",
                Attribute::required_string().with_description("The unique identifier of the pipeline."),
            )
            .with_attribute(
                "workflows",
                Attribute::new(
                    AttributeType::list(AttributeType::object(workflow_fields())),
                    AttributeFlags::computed(),
                ),
            )
    }

    async fn read(&self, config: WorkflowsModel) -> Result<WorkflowsModel, ProviderError> {
        if config.pipeline_id.is_empty() {
            return Err(ProviderError::Validation("The pipeline ID is required".to_string()));
        }
        let workflows: Vec<Workflow> = self
            .client
            .get_all_pages(&format!("/pipeline/{}/workflow", config.pipeline_id), &[])
            .await
            .map_err(|e| ProviderError::client("list workflows", e))?;

        debug!(pipeline_id = %config.pipeline_id, count = workflows.len(), "Read workflows");

        Ok(WorkflowsModel {
            pipeline_id: config.pipeline_id,
            workflows: Some(workflows),
        })
    }
}
