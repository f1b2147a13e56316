//! `circleci_artifacts` data source: files a job stored as artifacts.

use super::DataSource;
use crate::client::{escape_project_slug, CircleCiClient};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One stored artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Artifact {
    /// Path inside the job's artifact store.
    pub path: String,
    /// Parallel node that produced the artifact.
    pub node_index: i64,
    /// Download URL.
    pub url: String,
    /// Human-friendly path.
    pub pretty_path: String,
}

/// Inputs and outputs of the artifacts query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsModel {
    /// `vcs/org/repo`.
    pub project_slug: String,
    /// Job number within the project.
    pub job_number: i64,
    /// Artifacts in server order.
    pub artifacts: Option<Vec<Artifact>>,
}

/// Lists a job's artifacts.
pub struct ArtifactsDataSource {
    client: Arc<CircleCiClient>,
}

impl ArtifactsDataSource {
    /// Create the data source bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for ArtifactsDataSource {
    type Model = ArtifactsModel;
    const KIND: &'static str = "artifacts";

    fn schema(&self) -> Schema {
        let artifact = AttributeType::object([
            ("path", AttributeType::String),
            ("node_index", AttributeType::Int64),
            ("url", AttributeType::String),
            ("pretty_path", AttributeType::String),
        ]);
        Schema::v0()
            .with_description("Use this data source to list the artifacts of a job.")
            .with_attribute(
                "project_slug",
                Attribute::required_string()
                    .with_description("The project slug in the form 'vcs-slug/org-name/repo-name'."),
            )
            .with_attribute("job_number", Attribute::required_int64())
            .with_attribute(
                "artifacts",
                Attribute::new(AttributeType::list(artifact), AttributeFlags::computed()),
            )
    }

    async fn read(&self, config: ArtifactsModel) -> Result<ArtifactsModel, ProviderError> {
        let path = format!(
            "/project/{}/{}/artifacts",
            escape_project_slug(&config.project_slug),
            config.job_number
        );
        let artifacts: Vec<Artifact> = self
            .client
            .get_all_pages(&path, &[])
            .await
            .map_err(|e| ProviderError::client("list artifacts", e))?;

        debug!(
            project_slug = %config.project_slug,
            job_number = config.job_number,
            count = artifacts.len(),
            "Read artifacts"
        );

        Ok(ArtifactsModel {
            artifacts: Some(artifacts),
            ..config
        })
    }
}
