//! `circleci_project` data source.

use super::DataSource;
use crate::client::{escape_project_slug, CircleCiClient};
use crate::error::ProviderError;
use crate::resources::project::Project;
use crate::schema::{Attribute, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Inputs and outputs of the project lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectModel {
    /// `vcs/org/repo`.
    pub slug: String,
    /// Project id.
    pub id: Option<String>,
    /// Repository name.
    pub name: Option<String>,
    /// Owning organization.
    pub organization: Option<String>,
    /// Repository URL.
    pub vcs_url: Option<String>,
    /// VCS provider.
    pub vcs_type: Option<String>,
}

/// Reads a project by slug.
pub struct ProjectDataSource {
    client: Arc<CircleCiClient>,
}

impl ProjectDataSource {
    /// Create the data source bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for ProjectDataSource {
    type Model = ProjectModel;
    const KIND: &'static str = "project";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Use this data source to get information about a project.")
            .with_attribute(
                "slug",
                Attribute::required_string()
                    .with_description("The project slug in the form 'vcs-slug/org-name/repo-name'."),
            )
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("organization", Attribute::computed_string())
            .with_attribute("vcs_url", Attribute::computed_string())
            .with_attribute("vcs_type", Attribute::computed_string())
    }

    async fn read(&self, config: ProjectModel) -> Result<ProjectModel, ProviderError> {
        let path = format!("/project/{}", escape_project_slug(&config.slug));
        let project: Project = self
            .client
            .get(&path)
            .await
            .map_err(|e| ProviderError::client("read project", e))?;

        Ok(ProjectModel {
            slug: config.slug,
            id: Some(project.id),
            name: Some(project.name),
            organization: Some(project.organization),
            vcs_url: Some(project.vcs_info.vcs_url),
            vcs_type: Some(project.vcs_info.provider),
        })
    }
}
