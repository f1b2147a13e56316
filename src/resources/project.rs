//! `circleci_project`: following a VCS repository on CircleCI.
//!
//! Creating a project follows it and deleting one unfollows it. Everything
//! except the slug is owned by the VCS and read back.

use super::{found, Resource};
use crate::client::{escape_project_slug, CircleCiClient};
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// VCS details nested in a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VcsInfo {
    /// Repository URL.
    pub vcs_url: String,
    /// VCS provider, e.g. `GitHub`.
    pub provider: String,
    /// Default branch of the repository.
    pub default_branch: String,
}

/// A project as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Project {
    /// Project id.
    pub id: String,
    /// `vcs/org/repo`.
    pub slug: String,
    /// Repository name.
    pub name: String,
    /// Owning organization.
    #[serde(rename = "organization_name")]
    pub organization: String,
    /// VCS details.
    pub vcs_info: VcsInfo,
}

/// Terraform state of a followed project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectState {
    /// Project id.
    pub id: Option<String>,
    /// `vcs/org/repo`.
    pub slug: String,
    /// Repository name.
    pub name: Option<String>,
    /// Owning organization.
    pub organization: Option<String>,
    /// Repository URL.
    pub vcs_url: Option<String>,
    /// VCS provider.
    pub vcs_type: Option<String>,
    /// Default branch.
    pub default_branch: Option<String>,
}

impl ProjectState {
    fn refresh(&mut self, project: Project) {
        self.id = Some(project.id);
        self.name = Some(project.name);
        self.organization = Some(project.organization);
        self.vcs_url = Some(project.vcs_info.vcs_url);
        self.vcs_type = Some(project.vcs_info.provider);
        self.default_branch = Some(project.vcs_info.default_branch);
    }
}

/// Manages followed projects.
pub struct ProjectResource {
    client: Arc<CircleCiClient>,
}

impl ProjectResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }

    async fn fetch(&self, slug: &str) -> Result<Option<Project>, ProviderError> {
        let path = format!("/project/{}", escape_project_slug(slug));
        found(self.client.get::<Project>(&path).await, "read project")
    }
}

#[async_trait]
impl Resource for ProjectResource {
    type State = ProjectState;
    const KIND: &'static str = "project";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "CircleCI Project resource. Projects contain the build configuration and history for a repository.",
            )
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("The unique identifier of the project."),
            )
            .with_attribute(
                "slug",
                Attribute::required_string().with_force_new().with_description(
                    "The project slug in the form 'vcs-slug/org-name/repo-name' (e.g., 'gh/circleci/circleci-docs').",
                ),
            )
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("organization", Attribute::computed_string())
            .with_attribute("vcs_url", Attribute::computed_string())
            .with_attribute("vcs_type", Attribute::computed_string())
            .with_attribute("default_branch", Attribute::computed_string())
    }

    async fn create(&self, planned: ProjectState) -> Result<ProjectState, ProviderError> {
        let path = format!("/project/{}/follow", escape_project_slug(&planned.slug));
        self.client
            .post_action(&path)
            .await
            .map_err(|e| ProviderError::client("follow project", e))?;
        info!(slug = %planned.slug, "Followed project");

        let project = self.fetch(&planned.slug).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("project {} not found after follow", planned.slug))
        })?;

        let mut state = planned;
        state.refresh(project);
        Ok(state)
    }

    async fn read(&self, current: ProjectState) -> Result<Option<ProjectState>, ProviderError> {
        let Some(project) = self.fetch(&current.slug).await? else {
            return Ok(None);
        };
        let mut state = current;
        state.refresh(project);
        Ok(Some(state))
    }

    async fn update(
        &self,
        _prior: ProjectState,
        planned: ProjectState,
    ) -> Result<(ProjectState, Vec<Diagnostic>), ProviderError> {
        let project = self.fetch(&planned.slug).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("project {} no longer exists", planned.slug))
        })?;

        let mut state = planned;
        state.refresh(project);
        let warning = Diagnostic::warning("Project Update").with_detail(
            "CircleCI projects are primarily read-only. Most project settings are managed through separate resources.",
        );
        Ok((state, vec![warning]))
    }

    async fn delete(&self, current: ProjectState) -> Result<Vec<Diagnostic>, ProviderError> {
        let path = format!("/project/{}/unfollow", escape_project_slug(&current.slug));
        self.client
            .post_action(&path)
            .await
            .map_err(|e| ProviderError::client("unfollow project", e))?;
        info!(slug = %current.slug, "Unfollowed project");
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<ProjectState, ProviderError> {
        if id.trim().is_empty() {
            return Err(ProviderError::InvalidRequest(
                "Expected a project slug such as gh/org/repo".to_string(),
            ));
        }
        Ok(ProjectState {
            slug: id.to_string(),
            ..Default::default()
        })
    }
}
