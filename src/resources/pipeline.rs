//! `circleci_pipeline`: a triggered pipeline run.
//!
//! A pipeline is triggered once against exactly one of a branch or a tag and
//! never changes afterwards. Deleting it only cancels a run still in
//! progress; a failed cancel is a warning, not an error.

use super::{found, required, update_not_supported, Resource};
use crate::client::{escape_project_slug, CircleCiClient};
use crate::error::ProviderError;
use crate::ids::require_id;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

const RUNNING: &str = "running";

/// The ref a pipeline is triggered against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    /// A branch name.
    Branch(String),
    /// A tag name.
    Tag(String),
}

impl Revision {
    /// Pick the revision from optional branch and tag values.
    pub fn from_parts(branch: Option<&str>, tag: Option<&str>) -> Result<Self, Diagnostic> {
        match (branch, tag) {
            (Some(branch), None) => Ok(Self::Branch(branch.to_string())),
            (None, Some(tag)) => Ok(Self::Tag(tag.to_string())),
            (None, None) => Err(Diagnostic::error("Missing Required Attribute")
                .with_detail("Either 'branch' or 'tag' must be specified.")
                .with_attribute("branch")),
            (Some(_), Some(_)) => Err(Diagnostic::error("Conflicting Attributes")
                .with_detail("Cannot specify both 'branch' and 'tag'.")
                .with_attribute("branch")),
        }
    }
}

/// Commit details attached to a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commit {
    /// First line of the commit message.
    pub subject: String,
    /// Rest of the commit message.
    pub body: String,
}

/// VCS details attached to a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineVcs {
    /// VCS provider name.
    pub provider_name: String,
    /// Repository URL.
    pub target_repository_url: String,
    /// Branch, when triggered on one.
    pub branch: String,
    /// Review (pull request) id.
    pub review_id: String,
    /// Review (pull request) URL.
    pub review_url: String,
    /// Commit SHA.
    pub revision: String,
    /// Tag, when triggered on one.
    pub tag: String,
    /// Commit details.
    pub commit: Commit,
}

/// A pipeline as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Pipeline {
    /// Pipeline id.
    pub id: String,
    /// Per-project sequence number.
    pub number: i64,
    /// Owning project.
    pub project_slug: String,
    /// Lifecycle state such as `created` or `running`.
    pub state: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
    /// VCS details.
    pub vcs: PipelineVcs,
}

#[derive(Debug, Serialize)]
struct TriggerPipelineRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<&'a BTreeMap<String, String>>,
}

/// Terraform state of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineState {
    /// Pipeline id.
    pub id: Option<String>,
    /// Owning project.
    pub project_slug: String,
    /// Branch to build.
    pub branch: Option<String>,
    /// Tag to build.
    pub tag: Option<String>,
    /// Pipeline parameters.
    pub parameters: Option<BTreeMap<String, String>>,
    /// Per-project sequence number.
    pub number: Option<i64>,
    /// Lifecycle state.
    pub state: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Last update timestamp.
    pub updated_at: Option<String>,
    /// VCS details.
    pub vcs: Option<PipelineVcs>,
}

impl PipelineState {
    fn revision(&self) -> Result<Revision, Diagnostic> {
        Revision::from_parts(self.branch.as_deref(), self.tag.as_deref())
    }

    fn refresh(&mut self, pipeline: Pipeline) {
        self.id = Some(pipeline.id);
        self.number = Some(pipeline.number);
        self.state = Some(pipeline.state);
        self.created_at = Some(pipeline.created_at);
        self.updated_at = Some(pipeline.updated_at);
        self.vcs = Some(pipeline.vcs);
    }
}

/// Triggers pipelines.
pub struct PipelineResource {
    client: Arc<CircleCiClient>,
}

impl PipelineResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

fn vcs_type() -> AttributeType {
    AttributeType::object([
        ("provider_name", AttributeType::String),
        ("target_repository_url", AttributeType::String),
        ("branch", AttributeType::String),
        ("review_id", AttributeType::String),
        ("review_url", AttributeType::String),
        ("revision", AttributeType::String),
        ("tag", AttributeType::String),
        (
            "commit",
            AttributeType::object([
                ("subject", AttributeType::String),
                ("body", AttributeType::String),
            ]),
        ),
    ])
}

#[async_trait]
impl Resource for PipelineResource {
    type State = PipelineState;
    const KIND: &'static str = "pipeline";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "CircleCI Pipeline resource. This resource allows you to trigger pipeline runs programmatically.",
            )
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "project_slug",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The project slug in the form 'vcs-slug/org-name/repo-name'."),
            )
            .with_attribute(
                "branch",
                Attribute::optional_string()
                    .with_force_new()
                    .with_description("The branch to build. Conflicts with 'tag'."),
            )
            .with_attribute(
                "tag",
                Attribute::optional_string()
                    .with_force_new()
                    .with_description("The tag to build. Conflicts with 'branch'."),
            )
            .with_attribute(
                "parameters",
                Attribute::optional_string_map()
                    .with_force_new()
                    .with_description("Pipeline parameters."),
            )
            .with_attribute("number", Attribute::computed_int64())
            .with_attribute(
                "state",
                Attribute::computed_string().with_description("The current state of the pipeline."),
            )
            .with_attribute("created_at", Attribute::computed_string())
            .with_attribute("updated_at", Attribute::computed_string())
            .with_attribute("vcs", Attribute::new(vcs_type(), AttributeFlags::computed()))
    }

    fn validate(&self, config: &PipelineState) -> Vec<Diagnostic> {
        config.revision().err().into_iter().collect()
    }

    async fn create(&self, planned: PipelineState) -> Result<PipelineState, ProviderError> {
        let revision = planned
            .revision()
            .map_err(|d| ProviderError::Validation(d.detail.unwrap_or(d.summary)))?;
        let (branch, tag) = match &revision {
            Revision::Branch(branch) => (Some(branch.as_str()), None),
            Revision::Tag(tag) => (None, Some(tag.as_str())),
        };

        let request = TriggerPipelineRequest {
            branch,
            tag,
            parameters: planned.parameters.as_ref().filter(|p| !p.is_empty()),
        };
        let path = format!("/project/{}/pipeline", escape_project_slug(&planned.project_slug));
        let pipeline: Pipeline = self
            .client
            .post(&path, &request)
            .await
            .map_err(|e| ProviderError::client("trigger pipeline", e))?;

        info!(
            project_slug = %planned.project_slug,
            pipeline_id = %pipeline.id,
            number = pipeline.number,
            "Triggered pipeline"
        );

        let mut state = planned;
        state.refresh(pipeline);
        Ok(state)
    }

    async fn read(&self, current: PipelineState) -> Result<Option<PipelineState>, ProviderError> {
        let id = required(&current.id, "id")?;
        let fetched = self.client.get::<Pipeline>(&format!("/pipeline/{}", id)).await;
        let Some(pipeline) = found(fetched, "read pipeline")? else {
            return Ok(None);
        };

        let mut state = current;
        if state.project_slug.is_empty() {
            state.project_slug = pipeline.project_slug.clone();
        }
        state.refresh(pipeline);
        Ok(Some(state))
    }

    async fn update(
        &self,
        _prior: PipelineState,
        _planned: PipelineState,
    ) -> Result<(PipelineState, Vec<Diagnostic>), ProviderError> {
        Err(update_not_supported(
            "Pipelines cannot be updated once created. To trigger a new pipeline, create a new resource.",
        ))
    }

    async fn delete(&self, current: PipelineState) -> Result<Vec<Diagnostic>, ProviderError> {
        if current.state.as_deref() != Some(RUNNING) {
            return Ok(Vec::new());
        }
        let Some(id) = current.id.as_deref() else {
            return Ok(Vec::new());
        };

        match self
            .client
            .post_action(&format!("/pipeline/{}/cancel", id))
            .await
        {
            Ok(()) => {
                info!(pipeline_id = %id, "Cancelled running pipeline");
                Ok(Vec::new())
            }
            Err(err) => {
                warn!(pipeline_id = %id, error = %err, "Could not cancel running pipeline");
                Ok(vec![Diagnostic::warning("Pipeline Cancel Failed")
                    .with_detail(format!("Could not cancel running pipeline: {}", err))])
            }
        }
    }

    fn import(&self, id: &str) -> Result<PipelineState, ProviderError> {
        Ok(PipelineState {
            id: Some(require_id(id)?),
            ..Default::default()
        })
    }
}
