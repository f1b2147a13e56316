//! `circleci_job`: actions against an existing job.
//!
//! A job is never created or destroyed by the provider. The resource tracks
//! an existing job and dispatches its optional `action` on create and on
//! every update. [`perform_action`] exposes the same command directly.

use super::{found, Resource};
use crate::client::{escape_project_slug, CircleCiClient};
use crate::error::ProviderError;
use crate::ids::{composite_id, parse_composite_id, parse_job_number};
use crate::schema::{Attribute, Diagnostic, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

const IMPORT_FORMAT: &str = "project_slug:job_number";

/// A command that can be dispatched against a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    /// Cancel a running job.
    Cancel,
    /// Approve a held approval job.
    Approve {
        /// Workflow holding the approval.
        workflow_id: String,
        /// Approval request id.
        approval_id: String,
    },
    /// Rerun the job.
    Rerun,
}

impl JobAction {
    /// Build an action from its configured name and companions.
    ///
    /// Every precondition is checked here so a bad action never reaches
    /// the network.
    pub fn parse(
        action: &str,
        approval_id: Option<&str>,
        workflow_id: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let present = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);
        match action {
            "cancel" => Ok(Self::Cancel),
            "rerun" => Ok(Self::Rerun),
            "approve" => {
                let approval_id = present(approval_id).ok_or_else(|| {
                    ProviderError::FailedPrecondition(
                        "approval_id is required for approve action".to_string(),
                    )
                })?;
                let workflow_id = present(workflow_id).ok_or_else(|| {
                    ProviderError::FailedPrecondition(
                        "workflow_id is required for approve action".to_string(),
                    )
                })?;
                Ok(Self::Approve {
                    workflow_id,
                    approval_id,
                })
            }
            other => Err(ProviderError::Validation(format!(
                "unsupported action: {}. Supported actions: cancel, approve, rerun",
                other
            ))),
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancel => write!(f, "cancel"),
            Self::Approve { .. } => write!(f, "approve"),
            Self::Rerun => write!(f, "rerun"),
        }
    }
}

/// Dispatch `action` against job `number` of `project_slug`.
pub async fn perform_action(
    client: &CircleCiClient,
    project_slug: &str,
    number: i64,
    action: &JobAction,
) -> Result<(), ProviderError> {
    let job_path = format!("/project/{}/job/{}", escape_project_slug(project_slug), number);
    let path = match action {
        JobAction::Cancel => format!("{}/cancel", job_path),
        JobAction::Rerun => format!("{}/rerun", job_path),
        JobAction::Approve {
            workflow_id,
            approval_id,
        } => format!("/workflow/{}/approve/{}", workflow_id, approval_id),
    };

    client
        .post_action(&path)
        .await
        .map_err(|e| ProviderError::client(format!("{} job", action), e))?;

    info!(project_slug = %project_slug, job_number = number, action = %action, "Performed job action");
    Ok(())
}

/// A job as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Job {
    /// Job UUID.
    pub id: String,
    /// Per-project job number.
    #[serde(alias = "number")]
    pub job_number: i64,
    /// Job name.
    pub name: String,
    /// Owning project.
    pub project_slug: String,
    /// Status such as `running` or `success`.
    pub status: String,
    /// Start timestamp.
    pub started_at: Option<String>,
    /// Stop timestamp.
    pub stopped_at: Option<String>,
    /// Job type, e.g. `approval`.
    #[serde(rename = "type")]
    pub job_type: Option<String>,
}

/// Terraform state of a tracked job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobState {
    /// `project_slug:job_number`.
    pub id: Option<String>,
    /// Owning project.
    pub project_slug: String,
    /// Per-project job number.
    pub job_number: i64,
    /// Workflow, needed to approve.
    pub workflow_id: Option<String>,
    /// Command to dispatch.
    pub action: Option<String>,
    /// Approval request id, needed to approve.
    pub approval_id: Option<String>,
    /// Job name.
    pub name: Option<String>,
    /// Job status.
    pub status: Option<String>,
    /// Start timestamp.
    pub started_at: Option<String>,
    /// Stop timestamp.
    pub stopped_at: Option<String>,
    /// Job type.
    #[serde(rename = "type")]
    pub job_type: Option<String>,
}

impl JobState {
    fn action(&self) -> Result<Option<JobAction>, ProviderError> {
        match self.action.as_deref().filter(|a| !a.is_empty()) {
            Some(action) => JobAction::parse(
                action,
                self.approval_id.as_deref(),
                self.workflow_id.as_deref(),
            )
            .map(Some),
            None => Ok(None),
        }
    }

    fn refresh(&mut self, job: Job) {
        self.id = Some(composite_id(&self.project_slug, &self.job_number.to_string()));
        self.name = Some(job.name);
        self.status = Some(job.status);
        self.started_at = job.started_at;
        self.stopped_at = job.stopped_at.filter(|s| !s.is_empty());
        self.job_type = job.job_type.filter(|t| !t.is_empty());
    }
}

/// Tracks jobs and dispatches job actions.
pub struct JobResource {
    client: Arc<CircleCiClient>,
}

impl JobResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }

    async fn fetch(&self, state: &JobState) -> Result<Option<Job>, ProviderError> {
        let path = format!(
            "/project/{}/job/{}",
            escape_project_slug(&state.project_slug),
            state.job_number
        );
        found(self.client.get::<Job>(&path).await, "read job")
    }

    async fn dispatch_and_refresh(&self, planned: JobState) -> Result<JobState, ProviderError> {
        if let Some(action) = planned.action()? {
            perform_action(&self.client, &planned.project_slug, planned.job_number, &action)
                .await?;
        }

        let job = self.fetch(&planned).await?.ok_or_else(|| {
            ProviderError::NotFound(format!(
                "job {} of {} not found",
                planned.job_number, planned.project_slug
            ))
        })?;

        let mut state = planned;
        state.refresh(job);
        Ok(state)
    }
}

#[async_trait]
impl Resource for JobResource {
    type State = JobState;
    const KIND: &'static str = "job";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "CircleCI Job resource. This resource allows you to manage CircleCI jobs, including canceling, approving, or rerunning them.",
            )
            .with_attribute(
                "id",
                Attribute::computed_string()
                    .with_description("Identifier in the form project_slug:job_number."),
            )
            .with_attribute("project_slug", Attribute::required_string().with_force_new())
            .with_attribute(
                "job_number",
                Attribute::required_int64().with_force_new(),
            )
            .with_attribute(
                "workflow_id",
                Attribute::optional_string()
                    .with_description("The workflow holding the approval. Required for 'approve'."),
            )
            .with_attribute(
                "action",
                Attribute::optional_string()
                    .with_description("Action to perform: 'cancel', 'approve' or 'rerun'."),
            )
            .with_attribute(
                "approval_id",
                Attribute::optional_string()
                    .with_description("The approval request id. Required for 'approve'."),
            )
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("status", Attribute::computed_string())
            .with_attribute("started_at", Attribute::computed_string())
            .with_attribute("stopped_at", Attribute::computed_string())
            .with_attribute("type", Attribute::computed_string())
    }

    fn validate(&self, config: &JobState) -> Vec<Diagnostic> {
        match config.action() {
            Ok(_) => Vec::new(),
            Err(err) => vec![err.to_diagnostic().with_attribute("action")],
        }
    }

    async fn create(&self, planned: JobState) -> Result<JobState, ProviderError> {
        self.dispatch_and_refresh(planned).await
    }

    async fn read(&self, current: JobState) -> Result<Option<JobState>, ProviderError> {
        let Some(job) = self.fetch(&current).await? else {
            return Ok(None);
        };
        let mut state = current;
        state.refresh(job);
        Ok(Some(state))
    }

    async fn update(
        &self,
        _prior: JobState,
        planned: JobState,
    ) -> Result<(JobState, Vec<Diagnostic>), ProviderError> {
        Ok((self.dispatch_and_refresh(planned).await?, Vec::new()))
    }

    async fn delete(&self, current: JobState) -> Result<Vec<Diagnostic>, ProviderError> {
        info!(
            project_slug = %current.project_slug,
            job_number = current.job_number,
            "Job removed from state; it remains in CircleCI"
        );
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<JobState, ProviderError> {
        let (project_slug, number) = parse_composite_id(id, IMPORT_FORMAT)?;
        Ok(JobState {
            id: Some(id.to_string()),
            project_slug,
            job_number: parse_job_number(&number)?,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{client_for, offline_client};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JOB_PATH: &str = "/project/gh%2Facme%2Fwidgets/job/7";

    fn job_body(status: &str) -> serde_json::Value {
        json!({
            "id": "5f6a1d2c-0000-4000-8000-000000000007",
            "number": 7,
            "name": "hold",
            "project_slug": "gh/acme/widgets",
            "status": status,
            "started_at": "2024-05-01T10:00:00Z",
            "stopped_at": null,
            "type": "approval"
        })
    }

    fn tracked(action: Option<&str>) -> JobState {
        JobState {
            project_slug: "gh/acme/widgets".to_string(),
            job_number: 7,
            action: action.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(JobAction::parse("cancel", None, None).unwrap(), JobAction::Cancel);
        assert_eq!(JobAction::parse("rerun", None, None).unwrap(), JobAction::Rerun);

        let err = JobAction::parse("pause", None, None).unwrap_err();
        assert_eq!(
            err.message(),
            "unsupported action: pause. Supported actions: cancel, approve, rerun"
        );
    }

    #[test]
    fn test_approve_requires_companions() {
        let err = JobAction::parse("approve", None, Some("wf-1")).unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
        assert!(err.message().contains("approval_id is required"));

        let err = JobAction::parse("approve", Some("ap-1"), Some("")).unwrap_err();
        assert!(err.message().contains("workflow_id is required"));

        assert_eq!(
            JobAction::parse("approve", Some("ap-1"), Some("wf-1")).unwrap(),
            JobAction::Approve {
                workflow_id: "wf-1".to_string(),
                approval_id: "ap-1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_approve_without_approval_id_sends_nothing() {
        let server = MockServer::start().await;
        let resource = JobResource::new(client_for(&server));
        let mut state = tracked(Some("approve"));
        state.workflow_id = Some("wf-1".to_string());

        let err = resource.create(state).await.unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_approve_posts_to_workflow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/workflow/wf-1/approve/ap-1"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"message": "Accepted."})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JOB_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_body("success")))
            .mount(&server)
            .await;

        let resource = JobResource::new(client_for(&server));
        let mut state = tracked(Some("approve"));
        state.workflow_id = Some("wf-1".to_string());
        state.approval_id = Some("ap-1".to_string());

        let state = resource.create(state).await.unwrap();
        assert_eq!(state.id.as_deref(), Some("gh/acme/widgets:7"));
        assert_eq!(state.status.as_deref(), Some("success"));
        assert_eq!(state.job_type.as_deref(), Some("approval"));
        assert_eq!(state.stopped_at, None);
    }

    #[tokio::test]
    async fn test_update_dispatches_cancel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}/cancel", JOB_PATH)))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"message": "Accepted."})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JOB_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_body("canceled")))
            .mount(&server)
            .await;

        let resource = JobResource::new(client_for(&server));
        let (state, _) = resource
            .update(tracked(None), tracked(Some("cancel")))
            .await
            .unwrap();
        assert_eq!(state.status.as_deref(), Some("canceled"));
    }

    #[tokio::test]
    async fn test_delete_has_no_remote_effect() {
        let server = MockServer::start().await;
        let resource = JobResource::new(client_for(&server));
        assert!(resource.delete(tracked(None)).await.unwrap().is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn test_import_parses_job_number() {
        let resource = JobResource::new(offline_client());
        let state = resource.import("gh/acme/widgets:7").unwrap();
        assert_eq!(state.project_slug, "gh/acme/widgets");
        assert_eq!(state.job_number, 7);

        assert!(resource.import("gh/acme/widgets:seven").is_err());
    }
}
