//! `circleci_jobs` data source: every job of a workflow.

use super::DataSource;
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One job of a workflow. Approval jobs carry no job number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowJob {
    /// Job id.
    pub id: String,
    /// Job name.
    pub name: String,
    /// `vcs/org/repo`.
    pub project_slug: String,
    /// Job number within the project.
    pub job_number: Option<i64>,
    /// Job status.
    pub status: String,
    /// Start timestamp.
    pub started_at: Option<String>,
    /// Stop timestamp.
    pub stopped_at: Option<String>,
    /// Approval type, for approval jobs.
    pub approval_type: Option<String>,
    /// Approval request id, for approval jobs.
    pub approval_request_id: Option<String>,
}

/// Inputs and outputs of the jobs query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsModel {
    /// Workflow to list.
    pub workflow_id: String,
    /// Jobs in server order.
    pub jobs: Option<Vec<WorkflowJob>>,
}

/// Lists the jobs of a workflow.
pub struct JobsDataSource {
    client: Arc<CircleCiClient>,
}

impl JobsDataSource {
    /// Create the data source bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for JobsDataSource {
    type Model = JobsModel;
    const KIND: &'static str = "jobs";

    fn schema(&self) -> Schema {
        let job = AttributeType::object([
            ("id", AttributeType::String),
            ("name", AttributeType::String),
            ("project_slug", AttributeType::String),
            ("job_number", AttributeType::Int64),
            ("status", AttributeType::String),
            ("started_at", AttributeType::String),
            ("stopped_at", AttributeType::String),
            ("approval_type", AttributeType::String),
            ("approval_request_id", AttributeType::String),
        ]);
        Schema::v0()
            .with_description("Use this data source to list the jobs of a workflow.")
            .with_attribute("workflow_id", Attribute::required_string())
            .with_attribute(
                "jobs",
                Attribute::new(AttributeType::list(job), AttributeFlags::computed()),
            )
    }

    async fn read(&self, config: JobsModel) -> Result<JobsModel, ProviderError> {
        let jobs: Vec<WorkflowJob> = self
            .client
            .get_all_pages(&format!("/workflow/{}/job", config.workflow_id), &[])
            .await
            .map_err(|e| ProviderError::client("list jobs", e))?;

        Ok(JobsModel {
            workflow_id: config.workflow_id,
            jobs: Some(jobs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::client_for;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_includes_approval_jobs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workflow/wf-1/job"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "j-1", "name": "build", "project_slug": "gh/acme/widgets", "job_number": 12, "status": "success"},
                    {"id": "j-2", "name": "hold", "status": "on_hold", "approval_type": "approval", "approval_request_id": "ap-1"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let data_source = JobsDataSource::new(client_for(&server));
        let model = data_source
            .read(JobsModel {
                workflow_id: "wf-1".to_string(),
                jobs: None,
            })
            .await
            .unwrap();
        let jobs = model.jobs.unwrap();
        assert_eq!(jobs[0].job_number, Some(12));
        assert_eq!(jobs[1].job_number, None);
        assert_eq!(jobs[1].approval_request_id.as_deref(), Some("ap-1"));
    }
}
