//! `circleci_runner`: a self-hosted runner registration.

use super::{found, required, Resource};
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::ids::require_id;
use crate::schema::{Attribute, Diagnostic, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A runner as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Runner {
    /// Runner id.
    pub id: String,
    /// Runner name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// `namespace/class` the runner serves.
    pub resource_class: String,
    /// Platform, e.g. `linux/amd64`.
    pub platform: String,
    /// Last seen IP address.
    pub ip: String,
    /// Host name.
    pub hostname: String,
    /// Agent version.
    pub version: String,
    /// First connection timestamp.
    pub first_connected: String,
    /// Last connection timestamp.
    pub last_connected: String,
    /// Last job timestamp.
    pub last_used: String,
    /// Connection state.
    pub state: String,
}

#[derive(Debug, Serialize)]
struct CreateRunnerRequest<'a> {
    name: &'a str,
    resource_class: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpdateRunnerRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Terraform state of a runner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerState {
    /// Runner id.
    pub id: Option<String>,
    /// Runner name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Resource class served.
    pub resource_class: String,
    /// Platform.
    pub platform: Option<String>,
    /// Last seen IP.
    pub ip: Option<String>,
    /// Host name.
    pub hostname: Option<String>,
    /// Agent version.
    pub version: Option<String>,
    /// First connection timestamp.
    pub first_connected: Option<String>,
    /// Last connection timestamp.
    pub last_connected: Option<String>,
    /// Last job timestamp.
    pub last_used: Option<String>,
    /// Connection state.
    pub state: Option<String>,
}

impl RunnerState {
    fn refresh(&mut self, runner: Runner) {
        let present = |s: String| Some(s).filter(|s| !s.is_empty());
        self.id = Some(runner.id);
        self.name = runner.name;
        if !runner.description.is_empty() || self.description.is_some() {
            self.description = Some(runner.description);
        }
        if !runner.resource_class.is_empty() {
            self.resource_class = runner.resource_class;
        }
        self.platform = present(runner.platform);
        self.ip = present(runner.ip);
        self.hostname = present(runner.hostname);
        self.version = present(runner.version);
        self.first_connected = present(runner.first_connected);
        self.last_connected = present(runner.last_connected);
        self.last_used = present(runner.last_used);
        self.state = present(runner.state);
    }
}

/// Manages self-hosted runners.
pub struct RunnerResource {
    client: Arc<CircleCiClient>,
}

impl RunnerResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Resource for RunnerResource {
    type State = RunnerState;
    const KIND: &'static str = "runner";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("CircleCI self-hosted runner.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute(
                "resource_class",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The resource class in the form 'namespace/name'."),
            )
            .with_attribute("platform", Attribute::computed_string())
            .with_attribute("ip", Attribute::computed_string())
            .with_attribute("hostname", Attribute::computed_string())
            .with_attribute("version", Attribute::computed_string())
            .with_attribute("first_connected", Attribute::computed_string())
            .with_attribute("last_connected", Attribute::computed_string())
            .with_attribute("last_used", Attribute::computed_string())
            .with_attribute("state", Attribute::computed_string())
    }

    async fn create(&self, planned: RunnerState) -> Result<RunnerState, ProviderError> {
        let request = CreateRunnerRequest {
            name: &planned.name,
            resource_class: &planned.resource_class,
            description: planned.description.as_deref(),
        };
        let runner: Runner = self
            .client
            .post("/runner", &request)
            .await
            .map_err(|e| ProviderError::client("create runner", e))?;

        info!(runner_id = %runner.id, resource_class = %planned.resource_class, "Created runner");

        let mut state = planned;
        state.refresh(runner);
        Ok(state)
    }

    async fn read(&self, current: RunnerState) -> Result<Option<RunnerState>, ProviderError> {
        let id = required(&current.id, "id")?;
        let fetched = self.client.get::<Runner>(&format!("/runner/{}", id)).await;
        let Some(runner) = found(fetched, "read runner")? else {
            return Ok(None);
        };

        let mut state = current;
        state.refresh(runner);
        Ok(Some(state))
    }

    async fn update(
        &self,
        prior: RunnerState,
        planned: RunnerState,
    ) -> Result<(RunnerState, Vec<Diagnostic>), ProviderError> {
        let id = required(&prior.id, "id")?;
        let request = UpdateRunnerRequest {
            name: &planned.name,
            description: planned.description.as_deref(),
        };
        let runner: Runner = self
            .client
            .patch(&format!("/runner/{}", id), &request)
            .await
            .map_err(|e| ProviderError::client("update runner", e))?;

        info!(runner_id = %id, "Updated runner");

        let mut state = planned;
        state.refresh(runner);
        Ok((state, Vec::new()))
    }

    async fn delete(&self, current: RunnerState) -> Result<Vec<Diagnostic>, ProviderError> {
        let id = required(&current.id, "id")?;
        self.client
            .delete(&format!("/runner/{}", id))
            .await
            .map_err(|e| ProviderError::client("delete runner", e))?;
        info!(runner_id = %id, "Deleted runner");
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<RunnerState, ProviderError> {
        Ok(RunnerState {
            id: Some(require_id(id)?),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::client_for;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn runner_body(name: &str) -> serde_json::Value {
        json!({
            "id": "r-1",
            "name": name,
            "description": "",
            "resource_class": "acme/linux-large",
            "platform": "linux/amd64",
            "state": "online"
        })
    }

    #[tokio::test]
    async fn test_create_and_patch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/runner"))
            .and(body_json(json!({"name": "builder", "resource_class": "acme/linux-large"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(runner_body("builder")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/runner/r-1"))
            .and(body_json(json!({"name": "builder-2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(runner_body("builder-2")))
            .expect(1)
            .mount(&server)
            .await;

        let resource = RunnerResource::new(client_for(&server));
        let created = resource
            .create(RunnerState {
                name: "builder".to_string(),
                resource_class: "acme/linux-large".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.id.as_deref(), Some("r-1"));
        assert_eq!(created.platform.as_deref(), Some("linux/amd64"));
        assert_eq!(created.ip, None);

        let mut planned = created.clone();
        planned.name = "builder-2".to_string();
        let (updated, _) = resource.update(created, planned).await.unwrap();
        assert_eq!(updated.name, "builder-2");
    }
}
