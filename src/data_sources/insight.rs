//! `circleci_insight` data source: workflow summary metrics for a project.

use super::DataSource;
use crate::client::{escape_project_slug, CircleCiClient};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Summary metrics as returned by the insights API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InsightSummary {
    /// Total workflow runs.
    pub total_runs: i64,
    /// Successful workflow runs.
    pub successful_runs: i64,
    /// Median duration in seconds.
    #[serde(rename = "median_duration_sec")]
    pub median_duration: f64,
    /// 95th percentile duration in seconds.
    #[serde(rename = "p95_duration_sec")]
    pub p95_duration: f64,
    /// Fraction of successful runs.
    pub success_rate: f64,
    /// Average runs per day.
    pub throughput: f64,
}

/// Metrics object in the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// Total workflow runs.
    pub total_runs: i64,
    /// Successful workflow runs.
    pub successful_runs: i64,
    /// Median duration in seconds.
    pub median_duration: f64,
    /// 95th percentile duration in seconds.
    pub p95_duration: f64,
    /// Fraction of successful runs.
    pub success_rate: f64,
    /// Average runs per day.
    pub throughput: f64,
}

impl From<InsightSummary> for Metrics {
    fn from(summary: InsightSummary) -> Self {
        Self {
            total_runs: summary.total_runs,
            successful_runs: summary.successful_runs,
            median_duration: summary.median_duration,
            p95_duration: summary.p95_duration,
            success_rate: summary.success_rate,
            throughput: summary.throughput,
        }
    }
}

/// Inputs and outputs of the insight query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightModel {
    /// `vcs/org/repo`.
    pub project_slug: String,
    /// Branch filter.
    pub branch: Option<String>,
    /// Workflow name filter.
    pub workflow: Option<String>,
    /// Computed metrics.
    pub metrics: Option<Metrics>,
}

/// Reads workflow insights.
pub struct InsightDataSource {
    client: Arc<CircleCiClient>,
}

impl InsightDataSource {
    /// Create the data source bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for InsightDataSource {
    type Model = InsightModel;
    const KIND: &'static str = "insight";

    fn schema(&self) -> Schema {
        let metrics = AttributeType::object([
            ("total_runs", AttributeType::Int64),
            ("successful_runs", AttributeType::Int64),
            ("median_duration", AttributeType::Float64),
            ("p95_duration", AttributeType::Float64),
            ("success_rate", AttributeType::Float64),
            ("throughput", AttributeType::Float64),
        ]);
        Schema::v0()
            .with_description("Use this data source to get insights and metrics about your workflows.")
            .with_attribute(
                "project_slug",
                Attribute::required_string()
                    .with_description("The project slug in the form 'vcs-slug/org-name/repo-name'."),
            )
            .with_attribute(
                "branch",
                Attribute::optional_string()
                    .with_description("The branch name to get insights for. Defaults to the default branch."),
            )
            .with_attribute(
                "workflow",
                Attribute::optional_string().with_description(
                    "The workflow name to get insights for. If not specified, gets insights for all workflows.",
                ),
            )
            .with_attribute(
                "metrics",
                Attribute::new(metrics, AttributeFlags::computed())
                    .with_description("The workflow metrics and insights."),
            )
    }

    async fn read(&self, config: InsightModel) -> Result<InsightModel, ProviderError> {
        let path = format!(
            "/insights/pages/{}/summary",
            escape_project_slug(&config.project_slug)
        );
        let mut query = Vec::new();
        if let Some(branch) = config.branch.as_deref().filter(|b| !b.is_empty()) {
            query.push(("branch", branch));
        }
        if let Some(workflow) = config.workflow.as_deref().filter(|w| !w.is_empty()) {
            query.push(("workflow_name", workflow));
        }

        let summary: InsightSummary = self
            .client
            .get_with_query(&path, &query)
            .await
            .map_err(|e| ProviderError::client("read insights", e))?;

        Ok(InsightModel {
            metrics: Some(summary.into()),
            ..config
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::client_for;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_read_maps_duration_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/insights/pages/gh%2Facme%2Fwidgets/summary"))
            .and(query_param("branch", "main"))
            .and(query_param("workflow_name", "build"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_runs": 40,
                "successful_runs": 38,
                "median_duration_sec": 212.5,
                "p95_duration_sec": 480.0,
                "success_rate": 0.95,
                "throughput": 5.7
            })))
            .expect(1)
            .mount(&server)
            .await;

        let data_source = InsightDataSource::new(client_for(&server));
        let model = data_source
            .read(InsightModel {
                project_slug: "gh/acme/widgets".to_string(),
                branch: Some("main".to_string()),
                workflow: Some("build".to_string()),
                metrics: None,
            })
            .await
            .unwrap();
        let metrics = model.metrics.unwrap();
        assert_eq!(metrics.total_runs, 40);
        assert_eq!(metrics.median_duration, 212.5);
        assert_eq!(metrics.p95_duration, 480.0);
        assert_eq!(model.branch.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn test_filters_are_optional() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/insights/pages/gh%2Facme%2Fwidgets/summary"))
            .and(query_param_is_missing("branch"))
            .and(query_param_is_missing("workflow_name"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_runs": 0})))
            .expect(1)
            .mount(&server)
            .await;

        let data_source = InsightDataSource::new(client_for(&server));
        let model = data_source
            .read(InsightModel {
                project_slug: "gh/acme/widgets".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(model.metrics.unwrap().success_rate, 0.0);
    }
}
