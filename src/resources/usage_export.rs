//! `circleci_usage_export`: an asynchronous usage report for a date range.
//!
//! The export completes in the background; `status` and `download_url` are
//! picked up by later reads. Nothing about an export can change in place.

use super::{found, required, Resource};
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::ids::parse_composite_id;
use crate::schema::{Attribute, Diagnostic, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const IMPORT_FORMAT: &str = "org_id:export_id";

/// A usage export as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UsageExport {
    /// Export id.
    pub id: String,
    /// Owning organization.
    pub org_id: String,
    /// Range start.
    pub start: String,
    /// Range end.
    pub end: String,
    /// Job status such as `processing` or `completed`.
    pub status: String,
    /// Download location once completed.
    pub download_url: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// When the download expires.
    pub expires_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct UsageExportRequest<'a> {
    start: &'a str,
    end: &'a str,
}

/// Terraform state of a usage export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageExportState {
    /// Export id.
    pub id: Option<String>,
    /// Owning organization.
    pub org_id: String,
    /// Range start.
    pub start: String,
    /// Range end.
    pub end: String,
    /// Export status.
    pub status: Option<String>,
    /// Download location.
    pub download_url: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<String>,
    /// Download expiry.
    pub expires_at: Option<String>,
}

impl UsageExportState {
    fn collection_path(&self) -> String {
        format!("/organization/{}/usage-export", self.org_id)
    }

    fn refresh(&mut self, export: UsageExport) {
        self.id = Some(export.id);
        if !export.start.is_empty() {
            self.start = export.start;
        }
        if !export.end.is_empty() {
            self.end = export.end;
        }
        self.status = Some(export.status);
        self.download_url = export.download_url.filter(|u| !u.is_empty());
        self.created_at = Some(export.created_at);
        self.expires_at = export.expires_at.filter(|e| !e.is_empty());
    }
}

/// Requests organization usage exports.
pub struct UsageExportResource {
    client: Arc<CircleCiClient>,
}

impl UsageExportResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Resource for UsageExportResource {
    type State = UsageExportState;
    const KIND: &'static str = "usage_export";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("CircleCI usage export for an organization and date range.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("org_id", Attribute::required_string().with_force_new())
            .with_attribute(
                "start",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Start of the range, RFC 3339."),
            )
            .with_attribute(
                "end",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("End of the range, RFC 3339."),
            )
            .with_attribute("status", Attribute::computed_string())
            .with_attribute("download_url", Attribute::computed_string())
            .with_attribute("created_at", Attribute::computed_string())
            .with_attribute("expires_at", Attribute::computed_string())
    }

    async fn create(&self, planned: UsageExportState) -> Result<UsageExportState, ProviderError> {
        let request = UsageExportRequest {
            start: &planned.start,
            end: &planned.end,
        };
        let export: UsageExport = self
            .client
            .post(&planned.collection_path(), &request)
            .await
            .map_err(|e| ProviderError::client("create usage export", e))?;

        info!(org_id = %planned.org_id, export_id = %export.id, status = %export.status, "Requested usage export");

        let mut state = planned;
        state.refresh(export);
        Ok(state)
    }

    async fn read(
        &self,
        current: UsageExportState,
    ) -> Result<Option<UsageExportState>, ProviderError> {
        let id = required(&current.id, "id")?;
        let path = format!("{}/{}", current.collection_path(), id);
        let fetched = self.client.get::<UsageExport>(&path).await;
        let Some(export) = found(fetched, "read usage export")? else {
            return Ok(None);
        };

        let mut state = current;
        state.refresh(export);
        Ok(Some(state))
    }

    async fn update(
        &self,
        prior: UsageExportState,
        planned: UsageExportState,
    ) -> Result<(UsageExportState, Vec<Diagnostic>), ProviderError> {
        let mut current = planned;
        current.id = prior.id;
        let state = self
            .read(current)
            .await?
            .ok_or_else(|| ProviderError::NotFound("usage export no longer exists".to_string()))?;
        Ok((state, Vec::new()))
    }

    async fn delete(&self, current: UsageExportState) -> Result<Vec<Diagnostic>, ProviderError> {
        let id = required(&current.id, "id")?;
        let path = format!("{}/{}", current.collection_path(), id);
        self.client
            .delete(&path)
            .await
            .map_err(|e| ProviderError::client("delete usage export", e))?;
        info!(export_id = %id, "Deleted usage export");
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<UsageExportState, ProviderError> {
        let (org_id, export_id) = parse_composite_id(id, IMPORT_FORMAT)?;
        Ok(UsageExportState {
            id: Some(export_id),
            org_id,
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

    fn export_body(status: &str, url: Option<&str>) -> serde_json::Value {
        json!({
            "id": "ex-1",
            "org_id": "org-1",
            "start": "2024-04-01T00:00:00Z",
            "end": "2024-04-30T23:59:59Z",
            "status": status,
            "download_url": url,
            "created_at": "2024-05-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_create_then_completion_is_read() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/organization/org-1/usage-export"))
            .and(body_json(json!({
                "start": "2024-04-01T00:00:00Z",
                "end": "2024-04-30T23:59:59Z"
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(export_body("processing", None)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/organization/org-1/usage-export/ex-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(export_body(
                "completed",
                Some("https://exports.example.com/ex-1.csv"),
            )))
            .mount(&server)
            .await;

        let resource = UsageExportResource::new(client_for(&server));
        let created = resource
            .create(UsageExportState {
                org_id: "org-1".to_string(),
                start: "2024-04-01T00:00:00Z".to_string(),
                end: "2024-04-30T23:59:59Z".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.status.as_deref(), Some("processing"));
        assert_eq!(created.download_url, None);

        let (refreshed, warnings) = resource.update(created.clone(), created).await.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(refreshed.status.as_deref(), Some("completed"));
        assert_eq!(
            refreshed.download_url.as_deref(),
            Some("https://exports.example.com/ex-1.csv")
        );
    }
}
