//! `circleci_user`: organization membership.
//!
//! Creating a user sends an invitation. Only the role can change in place;
//! the API does not report the role back, so state keeps the planned one.

use super::{found, required, Resource};
use crate::client::CircleCiClient;
use crate::error::ProviderError;
use crate::ids::parse_composite_id;
use crate::schema::{Attribute, Diagnostic, Schema};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const IMPORT_FORMAT: &str = "org_id:user_id";

/// A user as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct User {
    /// User id.
    pub id: String,
    /// VCS login.
    pub login: String,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Avatar URL.
    pub avatar_url: String,
    /// When the user joined the organization.
    pub joined_at: String,
}

#[derive(Debug, Serialize)]
struct InviteRequest<'a> {
    email: &'a str,
    role: &'a str,
}

#[derive(Debug, Serialize)]
struct RoleRequest<'a> {
    role: &'a str,
}

/// Terraform state of an organization member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserState {
    /// User id.
    pub id: Option<String>,
    /// Owning organization.
    pub org_id: String,
    /// Email address the invitation went to.
    pub email: String,
    /// Organization role.
    pub role: String,
    /// VCS login.
    pub login: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// When the user joined.
    pub joined_at: Option<String>,
}

impl UserState {
    fn user_path(&self, id: &str) -> String {
        format!("/organization/{}/user/{}", self.org_id, id)
    }

    fn refresh(&mut self, user: User) {
        self.id = Some(user.id);
        if !user.email.is_empty() {
            self.email = user.email;
        }
        self.login = Some(user.login);
        self.name = Some(user.name);
        self.avatar_url = Some(user.avatar_url);
        self.joined_at = Some(user.joined_at);
    }
}

/// Manages organization members.
pub struct UserResource {
    client: Arc<CircleCiClient>,
}

impl UserResource {
    /// Create the resource bound to a configured client.
    pub fn new(client: Arc<CircleCiClient>) -> Self {
        Self { client }
    }

    async fn fetch(&self, state: &UserState) -> Result<Option<User>, ProviderError> {
        let id = required(&state.id, "id")?;
        found(
            self.client.get::<User>(&state.user_path(id)).await,
            "read user",
        )
    }
}

#[async_trait]
impl Resource for UserResource {
    type State = UserState;
    const KIND: &'static str = "user";

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("CircleCI organization member.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "org_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The organization ID."),
            )
            .with_attribute(
                "email",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The email address to invite."),
            )
            .with_attribute(
                "role",
                Attribute::required_string().with_description("The user's role in the organization."),
            )
            .with_attribute("login", Attribute::computed_string())
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("avatar_url", Attribute::computed_string())
            .with_attribute("joined_at", Attribute::computed_string())
    }

    async fn create(&self, planned: UserState) -> Result<UserState, ProviderError> {
        let request = InviteRequest {
            email: &planned.email,
            role: &planned.role,
        };
        let user: User = self
            .client
            .post(&format!("/organization/{}/invite", planned.org_id), &request)
            .await
            .map_err(|e| ProviderError::client("invite user", e))?;

        info!(org_id = %planned.org_id, user_id = %user.id, "Invited user");

        let mut state = planned;
        state.refresh(user);
        Ok(state)
    }

    async fn read(&self, current: UserState) -> Result<Option<UserState>, ProviderError> {
        let Some(user) = self.fetch(&current).await? else {
            return Ok(None);
        };
        let mut state = current;
        state.refresh(user);
        Ok(Some(state))
    }

    async fn update(
        &self,
        prior: UserState,
        planned: UserState,
    ) -> Result<(UserState, Vec<Diagnostic>), ProviderError> {
        let id = required(&prior.id, "id")?;
        let path = format!("{}/role", planned.user_path(id));
        let request = RoleRequest {
            role: &planned.role,
        };
        self.client
            .request(Method::PUT, &path, Some(&request))
            .await
            .map_err(|e| ProviderError::client("update user role", e))?;

        info!(user_id = %id, role = %planned.role, "Updated user role");

        let mut state = planned;
        state.id = prior.id.clone();
        match self.fetch(&state).await? {
            Some(user) => state.refresh(user),
            None => {
                return Err(ProviderError::NotFound(format!(
                    "user {} left the organization during update",
                    id
                )))
            }
        }
        Ok((state, Vec::new()))
    }

    async fn delete(&self, current: UserState) -> Result<Vec<Diagnostic>, ProviderError> {
        let id = required(&current.id, "id")?;
        self.client
            .delete(&current.user_path(id))
            .await
            .map_err(|e| ProviderError::client("remove user", e))?;
        info!(user_id = %id, "Removed user from organization");
        Ok(Vec::new())
    }

    fn import(&self, id: &str) -> Result<UserState, ProviderError> {
        let (org_id, user_id) = parse_composite_id(id, IMPORT_FORMAT)?;
        Ok(UserState {
            id: Some(user_id),
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

    fn user_body() -> serde_json::Value {
        json!({
            "id": "u-1",
            "login": "octo",
            "name": "Octo Cat",
            "email": "octo@example.com",
            "avatar_url": "https://avatars.example.com/u-1",
            "joined_at": "2024-05-01T10:00:00Z"
        })
    }

    fn member(role: &str) -> UserState {
        UserState {
            id: Some("u-1".to_string()),
            org_id: "org-1".to_string(),
            email: "octo@example.com".to_string(),
            role: role.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_invites() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/organization/org-1/invite"))
            .and(body_json(json!({"email": "octo@example.com", "role": "member"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(user_body()))
            .expect(1)
            .mount(&server)
            .await;

        let resource = UserResource::new(client_for(&server));
        let mut planned = member("member");
        planned.id = None;
        let state = resource.create(planned).await.unwrap();
        assert_eq!(state.id.as_deref(), Some("u-1"));
        assert_eq!(state.login.as_deref(), Some("octo"));
    }

    #[tokio::test]
    async fn test_update_keeps_planned_role() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/organization/org-1/user/u-1/role"))
            .and(body_json(json!({"role": "admin"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/organization/org-1/user/u-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
            .mount(&server)
            .await;

        let resource = UserResource::new(client_for(&server));
        let (state, _) = resource
            .update(member("member"), member("admin"))
            .await
            .unwrap();
        assert_eq!(state.role, "admin");
        assert_eq!(state.name.as_deref(), Some("Octo Cat"));
    }

    #[tokio::test]
    async fn test_delete_removes_member() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/organization/org-1/user/u-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let resource = UserResource::new(client_for(&server));
        assert!(resource.delete(member("member")).await.unwrap().is_empty());
    }
}
