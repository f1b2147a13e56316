//! HTTP client for the CircleCI API v2.
//!
//! Every resource and data source talks to CircleCI through one shared
//! [`CircleCiClient`]. The client sets the auth and content headers, turns
//! error statuses into [`ClientError`], decodes JSON bodies into typed
//! response structs and follows `next_page_token` cursors.
//!
//! No retries are performed. A failed call fails the enclosing operation.

use crate::config::ProviderConfig;
use crate::error::{ApiError, ClientError};
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Value of the `User-Agent` header on every request.
pub const USER_AGENT_VALUE: &str = "terraform-provider-circleci";

/// Header carrying the API token.
pub const TOKEN_HEADER: &str = "Circle-Token";

/// Query parameter carrying the pagination cursor.
pub const PAGE_TOKEN_PARAM: &str = "page-token";

/// One page of a paginated list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    /// Items on this page, in server order.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Cursor for the next page; empty or absent on the last page.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// The cursor for the following page, if there is one.
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Authenticated client bound to one CircleCI API root.
#[derive(Debug, Clone)]
pub struct CircleCiClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl CircleCiClient {
    /// Create a client from resolved provider configuration.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// The API root requests are sent to.
    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    /// Send a request and fail on any status >= 400.
    ///
    /// The body, when present, is serialized as JSON. Error responses are
    /// decoded as [`ApiError`]; bodies that are not structured errors
    /// become [`ClientError::Http`] carrying the raw text.
    pub async fn request<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ClientError>
    where
        B: Serialize + ?Sized,
    {
        self.request_with_query(method, path, &[], body).await
    }

    async fn request_with_query<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Response, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.config.base_url(), path);
        debug!(method = %method, url = %url, "Making CircleCI API request");

        let mut request = self
            .http
            .request(method, &url)
            .header(TOKEN_HEADER, self.config.api_token())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE);

        if !query.is_empty() {
            request = request.query(query);
        }

        if let Some(body) = body {
            let bytes = serde_json::to_vec(body).map_err(ClientError::Encode)?;
            request = request.body(bytes);
        }

        let response = request.send().await?;
        check_status(response).await
    }

    /// GET `path` and decode the response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.get_with_query(path, &[]).await
    }

    /// GET `path` with query parameters and decode the response.
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let response = self
            .request_with_query::<()>(Method::GET, path, query, None)
            .await?;
        decode(response).await
    }

    /// POST `body` to `path` and decode the response.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(Method::POST, path, Some(body)).await?;
        decode(response).await
    }

    /// PUT `body` to `path` and decode the response.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(Method::PUT, path, Some(body)).await?;
        decode(response).await
    }

    /// PATCH `body` to `path` and decode the response.
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(Method::PATCH, path, Some(body)).await?;
        decode(response).await
    }

    /// DELETE `path`, ignoring any response body.
    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.request::<()>(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// POST to an action endpoint (follow, cancel, approve...) without
    /// decoding the response.
    pub async fn post_action(&self, path: &str) -> Result<(), ClientError> {
        self.request::<()>(Method::POST, path, None).await?;
        Ok(())
    }

    /// Fetch every page of a list endpoint.
    ///
    /// Issues GETs with an evolving `page-token` parameter until the server
    /// returns an empty cursor. Items are returned in server order without
    /// deduplication.
    pub async fn get_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, ClientError> {
        let mut items = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = params.to_vec();
            if let Some(token) = next_token.as_deref() {
                query.push((PAGE_TOKEN_PARAM, token));
            }

            let page: Page<T> = self.get_with_query(path, &query).await?;
            let following = page.next_token().map(str::to_string);
            items.extend(page.items);

            match following {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        debug!(path = %path, count = items.len(), "Fetched all pages");
        Ok(items)
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }

    let body = response.text().await?;
    Err(error_from_body(status, &body))
}

fn error_from_body(status: u16, body: &str) -> ClientError {
    match serde_json::from_str::<ApiError>(body) {
        Ok(mut err) => {
            err.status = status;
            ClientError::Api(err)
        }
        Err(_) => ClientError::Http {
            status,
            body: body.to_string(),
        },
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Decode)
}

/// Percent-encode a `vcs/org/repo` project slug into one path segment.
pub fn escape_project_slug(slug: &str) -> String {
    urlencoding::encode(slug).into_owned()
}
