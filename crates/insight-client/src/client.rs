//! Velog GraphQL client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE, ORIGIN};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use insight_core::PostUuid;

use crate::api::ContentApi;
use crate::error::ClientError;
use crate::queries;
use crate::types::{
    CurrentUserData, CurrentUserLookup, Credentials, GraphQlRequest, GraphQlResponse, PageEntry,
    PostStats, PostsData, PostsInput, PostsVariables, SessionCookies, StatsData, StatsVariables,
};

/// Main GraphQL endpoint.
pub const DEFAULT_API_URL: &str = "https://v3.velog.io/graphql";

/// Statistics endpoint.
pub const DEFAULT_STATS_URL: &str = "https://v2cdn.velog.io/graphql";

const ERROR_BODY_LIMIT: usize = 200;

/// Velog content API client.
///
/// One instance owns one connection pool. Token cookies are sent per request
/// and never stored in a jar, so a client can serve many users.
#[derive(Debug, Clone)]
pub struct VelogClient {
    client: Client,
    api_url: String,
    stats_url: String,
    origin: String,
}

/// Options for configuring the client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// GraphQL endpoint for users and posts.
    pub api_url: String,
    /// GraphQL endpoint for post statistics.
    pub stats_url: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Value of the `origin` header.
    pub origin: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            stats_url: DEFAULT_STATS_URL.to_string(),
            timeout_seconds: 30,
            origin: "https://velog.io".to_string(),
        }
    }
}

impl VelogClient {
    /// Create a client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            // Sessions travel only in the explicit Cookie header.
            .cookie_store(false)
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            api_url: options.api_url,
            stats_url: options.stats_url,
            origin: options.origin,
        })
    }

    async fn post_graphql<V: Serialize + Send + Sync>(
        &self,
        url: &str,
        request: &GraphQlRequest<'_, V>,
        creds: &Credentials,
    ) -> Result<Response, ClientError> {
        let response = self
            .client
            .post(url)
            .header(ORIGIN, &self.origin)
            .header(COOKIE, creds.cookie_header())
            .json(request)
            .send()
            .await?;

        Ok(response)
    }

    /// Decode a successful response, or turn the status into an error.
    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            return serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_LIMIT).collect(),
        })
    }
}

/// Read rotated token cookies from a response.
fn session_cookies(response: &Response) -> SessionCookies {
    let mut cookies = SessionCookies::default();
    for cookie in response.cookies() {
        match cookie.name() {
            "access_token" => cookies.access_token = Some(cookie.value().to_string()),
            "refresh_token" => cookies.refresh_token = Some(cookie.value().to_string()),
            _ => {}
        }
    }
    cookies
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"))
}

#[async_trait]
impl ContentApi for VelogClient {
    async fn fetch_current_user(&self, creds: &Credentials) -> CurrentUserLookup {
        let request: GraphQlRequest<'_, ()> = GraphQlRequest {
            query: queries::CURRENT_USER,
            variables: None,
            operation_name: None,
        };

        let response = match self.post_graphql(&self.api_url, &request, creds).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Current user request failed");
                return CurrentUserLookup::Unavailable;
            }
        };

        let cookies = session_cookies(&response);

        match Self::handle_response::<GraphQlResponse<CurrentUserData>>(response).await {
            Ok(body) => match body.data.and_then(|data| data.current_user) {
                Some(user) => CurrentUserLookup::Authenticated {
                    user: user.into(),
                    cookies,
                },
                None => CurrentUserLookup::Anonymous,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Current user response unusable");
                CurrentUserLookup::Unavailable
            }
        }
    }

    async fn fetch_posts_page(
        &self,
        username: &str,
        cursor: &str,
        limit: u32,
        creds: &Credentials,
    ) -> Result<Vec<PageEntry>, ClientError> {
        let request = GraphQlRequest {
            query: queries::POSTS,
            variables: Some(PostsVariables {
                input: PostsInput {
                    cursor,
                    username,
                    limit,
                    tag: "",
                },
            }),
            operation_name: None,
        };

        let response = self.post_graphql(&self.api_url, &request, creds).await?;
        let body: GraphQlResponse<PostsData> = Self::handle_response(response).await?;

        Ok(body.data.and_then(|data| data.posts).unwrap_or_default())
    }

    async fn fetch_post_stats_once(
        &self,
        post_id: PostUuid,
        creds: &Credentials,
    ) -> Result<PostStats, ClientError> {
        let request = GraphQlRequest {
            query: queries::GET_STATS,
            variables: Some(StatsVariables {
                post_id: post_id.to_string(),
            }),
            operation_name: Some(queries::GET_STATS_OPERATION),
        };

        let response = self.post_graphql(&self.stats_url, &request, creds).await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        if !is_json(&response) {
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("<none>")
                .to_string();
            return Err(ClientError::UnexpectedContentType(content_type));
        }

        let body: GraphQlResponse<StatsData> = Self::handle_response(response).await?;
        body.data
            .and_then(|data| data.get_stats)
            .ok_or(ClientError::MissingField("getStats"))?
            .try_into()
    }
}
