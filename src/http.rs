//! HTTP client for Microsoft Graph
//!
//! This module provides the transport used by the Graph directory backend:
//! - Bearer authentication through a cached [`TokenProvider`]
//! - Connection pooling and TCP keepalive for a long interactive session
//! - A token-bucket rate limiter applied before every request
//! - Backoff on throttling responses (429/503) for reads only
//! - `@odata.nextLink` paging for collection reads
//! - Mapping of Graph error bodies to [`DirectoryError`]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{Credentials, TokenProvider};
use crate::directory::DirectoryError;
use crate::rate_limit::{create_graph_limiter, RateLimiter};
use crate::retry::{parse_retry_after, with_backoff, RetryConfig, RetryDecision};

/// Default Graph endpoint
pub const GRAPH_V1_URL: &str = "https://graph.microsoft.com/v1.0";

/// One page of a Graph collection
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Failure of one read attempt, before retry classification
enum AttemptError {
    Throttled {
        retry_after: Option<Duration>,
        error: DirectoryError,
    },
    Failed(DirectoryError),
}

impl AttemptError {
    fn into_inner(self) -> DirectoryError {
        match self {
            AttemptError::Throttled { error, .. } | AttemptError::Failed(error) => error,
        }
    }
}

/// Graph HTTP client with authentication, rate limiting and paging
///
/// # Examples
///
/// ```no_run
/// use mbxgroups::auth::Credentials;
/// use mbxgroups::http::{HttpClient, GRAPH_V1_URL};
/// use secrecy::SecretString;
/// use serde_json::Value;
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let credentials = Credentials::AccessToken(SecretString::new("eyJ...".to_string()));
/// let client = HttpClient::new(GRAPH_V1_URL, Duration::from_secs(30), credentials)?;
///
/// let groups: Vec<Value> = client
///     .get_collection("groups", &[("$top", "5".to_string())], &[])
///     .await?;
/// println!("{} groups", groups.len());
/// # Ok(())
/// # }
/// ```
pub struct HttpClient {
    client: Client,
    base_url: String,
    tokens: TokenProvider,
    retry_config: RetryConfig,
    rate_limiter: Arc<RateLimiter>,
}

impl HttpClient {
    /// Creates a client for `base_url` with the given transport timeout
    ///
    /// The token provider shares the same connection pool.
    pub fn new(base_url: &str, timeout: Duration, credentials: Credentials) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("mbxgroups/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            tokens: TokenProvider::new(client.clone(), credentials),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_config: RetryConfig::default(),
            rate_limiter: Arc::new(create_graph_limiter()),
        })
    }

    /// Sets a custom backoff configuration for throttled reads
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Sets a custom rate limiter
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// Absolute URL of a Graph resource path
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Acquires the token eagerly, so credential problems surface at startup
    pub async fn authenticate(&self) -> Result<(), DirectoryError> {
        self.tokens.authorize(self.client.get(self.url(""))).await.map(|_| ())
    }

    /// Drops the cached access token
    pub async fn sign_out(&self) {
        self.tokens.clear().await;
    }

    /// GETs a single JSON object
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> Result<T, DirectoryError> {
        let url = self.url(path);
        let response = self.read(&url, query, headers).await?;
        decode(response).await
    }

    /// GETs every page of a collection, following `@odata.nextLink`
    pub async fn get_collection<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> Result<Vec<T>, DirectoryError> {
        let mut items = Vec::new();
        let mut page: Page<T> = {
            let response = self.read(&self.url(path), query, headers).await?;
            decode(response).await?
        };

        loop {
            items.append(&mut page.value);
            match page.next_link.take() {
                Some(next) => {
                    debug!("Following nextLink after {} items", items.len());
                    let response = self.read(&next, &[], headers).await?;
                    page = decode(response).await?;
                }
                None => break,
            }
        }

        Ok(items)
    }

    /// GETs only the first page of a collection
    pub async fn get_first_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> Result<Vec<T>, DirectoryError> {
        let response = self.read(&self.url(path), query, headers).await?;
        let page: Page<T> = decode(response).await?;
        Ok(page.value)
    }

    /// POSTs a JSON body; never re-issued
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<(), DirectoryError> {
        let request = self.client.post(self.url(path)).json(body);
        self.write(request).await
    }

    /// Sends a DELETE; never re-issued
    pub async fn delete(&self, path: &str) -> Result<(), DirectoryError> {
        let request = self.client.delete(self.url(path));
        self.write(request).await
    }

    async fn read(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> Result<Response, DirectoryError> {
        with_backoff(
            || async {
                let mut request = self.client.get(url).query(query);
                for (name, value) in headers {
                    request = request.header(*name, *value);
                }
                self.send(request).await
            },
            |err| match err {
                AttemptError::Throttled {
                    retry_after: Some(delay),
                    ..
                } => RetryDecision::After(*delay),
                AttemptError::Throttled { retry_after: None, .. } => RetryDecision::Backoff,
                AttemptError::Failed(_) => RetryDecision::GiveUp,
            },
            &self.retry_config,
        )
        .await
        .map_err(AttemptError::into_inner)
    }

    async fn write(&self, request: RequestBuilder) -> Result<(), DirectoryError> {
        self.send(request)
            .await
            .map(|_| ())
            .map_err(AttemptError::into_inner)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, AttemptError> {
        self.rate_limiter.acquire().await;

        let request = self
            .tokens
            .authorize(request)
            .await
            .map_err(AttemptError::Failed)?;

        let response = request.send().await.map_err(|e| {
            AttemptError::Failed(if e.is_connect() {
                DirectoryError::Connection(e.to_string())
            } else {
                DirectoryError::Transport(e.to_string())
            })
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        let error = status_error(status, &body);

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            warn!("Graph throttled the request ({}), retry after {:?}", status, retry_after);
            Err(AttemptError::Throttled { retry_after, error })
        } else {
            Err(AttemptError::Failed(error))
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, DirectoryError> {
    let body = response
        .text()
        .await
        .map_err(|e| DirectoryError::Transport(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| DirectoryError::Decode(e.to_string()))
}

/// Maps a non-success status and Graph error body to a [`DirectoryError`]
pub fn status_error(status: StatusCode, body: &str) -> DirectoryError {
    let message = match serde_json::from_str::<GraphErrorBody>(body) {
        Ok(parsed) if !parsed.error.message.is_empty() => {
            format!("{}: {}", parsed.error.code, parsed.error.message)
        }
        _ => status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string(),
    };

    match status {
        StatusCode::UNAUTHORIZED => DirectoryError::Authentication(message),
        StatusCode::NOT_FOUND => DirectoryError::NotFound(message),
        _ => DirectoryError::Request {
            status: status.as_u16(),
            message,
        },
    }
}
