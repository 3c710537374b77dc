//! Access tokens for Microsoft Graph
//!
//! Two credential forms are supported: an access token obtained elsewhere
//! (for example `az account get-access-token`) or an app registration using
//! the OAuth2 client-credentials grant. Client-credentials tokens are cached
//! and re-acquired shortly before they expire.

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::directory::DirectoryError;

/// Default Microsoft identity platform authority
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Scope granting the app's configured Graph application permissions
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens are refreshed this long before their advertised expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(120);

/// How the tool authenticates to Graph
pub enum Credentials {
    /// A ready-made bearer token
    AccessToken(SecretString),
    /// App registration secret, exchanged for tokens on demand
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: SecretString,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::AccessToken(_) => f.write_str("AccessToken([REDACTED])"),
            Credentials::ClientSecret { tenant_id, client_id, .. } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

struct CachedToken {
    value: SecretString,
    refresh_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.refresh_at.map_or(true, |refresh_at| Instant::now() < refresh_at)
    }
}

/// Supplies bearer tokens for Graph requests
pub struct TokenProvider {
    client: Client,
    credentials: Credentials,
    authority: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(client: Client, credentials: Credentials) -> Self {
        Self::with_authority(client, credentials, DEFAULT_AUTHORITY)
    }

    pub fn with_authority(client: Client, credentials: Credentials, authority: &str) -> Self {
        Self {
            client,
            credentials,
            authority: authority.trim_end_matches('/').to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Adds the `Authorization` header to `request`, acquiring a token if needed
    pub async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, DirectoryError> {
        let mut cached = self.cached.lock().await;

        let needs_token = cached.as_ref().map_or(true, |token| !token.is_fresh());
        if needs_token {
            *cached = Some(self.acquire().await?);
        }

        match cached.as_ref() {
            Some(token) => Ok(request.bearer_auth(token.value.expose_secret())),
            None => Err(DirectoryError::Authentication("no access token available".to_string())),
        }
    }

    /// Drops the cached token
    pub async fn clear(&self) {
        self.cached.lock().await.take();
    }

    async fn acquire(&self) -> Result<CachedToken, DirectoryError> {
        match &self.credentials {
            Credentials::AccessToken(token) => Ok(CachedToken {
                value: SecretString::new(token.expose_secret().clone()),
                refresh_at: None,
            }),
            Credentials::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                let url = format!("{}/{}/oauth2/v2.0/token", self.authority, tenant_id);
                debug!("Requesting client-credentials token from {}", url);

                let params = [
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.expose_secret().as_str()),
                    ("scope", GRAPH_DEFAULT_SCOPE),
                ];

                let response = self
                    .client
                    .post(&url)
                    .form(&params)
                    .send()
                    .await
                    .map_err(|e| DirectoryError::Connection(format!("token endpoint unreachable: {}", e)))?;

                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| DirectoryError::Transport(e.to_string()))?;

                if !status.is_success() {
                    return Err(DirectoryError::Authentication(describe_token_error(status.as_u16(), &body)));
                }

                let token: TokenResponse = serde_json::from_str(&body)
                    .map_err(|e| DirectoryError::Decode(format!("token response: {}", e)))?;

                info!("Acquired Graph access token for client {}", client_id);
                Ok(CachedToken {
                    value: SecretString::new(token.access_token),
                    refresh_at: token.expires_in.map(|seconds| {
                        Instant::now() + Duration::from_secs(seconds).saturating_sub(EXPIRY_MARGIN)
                    }),
                })
            }
        }
    }
}

/// One-line description of a failed token request
fn describe_token_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(err) => match err.error_description {
            Some(description) => format!(
                "{} ({})",
                err.error,
                description.lines().next().unwrap_or_default()
            ),
            None => err.error,
        },
        Err(_) => format!("token endpoint returned status {}", status),
    }
}
