//! API client for the OCM cluster-management service

use crate::cache::ResponseCache;
use crate::config::OcmCredentials;
use async_trait::async_trait;
use chrono::Utc;
use netaudit_common::{AuditError, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Seconds before actual expiry at which a token is considered stale
const EXPIRY_SKEW_SECS: i64 = 30;

/// Read-only access to the management API
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// GET `path` (relative to the API base URL) and decode the JSON body
    async fn get_json(&self, path: &str) -> Result<Value>;
}

#[derive(Debug, Clone)]
struct TokenState {
    access_token: String,
    refresh_token: String,
    /// Unix timestamp
    expires_at: i64,
}

impl TokenState {
    fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at - EXPIRY_SKEW_SECS
    }
}

/// OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

pub struct OcmClient {
    base_url: String,
    client: reqwest::Client,
    client_id: String,
    token_url: String,
    token: Arc<RwLock<TokenState>>,
    cache: ResponseCache,
}

impl OcmClient {
    pub fn new(
        credentials: &OcmCredentials,
        cache: ResponseCache,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: credentials.url.trim_end_matches('/').to_string(),
            client,
            client_id: credentials.client_id.clone(),
            token_url: credentials.token_url.clone(),
            // The stored access token has no known lifetime, so treat it as
            // expired and refresh before the first request.
            token: Arc::new(RwLock::new(TokenState {
                access_token: credentials.access_token.clone(),
                refresh_token: credentials.refresh_token.clone(),
                expires_at: 0,
            })),
            cache,
        })
    }

    /// Exchange the refresh token for a new access token
    async fn refresh_token(&self) -> Result<()> {
        let refresh_token = self.token.read().await.refresh_token.clone();
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
        ];

        info!("Refreshing OCM access token");

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuditError::connectivity(&self.token_url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(&self.token_url, status, &body));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AuditError::Lookup(format!("failed to parse token response: {}", e))
        })?;

        let mut state = self.token.write().await;
        state.access_token = token.access_token;
        if let Some(refresh_token) = token.refresh_token {
            state.refresh_token = refresh_token;
        }
        // Without an explicit lifetime, keep the token until the API rejects it
        state.expires_at = match token.expires_in {
            Some(secs) => Utc::now().timestamp() + secs,
            None => i64::MAX,
        };

        Ok(())
    }

    async fn access_token(&self) -> Result<String> {
        if self.token.read().await.is_expired() {
            self.refresh_token().await?;
        }
        Ok(self.token.read().await.access_token.clone())
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response> {
        let token = self.access_token().await?;
        self.client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuditError::connectivity(url, e))
    }
}

#[async_trait]
impl ManagementApi for OcmClient {
    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        if let Some(body) = self.cache.get(&url).await {
            return Ok(body);
        }

        debug!(path, "GET");
        let mut response = self.send(&url).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.refresh_token().await?;
            response = self.send(&url).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(path, status, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuditError::Lookup(format!("{}: invalid JSON response: {}", path, e)))?;

        self.cache.put(&url, &body).await;
        Ok(body)
    }
}

/// Server-side and throttling errors are worth retrying; anything else means
/// the data is not there.
fn classify_status(path: &str, status: StatusCode, body: &str) -> AuditError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AuditError::connectivity(path, format!("API returned {}", status))
    } else {
        AuditError::Lookup(format!("{}: API returned {}: {}", path, status, body.trim()))
    }
}
