//! Client for the Instana custom dashboard API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use tracing::{debug, info};

use super::{ClientError, DashboardApi, DeleteOutcome, RemoteDashboard};
use crate::config::ApiCredentials;

const DASHBOARD_PATH: &str = "/api/custom-dashboard";
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for Instana. Holds one connection pool for the whole process.
#[derive(Clone)]
pub struct InstanaClient {
    http: reqwest::Client,
}

impl InstanaClient {
    pub fn new(request_timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(request_timeout.min(Duration::from_secs(10)))
            .timeout(request_timeout)
            .build()?;
        Ok(Self { http })
    }

    fn url(credentials: &ApiCredentials, suffix: &str) -> String {
        format!(
            "{}{}{}",
            credentials.base_url.trim_end_matches('/'),
            DASHBOARD_PATH,
            suffix
        )
    }

    fn request(&self, method: Method, url: &str, credentials: &ApiCredentials) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("apiToken {}", credentials.api_token))
    }
}

fn transport(url: &str, err: reqwest::Error) -> ClientError {
    ClientError::Transport {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

fn truncate(body: String) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}

#[async_trait]
impl DashboardApi for InstanaClient {
    async fn create_dashboard(
        &self,
        credentials: &ApiCredentials,
        config: &str,
    ) -> Result<RemoteDashboard, ClientError> {
        let url = Self::url(credentials, "");
        debug!(url = %url, "Creating Instana dashboard");

        let response = self
            .request(Method::POST, &url, credentials)
            .body(config.to_string())
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| transport(&url, e))?;
        info!(status = %status, "POST {}", url);

        if !status.is_success() {
            return Err(ClientError::Status {
                method: "POST",
                url,
                status: status.as_u16(),
                body: truncate(body),
            });
        }

        let dashboard: RemoteDashboard =
            serde_json::from_str(&body).map_err(|e| ClientError::Malformed {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        if dashboard.id.is_empty() {
            return Err(ClientError::Malformed {
                url,
                reason: "response has no dashboard id".to_string(),
            });
        }
        Ok(dashboard)
    }

    async fn delete_dashboard(
        &self,
        credentials: &ApiCredentials,
        id: &str,
    ) -> Result<DeleteOutcome, ClientError> {
        let url = Self::url(credentials, &format!("/{}", id));
        debug!(url = %url, "Deleting Instana dashboard");

        let response = self
            .request(Method::DELETE, &url, credentials)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        let status = response.status();
        info!(status = %status, "DELETE {}", url);

        if status == StatusCode::NOT_FOUND {
            return Ok(DeleteOutcome::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                method: "DELETE",
                url,
                status: status.as_u16(),
                body: truncate(body),
            });
        }
        Ok(DeleteOutcome::Deleted)
    }
}
