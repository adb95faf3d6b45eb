//! Clients for the remote dashboard service.
//!
//! The reconciler talks to the remote service through `DashboardApi` only;
//! `InstanaClient` is the HTTP binding for Instana custom dashboards.

pub mod instana;

pub use instana::InstanaClient;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ApiCredentials;

/// Dashboard as returned by the remote service after creation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteDashboard {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Result of a remote delete that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The dashboard was already gone.
    NotFound,
}

/// Errors from the remote dashboard service. All of them are retryable.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, TLS or timeout failure.
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// Unexpected HTTP status.
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    /// The response body could not be interpreted.
    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

/// Operations consumed from the remote dashboard service.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Create a dashboard from an opaque configuration payload.
    async fn create_dashboard(
        &self,
        credentials: &ApiCredentials,
        config: &str,
    ) -> Result<RemoteDashboard, ClientError>;

    /// Delete a dashboard by remote id.
    async fn delete_dashboard(
        &self,
        credentials: &ApiCredentials,
        id: &str,
    ) -> Result<DeleteOutcome, ClientError>;
}
