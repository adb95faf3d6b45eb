//! Credentials for the Instana API.
//!
//! Credentials are loaded at most once per reconcile so that rotated tokens
//! are picked up without restarting the operator.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Key holding the API base URL in a credentials file.
pub const BASE_URL_KEY: &str = "instana-base-url";
/// Key holding the API token in a credentials file.
pub const API_TOKEN_KEY: &str = "instana-api-token";

/// Errors that can occur while loading credentials.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing or empty key: {0}")]
    MissingKey(&'static str),
}

/// Endpoint and token for the remote dashboard API.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub base_url: String,
    pub api_token: String,
}

impl ApiCredentials {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
        }
    }
}

// The token must never end up in logs.
impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("base_url", &self.base_url)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Source of API credentials.
#[async_trait]
pub trait CredentialsSource: Send + Sync {
    async fn load(&self) -> Result<ApiCredentials, ConfigError>;
}

/// Fixed credentials, e.g. from command-line flags.
pub struct StaticCredentials(ApiCredentials);

impl StaticCredentials {
    pub fn new(credentials: ApiCredentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl CredentialsSource for StaticCredentials {
    async fn load(&self) -> Result<ApiCredentials, ConfigError> {
        Ok(self.0.clone())
    }
}

/// Credentials read from a JSON key/value file, such as a mounted ConfigMap.
///
/// ```json
/// { "instana-base-url": "https://tenant.instana.io", "instana-api-token": "..." }
/// ```
pub struct ConfigMapFile {
    path: PathBuf,
}

impl ConfigMapFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialsSource for ConfigMapFile {
    async fn load(&self) -> Result<ApiCredentials, ConfigError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ConfigError::Read {
                path: self.path.clone(),
                source,
            })?;
        let data: HashMap<String, String> =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let lookup = |key: &'static str| {
            data.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(ConfigError::MissingKey(key))
        };

        let credentials = ApiCredentials::new(lookup(BASE_URL_KEY)?, lookup(API_TOKEN_KEY)?);
        debug!(path = %self.path.display(), base_url = %credentials.base_url, "Loaded API credentials");
        Ok(credentials)
    }
}
