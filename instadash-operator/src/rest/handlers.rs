use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::resource::{Dashboard, ObjectKey};
use crate::store::{
    CreateDashboardRequest as StoreCreateDashboardRequest, DataStore, StoreError,
};

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn DataStore>,
}

/// API error response
#[derive(Serialize, ToSchema)]
pub struct ApiError {
    pub error: String,
    pub code: u32,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.code {
            400 => StatusCode::BAD_REQUEST,
            404 => StatusCode::NOT_FOUND,
            409 => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let code = match &e {
            StoreError::NotFound(_) => 404,
            StoreError::AlreadyExists(_) | StoreError::VersionMismatch { .. } => 409,
            StoreError::Invalid(_) => 400,
            StoreError::Internal(_) => 500,
        };
        ApiError {
            error: e.to_string(),
            code,
        }
    }
}

/// Version information
#[derive(Serialize, ToSchema)]
pub struct VersionInfo {
    pub version: String,
}

/// Request to create a Dashboard
#[derive(Deserialize, ToSchema)]
pub struct CreateDashboardRequest {
    /// Dashboard name, unique within the namespace
    pub name: String,
    /// Instana custom dashboard definition (JSON), passed through unchanged
    pub config: String,
}

/// Dashboard resource
#[derive(Serialize, ToSchema)]
pub struct DashboardView {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub resource_version: u64,
    pub creation_timestamp: String,
    pub deletion_timestamp: Option<String>,
    pub finalizers: Vec<String>,
    pub config: String,
    /// Instana dashboard id, once provisioned
    pub dashboard_id: Option<String>,
    pub dashboard_title: Option<String>,
    /// Pending, Provisioned or Deleting
    pub phase: String,
}

impl From<Dashboard> for DashboardView {
    fn from(d: Dashboard) -> Self {
        let phase = d.phase().to_string();
        let non_empty = |s: String| (!s.is_empty()).then_some(s);
        Self {
            namespace: d.metadata.namespace,
            name: d.metadata.name,
            uid: d.metadata.uid,
            resource_version: d.metadata.resource_version,
            creation_timestamp: d.metadata.creation_timestamp.to_rfc3339(),
            deletion_timestamp: d.metadata.deletion_timestamp.map(|t| t.to_rfc3339()),
            finalizers: d.metadata.finalizers,
            config: d.spec.config,
            dashboard_id: non_empty(d.status.dashboard_id),
            dashboard_title: non_empty(d.status.dashboard_title),
            phase,
        }
    }
}

/// List of Dashboards
#[derive(Serialize, ToSchema)]
pub struct DashboardListResponse {
    pub dashboards: Vec<DashboardView>,
}

/// Get service version
#[utoipa::path(
    get,
    path = "/v1/version",
    responses(
        (status = 200, description = "Service version", body = VersionInfo)
    ),
    tag = "system"
)]
pub async fn get_version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List Dashboards in all namespaces
#[utoipa::path(
    get,
    path = "/v1/dashboards",
    responses(
        (status = 200, description = "All Dashboards", body = DashboardListResponse)
    ),
    tag = "dashboards"
)]
pub async fn list_dashboards(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardListResponse>, ApiError> {
    let dashboards = state.store.list().await?;
    Ok(Json(DashboardListResponse {
        dashboards: dashboards.into_iter().map(DashboardView::from).collect(),
    }))
}

/// Create a Dashboard
#[utoipa::path(
    post,
    path = "/v1/namespaces/{namespace}/dashboards",
    params(
        ("namespace" = String, Path, description = "Namespace")
    ),
    request_body = CreateDashboardRequest,
    responses(
        (status = 201, description = "Dashboard created", body = DashboardView),
        (status = 400, description = "Invalid name", body = ApiError),
        (status = 409, description = "Dashboard already exists", body = ApiError)
    ),
    tag = "dashboards"
)]
pub async fn create_dashboard(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
    Json(req): Json<CreateDashboardRequest>,
) -> Result<(StatusCode, Json<DashboardView>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError {
            error: "name must not be empty".to_string(),
            code: 400,
        });
    }

    let dashboard = state
        .store
        .create(StoreCreateDashboardRequest {
            namespace,
            name: req.name,
            config: req.config,
        })
        .await?;
    info!(dashboard = %dashboard.key(), "Dashboard submitted");

    Ok((StatusCode::CREATED, Json(DashboardView::from(dashboard))))
}

/// Get a Dashboard
#[utoipa::path(
    get,
    path = "/v1/namespaces/{namespace}/dashboards/{name}",
    params(
        ("namespace" = String, Path, description = "Namespace"),
        ("name" = String, Path, description = "Dashboard name")
    ),
    responses(
        (status = 200, description = "Dashboard", body = DashboardView),
        (status = 404, description = "Dashboard not found", body = ApiError)
    ),
    tag = "dashboards"
)]
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<DashboardView>, ApiError> {
    let key = ObjectKey::new(namespace, name);
    match state.store.get(&key).await? {
        Some(dashboard) => Ok(Json(DashboardView::from(dashboard))),
        None => Err(StoreError::NotFound(key.to_string()).into()),
    }
}

/// Request deletion of a Dashboard
///
/// A provisioned Dashboard stays visible in phase Deleting until its Instana
/// dashboard has been removed.
#[utoipa::path(
    delete,
    path = "/v1/namespaces/{namespace}/dashboards/{name}",
    params(
        ("namespace" = String, Path, description = "Namespace"),
        ("name" = String, Path, description = "Dashboard name")
    ),
    responses(
        (status = 202, description = "Deletion in progress", body = DashboardView),
        (status = 204, description = "Dashboard removed"),
        (status = 404, description = "Dashboard not found", body = ApiError)
    ),
    tag = "dashboards"
)]
pub async fn delete_dashboard(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let key = ObjectKey::new(namespace, name);
    let response = match state.store.request_deletion(&key).await? {
        Some(dashboard) => {
            info!(dashboard = %key, "Deletion requested, waiting for finalizer");
            (StatusCode::ACCEPTED, Json(DashboardView::from(dashboard))).into_response()
        }
        None => {
            info!(dashboard = %key, "Dashboard removed");
            StatusCode::NO_CONTENT.into_response()
        }
    };
    Ok(response)
}
