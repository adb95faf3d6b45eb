use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::{self, AppState};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "instadash operator",
        version = "0.1.0",
        description = "REST API for Dashboard resources. Dashboards are reconciled into Instana custom dashboards.",
        license(name = "MIT")
    ),
    tags(
        (name = "system", description = "System information"),
        (name = "dashboards", description = "Dashboard resources")
    ),
    paths(
        handlers::get_version,
        handlers::list_dashboards,
        handlers::create_dashboard,
        handlers::get_dashboard,
        handlers::delete_dashboard,
    ),
    components(schemas(
        handlers::VersionInfo,
        handlers::ApiError,
        handlers::CreateDashboardRequest,
        handlers::DashboardView,
        handlers::DashboardListResponse,
    ))
)]
pub struct ApiDoc;

pub fn create_router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/version", get(handlers::get_version))
        .route("/dashboards", get(handlers::list_dashboards))
        .route(
            "/namespaces/{namespace}/dashboards",
            post(handlers::create_dashboard),
        )
        .route(
            "/namespaces/{namespace}/dashboards/{name}",
            get(handlers::get_dashboard).delete(handlers::delete_dashboard),
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/v1", routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
