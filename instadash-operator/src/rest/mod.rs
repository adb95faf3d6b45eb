//! REST API for submitting and inspecting Dashboards.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
