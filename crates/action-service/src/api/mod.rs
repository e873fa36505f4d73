pub mod error;
pub mod routes;

use crate::state::ActionServiceState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build the API router
pub fn router(state: ActionServiceState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        .route("/v1/info", get(routes::info))
        // Stream session endpoints
        .route("/v1/sessions", get(routes::list_sessions))
        .route(
            "/v1/sessions/:id",
            get(routes::get_session).delete(routes::remove_session),
        )
        .route("/v1/sessions/:id/frames", post(routes::submit_frame))
        .route("/v1/sessions/:id/reset", post(routes::reset_session))
        .route("/v1/sessions/:id/params", put(routes::update_params))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
