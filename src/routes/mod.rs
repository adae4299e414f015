pub mod invitations;
pub mod public;
pub mod trips;

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, Json, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .merge(trips::router())
        .merge(invitations::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Served instead of the normal router while boot configuration is
/// incomplete; every path reports what is missing.
pub fn setup_router(missing: Vec<&'static str>) -> Router {
    let missing = Arc::new(missing);
    Router::new().fallback(move || {
        let missing = Arc::clone(&missing);
        async move {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "setup": true,
                    "message": "configuration incomplete; set the listed environment variables and restart",
                    "missing": missing.as_slice(),
                })),
            )
                .into_response()
        }
    })
}
