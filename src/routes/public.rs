use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::CurrentUser, error::AppError, models::user::UserProfileUpdate, state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(config_status))
        .route("/guest-mode", get(guest_mode).put(set_guest_mode))
        .route("/guest-trips", get(guest_trips_status).delete(clear_guest_trips))
        .route("/profile", post(ensure_profile).get(profile).patch(update_profile))
        .route("/profile/invitations", get(pending_invitations))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct ConfigStatus {
    configured: bool,
    missing: Vec<&'static str>,
}

async fn config_status(State(state): State<AppState>) -> Json<ConfigStatus> {
    let missing = state.config.setup_issues();
    Json(ConfigStatus {
        configured: missing.is_empty(),
        missing,
    })
}

#[derive(Serialize, Deserialize)]
struct GuestMode {
    enabled: bool,
}

async fn guest_mode(State(state): State<AppState>) -> Result<Json<GuestMode>, AppError> {
    let enabled = state.trips.guest_mode().await?;
    Ok(Json(GuestMode { enabled }))
}

async fn set_guest_mode(
    State(state): State<AppState>,
    Json(form): Json<GuestMode>,
) -> Result<StatusCode, AppError> {
    state.trips.set_guest_mode(form.enabled).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GuestTripsStatus {
    has_trips: bool,
}

// The sign-in flow asks this before offering to migrate guest trips.
async fn guest_trips_status(
    State(state): State<AppState>,
) -> Result<Json<GuestTripsStatus>, AppError> {
    let has_trips = state.trips.has_guest_trips().await?;
    Ok(Json(GuestTripsStatus { has_trips }))
}

// Migration hook: callers copy guest trips into their account out of band,
// then drop the local collection.
async fn clear_guest_trips(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.trips.clear_guest_trips().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_profile(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let profile = state
        .trips
        .ensure_user(&user.uid, &user.email, &user.display_name, user.photo_url.clone())
        .await?;
    Ok(Json(profile))
}

async fn profile(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    Ok(Json(state.trips.get_user(&user.uid).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(update): Json<UserProfileUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    Ok(Json(state.trips.update_user(&user.uid, update).await?))
}

async fn pending_invitations(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    Ok(Json(state.trips.pending_invitations_for(&user.email).await?))
}
