use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{invitation::Invitation, trip::TripRef},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips/:id/invitations", post(create_invitation))
        .route("/invite/:invitation_id", get(get_invitation))
        .route("/invite/:invitation_id/accept", post(accept_invitation))
        .route("/invite/:invitation_id/decline", post(decline_invitation))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InviteForm {
    /// Omitted for link-only invites.
    #[serde(default)]
    invited_email: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InviteResponse {
    #[serde(flatten)]
    invitation: Invitation,
    url: String,
}

async fn create_invitation(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(form): Json<InviteForm>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = TripRef::parse(&id);
    let invitation = state
        .trips
        .create_invitation(&trip, &user.uid, form.invited_email)
        .await?;
    let url = state.trips.invitation_url(&invitation);
    Ok((
        StatusCode::CREATED,
        Json(InviteResponse { invitation, url }),
    ))
}

async fn get_invitation(
    State(state): State<AppState>,
    Path(invitation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trips.get_invitation(&invitation_id).await?))
}

async fn accept_invitation(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(invitation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = state.trips.accept_invitation(&invitation_id, &user.uid).await?;
    Ok(Json(trip))
}

async fn decline_invitation(
    State(state): State<AppState>,
    Path(invitation_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.trips.decline_invitation(&invitation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
