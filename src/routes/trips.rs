use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{
        itinerary::{ActivityForm, ActivityPatch},
        trip::{NoteForm, NoteUpdate, Trip, TripForm, TripRef, TripUpdate},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips", post(create_trip).get(list_trips))
        .route("/trips/:id", get(get_trip).patch(update_trip).delete(delete_trip))
        .route("/trips/:id/days/:date/activities", post(add_activity))
        .route(
            "/trips/:id/days/:date/activities/order",
            put(reorder_activities),
        )
        .route(
            "/trips/:id/days/:date/activities/:activity_id",
            patch(update_activity).delete(delete_activity),
        )
        .route(
            "/trips/:id/days/:date/review",
            post(add_review).patch(update_review).delete(delete_review),
        )
        .route("/trips/:id/days/:date/city", put(update_city))
        .route("/trips/:id/notes", post(add_note))
        .route(
            "/trips/:id/notes/:note_id",
            patch(update_note).delete(delete_note),
        )
}

/// Remote trips may only be mutated by a signed-in participant; guest trips
/// belong to the local profile and need no identity.
fn gate_mutation(trip: &TripRef, current: &CurrentUser) -> Result<(), AppError> {
    if !trip.is_guest() {
        current.require_user()?;
    }
    Ok(())
}

fn actor<'a>(trip: &TripRef, current: &'a CurrentUser) -> Option<&'a str> {
    if trip.is_guest() {
        None
    } else {
        current.0.as_ref().map(|u| u.uid.as_str())
    }
}

async fn create_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<TripForm>,
) -> Result<impl IntoResponse, AppError> {
    let trip = match current.0.as_ref() {
        Some(user) => state.trips.create_trip(&user.uid, form).await?,
        None => state.trips.create_guest_trip(form).await?,
    };
    Ok((StatusCode::CREATED, Json(trip)))
}

#[derive(Serialize)]
struct TripCard {
    #[serde(flatten)]
    trip: Trip,
    color: &'static str,
}

async fn list_trips(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let trips = match current.0.as_ref() {
        Some(user) => state.trips.list_trips_for(&user.uid).await?,
        None => state.trips.list_guest_trips().await?,
    };
    let cards: Vec<TripCard> = trips
        .into_iter()
        .map(|trip| TripCard {
            color: state.palette.next(),
            trip,
        })
        .collect();
    Ok(Json(cards))
}

async fn get_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let trip = state.trips.get_trip(&TripRef::parse(&id)).await?;
    Ok(Json(trip))
}

async fn update_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(update): Json<TripUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    Ok(Json(state.trips.update_trip(&trip, update).await?))
}

async fn delete_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    state.trips.delete_trip(&trip).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_activity(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, date)): Path<(String, NaiveDate)>,
    Json(form): Json<ActivityForm>,
) -> Result<impl IntoResponse, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    let activity = state
        .trips
        .add_activity(&trip, date, actor(&trip, &current), form)
        .await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

async fn update_activity(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, date, activity_id)): Path<(String, NaiveDate, String)>,
    Json(patch): Json<ActivityPatch>,
) -> Result<impl IntoResponse, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    let activity = state
        .trips
        .update_activity(&trip, date, &activity_id, patch)
        .await?;
    Ok(Json(activity))
}

async fn delete_activity(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, date, activity_id)): Path<(String, NaiveDate, String)>,
) -> Result<StatusCode, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    state.trips.delete_activity(&trip, date, &activity_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ReorderForm {
    order: Vec<String>,
}

async fn reorder_activities(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, date)): Path<(String, NaiveDate)>,
    Json(form): Json<ReorderForm>,
) -> Result<StatusCode, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    state.trips.reorder_activities(&trip, date, form.order).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ReviewForm {
    rating: u8,
    #[serde(default)]
    review: Option<String>,
}

async fn add_review(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, date)): Path<(String, NaiveDate)>,
    Json(form): Json<ReviewForm>,
) -> Result<impl IntoResponse, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    let review = state
        .trips
        .add_day_review(&trip, date, actor(&trip, &current), form.rating, form.review)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn update_review(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, date)): Path<(String, NaiveDate)>,
    Json(form): Json<ReviewForm>,
) -> Result<impl IntoResponse, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    let review = state
        .trips
        .update_day_review(&trip, date, form.rating, form.review)
        .await?;
    Ok(Json(review))
}

async fn delete_review(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, date)): Path<(String, NaiveDate)>,
) -> Result<StatusCode, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    state.trips.delete_day_review(&trip, date).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct CityForm {
    #[serde(default)]
    city: Option<String>,
}

async fn update_city(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, date)): Path<(String, NaiveDate)>,
    Json(form): Json<CityForm>,
) -> Result<StatusCode, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    state.trips.update_day_city(&trip, date, form.city).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_note(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(form): Json<NoteForm>,
) -> Result<impl IntoResponse, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    let note = state.trips.add_note(&trip, form).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn update_note(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, note_id)): Path<(String, String)>,
    Json(update): Json<NoteUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    Ok(Json(state.trips.update_note(&trip, &note_id, update).await?))
}

async fn delete_note(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, note_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let trip = TripRef::parse(&id);
    gate_mutation(&trip, &current)?;
    state.trips.delete_note(&trip, &note_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
