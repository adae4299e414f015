use chrono::{NaiveDate, Utc};
use url::Url;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        invitation::{Invitation, InvitationStatus},
        itinerary::{Activity, ActivityForm, ActivityPatch, Day, DayReview},
        trip::{Note, NoteForm, NoteUpdate, Trip, TripForm, TripRef, TripUpdate},
        user::{UserProfile, UserProfileUpdate},
    },
    services::{local_store::LocalTripStore, remote_store::RemoteTripStore, watch::TripWatch},
};

/// Owner and sole participant of every guest trip.
pub const GUEST_OWNER: &str = "guest";

/// Dual-mode data façade: one CRUD-and-subscribe surface for trips, routed per
/// call to the local or the remote adapter by the [`TripRef`] origin. Every
/// mutation is a whole-trip rewrite from the caller's point of view, and the
/// domain invariants (day-review invalidation, invitation lifecycle checks,
/// input validation) are enforced here rather than left to callers.
#[derive(Clone)]
pub struct TripService {
    local: LocalTripStore,
    remote: RemoteTripStore,
    origin: Url,
}

impl TripService {
    pub fn new(local: LocalTripStore, remote: RemoteTripStore, origin: Url) -> Self {
        Self {
            local,
            remote,
            origin,
        }
    }

    // ---- trips ----

    /// Creates a trip owned by the local profile, never shared.
    pub async fn create_guest_trip(&self, form: TripForm) -> Result<Trip, AppError> {
        let form = validate_trip_form(form)?;
        let trip = Trip::new(TripRef::new_guest().id().to_string(), GUEST_OWNER, form);
        self.local.upsert_trip(trip).await
    }

    pub async fn create_trip(&self, owner_id: &str, form: TripForm) -> Result<Trip, AppError> {
        let form = validate_trip_form(form)?;
        let trip = Trip::new(Uuid::new_v4().to_string(), owner_id, form);
        self.remote.create_trip(&trip).await?;
        Ok(trip)
    }

    pub async fn get_trip(&self, trip: &TripRef) -> Result<Trip, AppError> {
        match trip {
            TripRef::Guest(id) => self.local.get_trip(id).await?.ok_or(AppError::NotFound),
            TripRef::Remote(id) => self.remote.get_trip(id).await?.ok_or(AppError::NotFound),
        }
    }

    pub async fn list_guest_trips(&self) -> Result<Vec<Trip>, AppError> {
        self.local.list_trips().await
    }

    pub async fn list_trips_for(&self, user_id: &str) -> Result<Vec<Trip>, AppError> {
        self.remote.list_trips_for(user_id).await
    }

    pub async fn update_trip(&self, trip: &TripRef, update: TripUpdate) -> Result<Trip, AppError> {
        self.mutate_trip(trip, move |t| {
            if let Some(title) = update.title {
                t.title = validate_title(&title, "trip title")?;
            }
            if let Some(start) = update.start_date {
                t.start_date = start;
            }
            if let Some(end) = update.end_date {
                t.end_date = end;
            }
            if t.start_date > t.end_date {
                return Err(AppError::validation("start date must not be after end date"));
            }
            Ok(())
        })
        .await
    }

    pub async fn delete_trip(&self, trip: &TripRef) -> Result<(), AppError> {
        match trip {
            TripRef::Guest(id) => {
                if !self.local.delete_trip(id).await? {
                    return Err(AppError::NotFound);
                }
                Ok(())
            }
            TripRef::Remote(id) => self.remote.delete_trip(id).await,
        }
    }

    /// Live change feed for one trip; drop the watch to cancel.
    pub fn subscribe(&self, trip: &TripRef) -> TripWatch {
        match trip {
            TripRef::Guest(id) => self.local.subscribe(id),
            TripRef::Remote(id) => self.remote.subscribe(id),
        }
    }

    // ---- activities ----

    pub async fn add_activity(
        &self,
        trip: &TripRef,
        date: NaiveDate,
        actor: Option<&str>,
        mut form: ActivityForm,
    ) -> Result<Activity, AppError> {
        let created_by = self.require_actor(trip, actor)?;
        normalize_activity_form(&mut form);
        let activity = Activity::from_form(form, created_by);
        validate_activity(&activity)?;

        let stored = activity.clone();
        self.mutate_trip(trip, move |t| {
            let day = t.day_mut(date);
            day.activities.push(stored);
            invalidate_review(day);
            Ok(())
        })
        .await?;
        Ok(activity)
    }

    pub async fn update_activity(
        &self,
        trip: &TripRef,
        date: NaiveDate,
        activity_id: &str,
        patch: ActivityPatch,
    ) -> Result<Activity, AppError> {
        let activity_id = activity_id.to_string();
        let mut updated = None;
        self.mutate_trip(trip, |t| {
            let day = t.day_mut(date);
            let activity = day.activity_mut(&activity_id).ok_or(AppError::NotFound)?;
            let mut next = activity.clone();
            next.apply_patch(patch);
            validate_activity(&next)?;
            *activity = next.clone();
            invalidate_review(day);
            updated = Some(next);
            Ok(())
        })
        .await?;
        updated.ok_or(AppError::NotFound)
    }

    pub async fn delete_activity(
        &self,
        trip: &TripRef,
        date: NaiveDate,
        activity_id: &str,
    ) -> Result<(), AppError> {
        let activity_id = activity_id.to_string();
        self.mutate_trip(trip, move |t| {
            let day = t.day_mut(date);
            let before = day.activities.len();
            day.activities.retain(|a| a.id != activity_id);
            if day.activities.len() == before {
                return Err(AppError::NotFound);
            }
            invalidate_review(day);
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Persists a drag-reorder: `order` must name exactly the day's current
    /// activities.
    pub async fn reorder_activities(
        &self,
        trip: &TripRef,
        date: NaiveDate,
        order: Vec<String>,
    ) -> Result<(), AppError> {
        self.mutate_trip(trip, move |t| {
            let day = t.day_mut(date);
            if order.len() != day.activities.len() {
                return Err(AppError::validation(
                    "reorder must list every activity of the day exactly once",
                ));
            }
            let mut remaining = std::mem::take(&mut day.activities);
            let mut reordered = Vec::with_capacity(order.len());
            for id in &order {
                let Some(pos) = remaining.iter().position(|a| &a.id == id) else {
                    return Err(AppError::validation(format!("unknown activity id {id}")));
                };
                reordered.push(remaining.remove(pos));
            }
            day.activities = reordered;
            Ok(())
        })
        .await?;
        Ok(())
    }

    // ---- day reviews & city ----

    pub async fn add_day_review(
        &self,
        trip: &TripRef,
        date: NaiveDate,
        actor: Option<&str>,
        rating: u8,
        review: Option<String>,
    ) -> Result<DayReview, AppError> {
        let reviewed_by = self.require_actor(trip, actor)?;
        validate_rating(rating)?;
        if date >= Utc::now().date_naive() {
            return Err(AppError::validation("a day can only be reviewed once it has passed"));
        }
        let day_review = DayReview {
            rating,
            review: normalize_optional(review),
            reviewed_by,
            reviewed_at: Utc::now(),
        };
        let stored = day_review.clone();
        self.mutate_trip(trip, move |t| {
            let day = t.day_mut(date);
            if day.day_review.is_some() {
                return Err(AppError::validation("day already has a review"));
            }
            day.day_review = Some(stored);
            Ok(())
        })
        .await?;
        Ok(day_review)
    }

    pub async fn update_day_review(
        &self,
        trip: &TripRef,
        date: NaiveDate,
        rating: u8,
        review: Option<String>,
    ) -> Result<DayReview, AppError> {
        validate_rating(rating)?;
        let review = normalize_optional(review);
        let mut updated = None;
        self.mutate_trip(trip, |t| {
            let day = t.day_mut(date);
            let existing = day.day_review.as_mut().ok_or(AppError::NotFound)?;
            existing.rating = rating;
            existing.review = review;
            existing.reviewed_at = Utc::now();
            updated = Some(existing.clone());
            Ok(())
        })
        .await?;
        updated.ok_or(AppError::NotFound)
    }

    pub async fn delete_day_review(&self, trip: &TripRef, date: NaiveDate) -> Result<(), AppError> {
        self.mutate_trip(trip, move |t| {
            let day = t.day_mut(date);
            if day.day_review.take().is_none() {
                return Err(AppError::NotFound);
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    pub async fn update_day_city(
        &self,
        trip: &TripRef,
        date: NaiveDate,
        city: Option<String>,
    ) -> Result<(), AppError> {
        let city = normalize_optional(city);
        self.mutate_trip(trip, move |t| {
            t.day_mut(date).city = city;
            Ok(())
        })
        .await?;
        Ok(())
    }

    // ---- notes ----

    pub async fn add_note(&self, trip: &TripRef, form: NoteForm) -> Result<Note, AppError> {
        let title = validate_title(&form.title, "note title")?;
        let link = validate_link(&form.link)?;
        let now = Utc::now();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            title,
            link,
            created_at: now,
            updated_at: now,
        };
        let stored = note.clone();
        self.mutate_trip(trip, move |t| {
            t.notes_mut().push(stored);
            Ok(())
        })
        .await?;
        Ok(note)
    }

    pub async fn update_note(
        &self,
        trip: &TripRef,
        note_id: &str,
        update: NoteUpdate,
    ) -> Result<Note, AppError> {
        let title = update
            .title
            .map(|t| validate_title(&t, "note title"))
            .transpose()?;
        let link = update.link.map(|l| validate_link(&l)).transpose()?;
        let note_id = note_id.to_string();
        let mut updated = None;
        self.mutate_trip(trip, |t| {
            let note = t
                .notes_mut()
                .iter_mut()
                .find(|n| n.id == note_id)
                .ok_or(AppError::NotFound)?;
            if let Some(title) = title {
                note.title = title;
            }
            if let Some(link) = link {
                note.link = link;
            }
            note.updated_at = Utc::now();
            updated = Some(note.clone());
            Ok(())
        })
        .await?;
        updated.ok_or(AppError::NotFound)
    }

    pub async fn delete_note(&self, trip: &TripRef, note_id: &str) -> Result<(), AppError> {
        let note_id = note_id.to_string();
        self.mutate_trip(trip, move |t| {
            let notes = t.notes_mut();
            let before = notes.len();
            notes.retain(|n| n.id != note_id);
            if notes.len() == before {
                return Err(AppError::NotFound);
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    // ---- invitations ----

    /// Owner-only. `invited_email = None` creates a link-only invite that does
    /// not touch the trip's invited-email list.
    pub async fn create_invitation(
        &self,
        trip: &TripRef,
        inviter: &str,
        invited_email: Option<String>,
    ) -> Result<Invitation, AppError> {
        let TripRef::Remote(trip_id) = trip else {
            return Err(AppError::validation("guest trips cannot be shared"));
        };
        let stored = self
            .remote
            .get_trip(trip_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if stored.owner_id != inviter {
            return Err(AppError::Forbidden);
        }

        let invited_email = match normalize_optional(invited_email) {
            Some(email) => Some(validate_email(&email)?),
            None => None,
        };

        let invitation = Invitation::new(trip_id.clone(), invited_email.clone(), inviter);
        self.remote.create_invitation(&invitation).await?;

        if let Some(email) = invited_email {
            self.remote
                .with_trip(trip_id, move |t| {
                    t.add_invited_email(&email);
                    Ok(())
                })
                .await?;
        }
        Ok(invitation)
    }

    pub fn invitation_url(&self, invitation: &Invitation) -> String {
        let origin = self.origin.as_str().trim_end_matches('/');
        format!("{origin}/invite/{}", invitation.id)
    }

    pub async fn get_invitation(&self, invitation_id: &str) -> Result<Invitation, AppError> {
        self.remote
            .get_invitation(invitation_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Full acceptance lifecycle: expiry and status are checked here, and the
    /// status flip plus participant union happen in one transaction.
    pub async fn accept_invitation(
        &self,
        invitation_id: &str,
        user_id: &str,
    ) -> Result<Trip, AppError> {
        let invitation = self.get_invitation(invitation_id).await?;
        if invitation.is_expired(Utc::now()) {
            return Err(AppError::Expired);
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(AppError::AlreadyResolved);
        }
        self.remote
            .accept_invitation(invitation_id, &invitation.trip_id, user_id)
            .await
    }

    pub async fn decline_invitation(&self, invitation_id: &str) -> Result<(), AppError> {
        // Existence check first so a missing invitation reads NotFound rather
        // than AlreadyResolved.
        self.get_invitation(invitation_id).await?;
        self.remote.decline_invitation(invitation_id).await
    }

    /// Pending invitations addressed to `email`, with expired ones filtered
    /// out at read time (expiry is never swept proactively). Stored invited
    /// emails are lowercase, so the lookup key is normalized the same way.
    pub async fn pending_invitations_for(&self, email: &str) -> Result<Vec<Invitation>, AppError> {
        let now = Utc::now();
        let email = email.trim().to_lowercase();
        let invitations = self.remote.pending_invitations_for(&email).await?;
        Ok(invitations
            .into_iter()
            .filter(|i| !i.is_expired(now))
            .collect())
    }

    // ---- guest mode & migration hooks ----

    pub async fn clear_guest_trips(&self) -> Result<(), AppError> {
        self.local.clear_trips().await
    }

    pub async fn has_guest_trips(&self) -> Result<bool, AppError> {
        self.local.has_trips().await
    }

    pub async fn set_guest_mode(&self, enabled: bool) -> Result<(), AppError> {
        self.local.set_guest_mode(enabled).await
    }

    pub async fn guest_mode(&self) -> Result<bool, AppError> {
        self.local.guest_mode().await
    }

    // ---- users ----

    pub async fn ensure_user(
        &self,
        uid: &str,
        email: &str,
        display_name: &str,
        photo_url: Option<String>,
    ) -> Result<UserProfile, AppError> {
        let now = Utc::now();
        self.remote
            .ensure_user(UserProfile {
                uid: uid.to_string(),
                email: validate_email(email)?,
                display_name: display_name.to_string(),
                photo_url,
                created_at: now,
                updated_at: now,
            })
            .await
    }

    pub async fn get_user(&self, uid: &str) -> Result<UserProfile, AppError> {
        self.remote.get_user(uid).await?.ok_or(AppError::NotFound)
    }

    pub async fn update_user(
        &self,
        uid: &str,
        update: UserProfileUpdate,
    ) -> Result<UserProfile, AppError> {
        self.remote.update_user(uid, update).await
    }

    // ---- internals ----

    /// Whole-trip read-modify-write, routed to the owning backend. The trip
    /// must already exist; nothing here creates trips implicitly.
    async fn mutate_trip<F>(&self, trip: &TripRef, mutate: F) -> Result<Trip, AppError>
    where
        F: FnOnce(&mut Trip) -> Result<(), AppError>,
    {
        match trip {
            TripRef::Guest(id) => {
                let mut stored = self.local.get_trip(id).await?.ok_or(AppError::NotFound)?;
                mutate(&mut stored)?;
                stored.updated_at = Utc::now();
                self.local.upsert_trip(stored).await
            }
            TripRef::Remote(id) => self.remote.with_trip(id, mutate).await,
        }
    }

    /// Identity recorded on created sub-entities: guest trips always write as
    /// the guest profile, remote trips need a signed-in user.
    fn require_actor(&self, trip: &TripRef, actor: Option<&str>) -> Result<String, AppError> {
        match trip {
            TripRef::Guest(_) => Ok(GUEST_OWNER.to_string()),
            TripRef::Remote(_) => actor
                .map(str::to_string)
                .ok_or(AppError::Unauthenticated),
        }
    }
}

// Review invalidation: any add/edit/delete of a day's activities makes an
// existing review stale, so it is dropped on the spot.
fn invalidate_review(day: &mut Day) {
    if day.day_review.take().is_some() {
        tracing::debug!("day review dropped after itinerary change");
    }
}

fn validate_trip_form(mut form: TripForm) -> Result<TripForm, AppError> {
    form.title = validate_title(&form.title, "trip title")?;
    if form.start_date > form.end_date {
        return Err(AppError::validation("start date must not be after end date"));
    }
    Ok(form)
}

fn normalize_activity_form(form: &mut ActivityForm) {
    form.title = form.title.trim().to_string();
    form.time = normalize_optional(form.time.take());
    form.description = normalize_optional(form.description.take());
    form.map_link = normalize_optional(form.map_link.take());
}

fn validate_activity(activity: &Activity) -> Result<(), AppError> {
    if activity.title.trim().is_empty() {
        return Err(AppError::validation("activity title is required"));
    }
    match (activity.lat, activity.lng) {
        (Some(_), None) | (None, Some(_)) => {
            return Err(AppError::validation(
                "latitude and longitude must be provided together",
            ));
        }
        _ => {}
    }
    if let Some(link) = &activity.map_link {
        Url::parse(link).map_err(|_| AppError::validation("map link must be a valid URL"))?;
    }
    Ok(())
}

fn validate_rating(rating: u8) -> Result<(), AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::validation("rating must be between 1 and 5"));
    }
    Ok(())
}

fn validate_title(title: &str, what: &str) -> Result<String, AppError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{what} is required")));
    }
    Ok(trimmed.to_string())
}

fn validate_link(link: &str) -> Result<String, AppError> {
    let trimmed = link.trim();
    Url::parse(trimmed).map_err(|_| AppError::validation("note link must be a valid URL"))?;
    Ok(trimmed.to_string())
}

fn validate_email(email: &str) -> Result<String, AppError> {
    let trimmed = email.trim().to_lowercase();
    let valid = trimmed
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if !valid {
        return Err(AppError::validation("invalid email address"));
    }
    Ok(trimmed)
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
