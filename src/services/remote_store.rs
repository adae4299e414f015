use anyhow::anyhow;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tokio::sync::broadcast;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        invitation::{Invitation, InvitationStatus},
        trip::Trip,
        user::{UserProfile, UserProfileUpdate},
    },
    services::watch::{TripChanged, TripWatch},
};

/// Shared-trip persistence over the document store: one row per trip whose
/// `data` column is the whole JSON document. Every write is a
/// read-modify-write of that document -- last write wins at whole-document
/// granularity, concurrent writers do not merge.
#[derive(Clone)]
pub struct RemoteTripStore {
    pool: DbPool,
    changes: broadcast::Sender<TripChanged>,
}

impl RemoteTripStore {
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self { pool, changes }
    }

    // ---- trips ----

    pub async fn create_trip(&self, trip: &Trip) -> Result<(), AppError> {
        let data = encode_doc(trip)?;
        sqlx::query("INSERT INTO trips (id, data, updated_at) VALUES (?1, ?2, ?3)")
            .bind(&trip.id)
            .bind(data)
            .bind(trip.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_trip(&self, trip_id: &str) -> Result<Option<Trip>, AppError> {
        let row = sqlx::query("SELECT data FROM trips WHERE id = ?1")
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| trip_from_row(&r)).transpose()
    }

    /// Trips whose participant set contains `user_id`, newest change first.
    pub async fn list_trips_for(&self, user_id: &str) -> Result<Vec<Trip>, AppError> {
        let rows = sqlx::query(
            "SELECT t.data FROM trips t, json_each(t.data, '$.participants') je \
             WHERE je.value = ?1 ORDER BY t.updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(trip_from_row).collect()
    }

    /// Read-modify-write of the whole trip document plus a refreshed update
    /// timestamp. No lock is taken between the read and the write.
    pub async fn with_trip<F>(&self, trip_id: &str, mutate: F) -> Result<Trip, AppError>
    where
        F: FnOnce(&mut Trip) -> Result<(), AppError>,
    {
        let mut trip = self.get_trip(trip_id).await?.ok_or(AppError::NotFound)?;
        mutate(&mut trip)?;
        trip.updated_at = Utc::now();
        self.put_trip(&trip).await?;
        self.notify(trip_id);
        Ok(trip)
    }

    pub async fn delete_trip(&self, trip_id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM trips WHERE id = ?1")
            .bind(trip_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        self.notify(trip_id);
        Ok(())
    }

    pub fn subscribe(&self, trip_id: &str) -> TripWatch {
        TripWatch::new(trip_id.to_string(), self.changes.subscribe())
    }

    async fn put_trip(&self, trip: &Trip) -> Result<(), AppError> {
        let data = encode_doc(trip)?;
        let result = sqlx::query("UPDATE trips SET data = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(&trip.id)
            .bind(data)
            .bind(trip.updated_at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    fn notify(&self, trip_id: &str) {
        let _ = self.changes.send(TripChanged {
            trip_id: trip_id.to_string(),
        });
    }

    // ---- invitations ----

    pub async fn create_invitation(&self, invitation: &Invitation) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO invitations (id, trip_id, invited_email, invited_by, status, created_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&invitation.id)
        .bind(&invitation.trip_id)
        .bind(&invitation.invited_email)
        .bind(&invitation.invited_by)
        .bind(invitation.status.as_str())
        .bind(invitation.created_at)
        .bind(invitation.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_invitation(&self, invitation_id: &str) -> Result<Option<Invitation>, AppError> {
        let row = sqlx::query(
            "SELECT id, trip_id, invited_email, invited_by, status, created_at, expires_at \
             FROM invitations WHERE id = ?1",
        )
        .bind(invitation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| invitation_from_row(&r)).transpose()
    }

    pub async fn pending_invitations_for(&self, email: &str) -> Result<Vec<Invitation>, AppError> {
        let rows = sqlx::query(
            "SELECT id, trip_id, invited_email, invited_by, status, created_at, expires_at \
             FROM invitations WHERE invited_email = ?1 AND status = 'pending' \
             ORDER BY created_at DESC",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(invitation_from_row).collect()
    }

    /// Status flip and participant union in one transaction, so a failure
    /// between the two can never leave an accepted invitation without
    /// membership.
    pub async fn accept_invitation(
        &self,
        invitation_id: &str,
        trip_id: &str,
        user_id: &str,
    ) -> Result<Trip, AppError> {
        let mut tx = self.pool.begin().await?;

        let flipped =
            sqlx::query("UPDATE invitations SET status = 'accepted' WHERE id = ?1 AND status = 'pending'")
                .bind(invitation_id)
                .execute(&mut *tx)
                .await?;
        if flipped.rows_affected() == 0 {
            return Err(AppError::AlreadyResolved);
        }

        let row = sqlx::query("SELECT data FROM trips WHERE id = ?1")
            .bind(trip_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound)?;
        let mut trip = trip_from_row(&row)?;
        trip.add_participant(user_id);
        trip.updated_at = Utc::now();

        sqlx::query("UPDATE trips SET data = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(&trip.id)
            .bind(encode_doc(&trip)?)
            .bind(trip.updated_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.notify(trip_id);
        Ok(trip)
    }

    pub async fn decline_invitation(&self, invitation_id: &str) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE invitations SET status = 'declined' WHERE id = ?1 AND status = 'pending'")
                .bind(invitation_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::AlreadyResolved);
        }
        Ok(())
    }

    // ---- users ----

    /// Creates the profile on first sign-in; an existing profile is returned
    /// untouched.
    pub async fn ensure_user(&self, profile: UserProfile) -> Result<UserProfile, AppError> {
        if let Some(existing) = self.get_user(&profile.uid).await? {
            return Ok(existing);
        }
        sqlx::query(
            "INSERT INTO users (uid, email, display_name, photo_url, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&profile.uid)
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(&profile.photo_url)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(profile)
    }

    pub async fn get_user(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        let row = sqlx::query(
            "SELECT uid, email, display_name, photo_url, created_at, updated_at FROM users WHERE uid = ?1",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| user_from_row(&r)).transpose()
    }

    pub async fn update_user(
        &self,
        uid: &str,
        update: UserProfileUpdate,
    ) -> Result<UserProfile, AppError> {
        let mut profile = self.get_user(uid).await?.ok_or(AppError::NotFound)?;
        if let Some(display_name) = update.display_name {
            profile.display_name = display_name;
        }
        if let Some(photo_url) = update.photo_url {
            profile.photo_url = Some(photo_url);
        }
        profile.updated_at = Utc::now();
        sqlx::query(
            "UPDATE users SET display_name = ?2, photo_url = ?3, updated_at = ?4 WHERE uid = ?1",
        )
        .bind(uid)
        .bind(&profile.display_name)
        .bind(&profile.photo_url)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(profile)
    }
}

fn encode_doc(trip: &Trip) -> Result<String, AppError> {
    serde_json::to_string(trip).map_err(|err| AppError::Other(err.into()))
}

fn trip_from_row(row: &SqliteRow) -> Result<Trip, AppError> {
    let data: String = row.try_get("data")?;
    serde_json::from_str(&data).map_err(|err| AppError::Other(anyhow!("corrupt trip document: {err}")))
}

fn invitation_from_row(row: &SqliteRow) -> Result<Invitation, AppError> {
    let status: String = row.try_get("status")?;
    let status = InvitationStatus::parse(&status)
        .ok_or_else(|| AppError::Other(anyhow!("unknown invitation status: {status}")))?;
    Ok(Invitation {
        id: row.try_get("id")?,
        trip_id: row.try_get("trip_id")?,
        invited_email: row.try_get("invited_email")?,
        invited_by: row.try_get("invited_by")?,
        status,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<UserProfile, AppError> {
    Ok(UserProfile {
        uid: row.try_get("uid")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        photo_url: row.try_get("photo_url")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}
