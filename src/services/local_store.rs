use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::{fs, sync::broadcast, sync::Mutex};
use tracing::warn;

use crate::{
    error::AppError,
    models::trip::Trip,
    services::watch::{TripChanged, TripWatch},
};

const GUEST_TRIPS_FILE: &str = "guest_trips.json";
const GUEST_MODE_FILE: &str = "guest_mode.json";

/// Guest-trip persistence: one JSON file holding the whole trip collection,
/// read and rewritten in full on every access, plus a guest-mode flag slot.
/// Writes within the process are serialized by an internal lock; there is no
/// coordination across instances (last writer wins).
#[derive(Clone)]
pub struct LocalTripStore {
    root: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
    changes: broadcast::Sender<TripChanged>,
}

impl LocalTripStore {
    pub fn new(root: PathBuf) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            root: Arc::new(root),
            write_lock: Arc::new(Mutex::new(())),
            changes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_structure(&self) -> Result<(), AppError> {
        fs::create_dir_all(self.root()).await?;
        Ok(())
    }

    fn trips_path(&self) -> PathBuf {
        self.root().join(GUEST_TRIPS_FILE)
    }

    /// Full guest-trip collection. Missing or malformed content reads as the
    /// empty collection; a parse failure never surfaces to the caller.
    pub async fn list_trips(&self) -> Result<Vec<Trip>, AppError> {
        let path = self.trips_path();
        if !fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let raw = fs::read(&path).await?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_slice(&raw) {
            Ok(trips) => Ok(trips),
            Err(err) => {
                warn!("guest trip collection unreadable, treating as empty: {err}");
                Ok(Vec::new())
            }
        }
    }

    pub async fn get_trip(&self, trip_id: &str) -> Result<Option<Trip>, AppError> {
        let trips = self.list_trips().await?;
        Ok(trips.into_iter().find(|t| t.id == trip_id))
    }

    pub async fn has_trips(&self) -> Result<bool, AppError> {
        Ok(!self.list_trips().await?.is_empty())
    }

    /// Insert-or-replace by trip id, idempotent. Emits a change notification
    /// so other readers of the same trip refresh without polling.
    pub async fn upsert_trip(&self, trip: Trip) -> Result<Trip, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut trips = self.list_trips().await?;
        match trips.iter_mut().find(|t| t.id == trip.id) {
            Some(existing) => *existing = trip.clone(),
            None => trips.push(trip.clone()),
        }
        self.save(&trips).await?;
        let _ = self.changes.send(TripChanged {
            trip_id: trip.id.clone(),
        });
        Ok(trip)
    }

    /// Removes a trip by id; `Ok(false)` when no such trip was stored.
    pub async fn delete_trip(&self, trip_id: &str) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut trips = self.list_trips().await?;
        let before = trips.len();
        trips.retain(|t| t.id != trip_id);
        if trips.len() == before {
            return Ok(false);
        }
        self.save(&trips).await?;
        let _ = self.changes.send(TripChanged {
            trip_id: trip_id.to_string(),
        });
        Ok(true)
    }

    /// Drops the whole guest collection; the hook a future account migration
    /// runs after copying trips into the remote store.
    pub async fn clear_trips(&self) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let path = self.trips_path();
        if fs::try_exists(&path).await? {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    pub async fn set_guest_mode(&self, enabled: bool) -> Result<(), AppError> {
        self.ensure_structure().await?;
        let data = serde_json::to_vec(&enabled).map_err(|err| AppError::Other(err.into()))?;
        fs::write(self.root().join(GUEST_MODE_FILE), data).await?;
        Ok(())
    }

    pub async fn guest_mode(&self) -> Result<bool, AppError> {
        let path = self.root().join(GUEST_MODE_FILE);
        if !fs::try_exists(&path).await? {
            return Ok(false);
        }
        let raw = fs::read(&path).await?;
        Ok(serde_json::from_slice(&raw).unwrap_or(false))
    }

    pub fn subscribe(&self, trip_id: &str) -> TripWatch {
        TripWatch::new(trip_id.to_string(), self.changes.subscribe())
    }

    async fn save(&self, trips: &[Trip]) -> Result<(), AppError> {
        self.ensure_structure().await?;
        let data = serde_json::to_vec_pretty(trips).map_err(|err| AppError::Other(err.into()))?;
        fs::write(self.trips_path(), data).await?;
        Ok(())
    }
}
