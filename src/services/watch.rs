use tokio::sync::broadcast;

/// Broadcast payload emitted after every successful trip write, on both
/// storage backends.
#[derive(Debug, Clone)]
pub struct TripChanged {
    pub trip_id: String,
}

/// Live subscription to one trip id. Delivery is at-least-once and not
/// strictly ordered under rapid successive writes; consumers refetch the trip
/// on every delivery. Dropping the watch is the teardown -- no further
/// deliveries after that.
pub struct TripWatch {
    trip_id: String,
    rx: broadcast::Receiver<TripChanged>,
}

impl std::fmt::Debug for TripWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripWatch")
            .field("trip_id", &self.trip_id)
            .finish_non_exhaustive()
    }
}

impl TripWatch {
    pub(crate) fn new(trip_id: String, rx: broadcast::Receiver<TripChanged>) -> Self {
        Self { trip_id, rx }
    }

    /// Waits for the next change to the watched trip. Returns `None` once the
    /// backing store has gone away.
    pub async fn changed(&mut self) -> Option<TripChanged> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.trip_id == self.trip_id => return Some(change),
                Ok(_) => continue,
                // A lagged receiver may have missed a change to our trip;
                // deliver a synthetic one so the consumer refetches.
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    return Some(TripChanged {
                        trip_id: self.trip_id.clone(),
                    })
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
