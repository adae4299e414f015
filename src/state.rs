use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{palette::TripPalette, trips::TripService},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub trips: TripService,
    pub palette: Arc<TripPalette>,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool, trips: TripService) -> Self {
        Self {
            config,
            db,
            trips,
            palette: Arc::new(TripPalette::new()),
        }
    }
}
