use std::{env, net::SocketAddr, path::PathBuf};

use url::Url;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub listen_addr: SocketAddr,
    /// Directory holding the guest-trip JSON collection and the guest-mode flag.
    pub guest_root: PathBuf,
    /// Public origin used when building `/invite/<id>` links.
    pub public_origin: Url,
    pub maps_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://wanderlog.db".to_string());
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .map(|value| value.parse())
            .transpose()
            .map_err(|err| AppError::Config(format!("invalid DB_MAX_CONNECTIONS: {err}")))?
            .unwrap_or(8);
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let guest_root = env::var("GUEST_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("guest"));

        let public_origin: Url = env::var("PUBLIC_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid PUBLIC_ORIGIN: {err}")))?;

        let maps_api_key = env::var("MAPS_API_KEY").ok().filter(|key| {
            let trimmed = key.trim();
            !trimmed.is_empty() && trimmed != "your-api-key"
        });

        Ok(Self {
            database_url,
            db_max_connections,
            listen_addr,
            guest_root,
            public_origin,
            maps_api_key,
        })
    }

    /// Environment values still missing before the app can run normally.
    /// A non-empty result sends the server into setup mode at boot.
    pub fn setup_issues(&self) -> Vec<&'static str> {
        let mut issues = Vec::new();
        if self.maps_api_key.is_none() {
            issues.push("MAPS_API_KEY");
        }
        if self.database_url.trim().is_empty() {
            issues.push("DATABASE_URL");
        }
        issues
    }
}
