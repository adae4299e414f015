use tokio::net::TcpListener;
use tracing::{error, info, warn};
use wanderlog::config::AppConfig;
use wanderlog::db::init_pool;
use wanderlog::error::AppError;
use wanderlog::routes::{create_router, setup_router};
use wanderlog::services::{
    local_store::LocalTripStore, remote_store::RemoteTripStore, trips::TripService,
};
use wanderlog::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;

    let issues = config.setup_issues();
    if !issues.is_empty() {
        warn!("configuration incomplete, serving setup screen: missing {issues:?}");
        let listener = TcpListener::bind(config.listen_addr).await?;
        info!("setup mode listening on {}", listener.local_addr()?);
        axum::serve(listener, setup_router(issues).into_make_service()).await?;
        return Ok(());
    }

    let db = init_pool(&config.database_url, config.db_max_connections).await?;

    if let Err(err) = sqlx::migrate!("./migrations").run(&db).await {
        error!("migration failed: {err:?}");
        return Err(AppError::Other(err.into()));
    }

    let local = LocalTripStore::new(config.guest_root.clone());
    local.ensure_structure().await?;

    let remote = RemoteTripStore::new(db.clone());
    let trips = TripService::new(local, remote, config.public_origin.clone());

    let state = AppState::new(config.clone(), db, trips);

    let app = create_router(state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,wanderlog=debug".into());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
