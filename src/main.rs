use std::error::Error;
use std::sync::Arc;

use log::{error, info};
use migration::{Migrator, MigratorTrait};

use crate::api::AppState;
use crate::auth::JwtKeys;
use crate::config::Config;
use crate::credentials::{CredentialCell, Refresher};
use crate::database::DatabaseStore;
use crate::spotify::SpotifyClient;
use crate::store::{MemoryStore, TrackStore};

mod api;
mod auth;
mod config;
mod credentials;
mod database;
mod error;
mod library;
mod logger;
mod spotify;
mod store;
mod tracks;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    let config = Config::from_env();
    logger::init(config.log_level)?;

    let store: Arc<dyn TrackStore> = if config.uses_memory_store() {
        info!("Using the in-memory track store");
        Arc::new(MemoryStore::new())
    } else {
        let db = database::connect(&config.database_url).await?;
        Migrator::up(&db, None).await?;
        info!("Connected to {}", config.database_url);
        Arc::new(DatabaseStore::new(db))
    };

    let spotify = Arc::new(SpotifyClient::new(&config));
    let refresher = Arc::new(Refresher::new(spotify.clone(), CredentialCell::default()));
    let renewal = refresher.spawn();

    let state = AppState {
        store,
        refresher,
        spotify,
        keys: JwtKeys::new(&config.jwt_secret),
    };
    let app = api::create_router(state, config.body_limit);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    renewal.cancel();
    served?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
