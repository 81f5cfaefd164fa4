mod config;
mod error;
mod persist;
mod room;
mod session;
mod state;
mod store;
mod utils {
    pub mod clean;
}
mod routes;

use std::sync::Arc;

use axum::{Extension, Router};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::persist::{JsonDir, PersistenceBackend};
use crate::state::Hub;
use crate::store::RoomStore;
use crate::utils::clean;
use error::AppErr;

#[tokio::main]
async fn main() -> Result<(), AppErr> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg   = Config::from_env()?;
    let json  = JsonDir::open(&cfg.data_dir).await?;
    info!(data_dir = %json.dir().display(), "room logs");
    let disk: Arc<dyn PersistenceBackend> = Arc::new(json);
    let store = Arc::new(RoomStore::new(disk.clone(), cfg.max_messages));
    let hub   = Hub::default();

    tokio::spawn(clean::task(disk, cfg.retention, cfg.sweep_interval));  // sweeper

    let app = Router::new()
        .merge(routes::router())
        .fallback_service(ServeDir::new(&cfg.static_dir))
        .layer(Extension(store))
        .layer(Extension(hub))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.port)).await?;
    info!("server running at http://localhost:{}", cfg.port);
    info!(max_messages = cfg.max_messages, "old rooms auto-deleted after {} days", cfg.keep_days);
    axum::serve(listener, app).await?;
    Ok(())
}
