//! MSME Hub Server Library
//!
//! Auth, user directory and real-time direct messaging between business
//! owners, mentors and lawyers, plus business profiles, book records and
//! GST guides.

pub mod book_records;
pub mod business;
pub mod chat;
pub mod core;
pub mod guides;
pub mod lawyer;

use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::core::{AppState, HubConfig};

pub async fn run() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed by an embedding process.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    info!("=== MSME Hub Server ===");

    let config = HubConfig::default();
    let root = hub_common::init_structure(&config.root)?;
    info!("Data root: {:?}", root);
    info!("Users database: {:?}", config.users_db);

    let port = config.port;
    let state = AppState::build(config).await?;
    info!("Auth, message store and live channel initialized");

    let app = crate::core::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("MSME Hub server listening on http://localhost:{}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
