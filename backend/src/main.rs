//! Main entry point for the guest backend.
//!
//! This file initializes the Axum web server, sets up the database
//! connection and registers the guest routes and middleware.

mod api;
mod auth;
mod config;
mod database;
mod errors;
mod repositories;
mod services;
mod state;
mod utils;

use anyhow::Context;
use config::Config;
use database::Database;
use state::AppState;
use tracing::info;
use tracing_subscriber::fmt::init;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();

    let config = Config::from_env()?;
    let db = Database::new(&config).await?;
    let port = config.server_port;

    let state = AppState::new(db.pool().clone(), config);
    let app = api::router(state);

    let bind_address = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;

    info!("Starting guest backend on port {}", port);
    axum::serve(listener, app).await?;

    db.close().await;
    Ok(())
}
