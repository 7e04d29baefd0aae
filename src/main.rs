//! LINE Zombie Bot - Main Entry Point
//!
//! Receives LINE webhook batches on `/api/`, answers them through the
//! Messaging API and serves downloaded media under `/images`.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use line_zombie_bot::config::BotConfig;
use line_zombie_bot::webhook::{self, WebhookState};
use line_zombie_bot::{Composer, Dispatcher, DiskMediaStore, LineApiClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,line_zombie_bot=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 LINE Zombie Bot starting...");

    // Load configuration
    let config = Arc::new(BotConfig::from_env()?);
    info!(
        "📋 Configuration loaded (API: {}, media: {:?}, max files: {})",
        config.api_base_url, config.media_dir, config.max_media_files
    );
    if config.skip_signature_verification {
        tracing::warn!("⚠️ Signature verification is disabled");
    }

    tokio::fs::create_dir_all(&config.media_dir)
        .await
        .with_context(|| format!("Failed to create media directory {:?}", config.media_dir))?;

    // Create shared state
    let api = LineApiClient::new(&config).context("Failed to build LINE API client")?;
    let media = Arc::new(DiskMediaStore::new(
        config.media_dir.clone(),
        config.max_media_files,
        api.clone(),
    ));
    let composer = Composer::new(media, config.media_base_url());
    let state = WebhookState {
        config: config.clone(),
        dispatcher: Arc::new(Dispatcher::new(api, composer)),
    };

    // Spawn webhook server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let server = spawn_webhook_server(addr, state);

    info!("🌐 Webhook endpoint: {}/api/", config.public_base_url);

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => info!("📢 Shutdown signal received"),
        Err(err) => tracing::error!("Unable to listen for shutdown signal: {}", err),
    }

    // Graceful shutdown
    info!("🛑 Shutting down server...");
    server.abort();

    info!("✅ LINE Zombie Bot stopped");
    Ok(())
}

/// Spawn the webhook HTTP server
fn spawn_webhook_server(addr: SocketAddr, state: WebhookState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = webhook::run_server(addr, state).await {
            tracing::error!("Webhook server error: {}", e);
        }
    })
}
