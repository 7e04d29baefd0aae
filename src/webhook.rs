//! LINE webhook HTTP handlers

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::timeout;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::crypto::{LineSignature, SIGNATURE_HEADER};
use crate::dispatcher::{Dispatcher, decode_events};
use crate::error::BotError;

/// Webhook server state
#[derive(Clone)]
pub struct WebhookState {
    pub config: Arc<BotConfig>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the application router
pub fn build_router(state: WebhookState) -> Router {
    let media = ServeDir::new(&state.config.media_dir);

    Router::new()
        // LINE webhook endpoint
        .route("/api", post(handle_webhook))
        .route("/api/", post(handle_webhook))
        .route("/health", get(health_check))
        // Downloaded media, previews and static assets
        .nest_service("/images", media)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Run the webhook HTTP server
pub async fn run_server(addr: SocketAddr, state: WebhookState) -> anyhow::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Middleware to log all incoming HTTP requests
async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let query = uri.query().map(|q| format!("?{}", q)).unwrap_or_default();

    info!("🌐 HTTP {} {}{}", method, uri.path(), query);

    let response = next.run(req).await;

    info!("📤 Response status: {}", response.status());

    response
}

fn reject(err: BotError) -> (StatusCode, String) {
    (err.status_code(), err.to_string())
}

/// Handle an event batch (POST request from LINE)
async fn handle_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, (StatusCode, String)> {
    debug!("Request body length: {} bytes", body.len());

    // Verify signature
    if state.config.skip_signature_verification {
        warn!("⚠️ Signature verification skipped (SKIP_SIGNATURE_VERIFICATION is set)");
    } else {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !LineSignature::verify(&body, signature, &state.config.channel_secret) {
            warn!("Invalid or missing {} header", SIGNATURE_HEADER);
            return Err(reject(BotError::Authentication));
        }
    }

    let events = decode_events(&body).map_err(|e| {
        error!("Failed to decode webhook body: {}", e);
        reject(e)
    })?;
    info!("📥 Received {} event(s) from LINE", events.len());

    // Dispatch the whole batch under one deadline
    let report = match timeout(
        state.config.request_timeout(),
        state.dispatcher.dispatch_all(&events),
    )
    .await
    {
        Ok(report) => report,
        Err(_) => {
            error!(
                "Dispatch timed out after {}s",
                state.config.request_timeout_secs
            );
            return Err(reject(BotError::Timeout));
        }
    };

    match report.first_error() {
        Some(e) => {
            warn!(
                "{} of {} event(s) failed; reporting the first",
                report.error_count(),
                report.len()
            );
            Err((e.status_code(), e.to_string()))
        }
        None => Ok("OK"),
    }
}
