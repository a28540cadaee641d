//! keepsake HTTP Server
//!
//! Axum-based API for the gift-page checkout flow: checkout dispatch,
//! record reads, and the per-provider payment webhooks.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keepsake_payments::{
    CardProvider, Dispatcher, GiftStore, MediaStore, MemoryGiftStore, PassthroughMedia,
    PixGateway, PixProvider, StripeClient, WebhookProcessor,
};

use crate::handlers::{
    create_checkout, create_gift, gift_status, health_check, pix_webhook, pix_webhook_probe,
    stripe_webhook,
};
use crate::state::AppState;

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/checkout", post(create_checkout))
        .route("/api/gift", get(gift_status).post(create_gift))
        .route("/api/webhooks/pix", get(pix_webhook_probe).post(pix_webhook))
        .route("/api/webhooks/stripe", post(stripe_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let public_url =
        std::env::var("PUBLIC_URL").unwrap_or_else(|_| "http://localhost:3000".into());

    // The memory store is the fallback when no durable backend is wired;
    // it is injected explicitly so handlers never touch a global.
    let store: Arc<dyn GiftStore> = Arc::new(MemoryGiftStore::new());
    let media: Arc<dyn MediaStore> = Arc::new(PassthroughMedia);

    let stripe = StripeClient::from_env().ok().map(Arc::new);
    if stripe.is_some() {
        tracing::info!("✓ card checkout configured");
    } else {
        tracing::warn!("⚠ card checkout disabled");
        tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
    }

    let pix = PixGateway::from_env().ok().map(Arc::new);
    if pix.is_some() {
        tracing::info!("✓ Pix checkout configured");
    } else {
        tracing::warn!("⚠ Pix checkout disabled");
        tracing::warn!("  Set PIX_API_KEY and PIX_WEBHOOK_SECRET in .env");
    }

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        stripe.clone().map(|c| c as Arc<dyn CardProvider>),
        pix.clone().map(|p| p as Arc<dyn PixProvider>),
        public_url,
    ));
    let webhooks = Arc::new(WebhookProcessor::new(store.clone()));

    let state = AppState {
        store,
        media,
        dispatcher,
        webhooks,
        stripe,
        pix,
    };

    let app = router(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 keepsake server running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health               - Health check");
    tracing::info!("  POST /api/checkout         - Start a gift checkout");
    tracing::info!("  POST /api/gift             - Create a gift record");
    tracing::info!("  GET  /api/gift?id=...      - Read gift status");
    tracing::info!("  POST /api/webhooks/pix     - Pix payment webhook");
    tracing::info!("  POST /api/webhooks/stripe  - Card payment webhook");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received, stopping");
}
