//! qr-capture HTTP Server
//!
//! Venue signup and billing, QR lead capture, and the Stripe webhook.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use capture_billing::{BillingConfig, StripeClient};
use capture_core::{MemoryStore, PostgresStore, Store};
use capture_notify::{LogNotifier, Notifier, Smtp2GoNotifier};
use capture_server::{router, AppConfig, AppState};

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

    let config = AppConfig::from_env();
    if config.uses_dev_secret() {
        tracing::warn!("⚠ SECRET_KEY not set - using the development session key");
    }

    // Initialize storage
    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url).await?;
            tracing::info!("✓ Connected to PostgreSQL");
            Arc::new(store)
        }
        None => {
            tracing::warn!("⚠ DATABASE_URL not set - using in-memory store");
            tracing::warn!("  Venues and leads are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Initialize email
    let notifier: Arc<dyn Notifier> = match Smtp2GoNotifier::from_env() {
        Ok(notifier) => {
            tracing::info!("✓ SMTP2GO configured (sender {})", notifier.sender());
            Arc::new(notifier)
        }
        Err(_) => {
            tracing::warn!("⚠ SMTP2GO not configured - emails will only be logged");
            tracing::warn!("  Set SMTP2GO_API_KEY in .env");
            Arc::new(LogNotifier::new())
        }
    };

    let mut state = AppState::new(store, notifier, config.clone());

    // Initialize payments
    match BillingConfig::from_env() {
        Ok(billing) => {
            if billing.is_test_mode() {
                tracing::info!("✓ Stripe configured (test mode, {}-day trial)", billing.trial_days);
            } else {
                tracing::info!("✓ Stripe configured ({}-day trial)", billing.trial_days);
            }
            let checkout = Arc::new(StripeClient::new(&billing));
            state = state.with_billing(&billing, checkout);
        }
        Err(e) => {
            tracing::warn!("⚠ Stripe not configured - payments disabled ({})", e);
            tracing::warn!("  Set STRIPE_SECRET_KEY, STRIPE_WEBHOOK_SECRET and STRIPE_PRICE_ID in .env");
        }
    }

    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 qr-capture server running on http://{}", config.bind_addr);
    tracing::info!("   Public URL: {}", config.base_url);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /signup                 - Venue signup");
    tracing::info!("  GET  /c/{{slug}}               - Customer capture page");
    tracing::info!("  POST /c/{{slug}}/submit        - Submit a lead");
    tracing::info!("  GET  /dashboard              - Venue dashboard");
    tracing::info!("  GET  /dashboard/leads/export - Export leads as CSV");
    tracing::info!("  GET  /api/leads              - Recent leads (JSON)");
    tracing::info!("  GET  /api/health             - Health check");
    tracing::info!("  POST /webhook/stripe         - Stripe webhook");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
