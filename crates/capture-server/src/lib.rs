//! # capture-server
//!
//! Axum HTTP surface for qr-capture: marketing pages, venue signup and
//! dashboard, the customer capture form, and the Stripe webhook endpoint.

pub mod config;
pub mod handlers;
pub mod pages;
pub mod session;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::AppConfig;
pub use state::{AppState, Billing};

use crate::handlers::{
    about, api_leads, billing_portal, capture_page, capture_submit, dashboard, export_leads,
    health_check, home, login, login_form, logout, pricing, privacy, settings_form, signup,
    signup_form, signup_success, stripe_webhook, terms, update_settings,
};

/// Build the application router
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Marketing
        .route("/", get(home))
        .route("/pricing", get(pricing))
        .route("/about", get(about))
        .route("/privacy", get(privacy))
        .route("/terms", get(terms))

        // Signup & login
        .route("/signup", get(signup_form).post(signup))
        .route("/signup/success", get(signup_success))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))

        // Customer capture
        .route("/c/{slug}", get(capture_page))
        .route("/c/{slug}/submit", post(capture_submit))

        // Venue dashboard
        .route("/dashboard", get(dashboard))
        .route("/dashboard/settings", get(settings_form).post(update_settings))
        .route("/dashboard/billing", get(billing_portal))
        .route("/dashboard/leads/export", get(export_leads))

        // API
        .route("/api/leads", get(api_leads))
        .route("/api/health", get(health_check))

        // Payments
        .route("/webhook/stripe", post(stripe_webhook))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
