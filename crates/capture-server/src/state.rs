//! Application State

use std::sync::Arc;

use capture_billing::{BillingConfig, CheckoutProvider, SubscriptionMachine};
use capture_core::Store;
use capture_notify::Notifier;
use chrono::Duration;

use crate::config::AppConfig;
use crate::session::SessionKeys;

/// Billing services, present only when Stripe is configured
#[derive(Clone)]
pub struct Billing {
    /// Verifies and applies webhook deliveries
    pub machine: Arc<SubscriptionMachine<dyn Store>>,

    /// Hosted checkout and billing portal
    pub checkout: Arc<dyn CheckoutProvider>,

    /// Trial granted at signup
    pub trial: Duration,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Venue and lead persistence
    pub store: Arc<dyn Store>,

    /// Stripe billing (optional - None if not configured)
    pub billing: Option<Billing>,

    /// Outbound email
    pub notifier: Arc<dyn Notifier>,

    pub sessions: Arc<SessionKeys>,

    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, config: AppConfig) -> Self {
        Self {
            store,
            billing: None,
            notifier,
            sessions: Arc::new(SessionKeys::new(&config.secret_key)),
            config: Arc::new(config),
        }
    }

    /// Enable checkout and webhooks
    pub fn with_billing(mut self, billing: &BillingConfig, checkout: Arc<dyn CheckoutProvider>) -> Self {
        self.billing = Some(Billing {
            machine: Arc::new(SubscriptionMachine::new(self.store.clone(), billing)),
            checkout,
            trial: billing.trial(),
        });
        self
    }
}
