//! Stripe Checkout Integration
//!
//! Hosted checkout for the venue subscription, plus the customer billing
//! portal. The venue's correlation token rides along on the session so the
//! completion webhook can find the venue again.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use capture_core::VenueId;
use serde::{Deserialize, Serialize};
use stripe::{
    BillingPortalSession, CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateBillingPortalSession, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionSubscriptionData, CustomerId,
};

use crate::config::BillingConfig;
use crate::error::{BillingError, Result};

/// Metadata key carrying the correlation token
pub const CORRELATION_METADATA_KEY: &str = "correlation_token";

/// Request to create a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Embedded as `client_reference_id` and in metadata
    pub correlation_token: String,

    pub venue_id: VenueId,

    pub venue_name: String,

    /// Pre-fills the checkout form
    pub customer_email: String,

    /// URL to redirect after successful payment
    pub success_url: String,

    /// URL to redirect if checkout is cancelled
    pub cancel_url: String,
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Stripe session ID
    pub id: String,

    /// URL to redirect user to
    pub checkout_url: String,

    pub correlation_token: String,
}

/// Creates hosted checkout and portal sessions
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession>;

    /// Returns the portal URL for an existing billing customer
    async fn create_portal_session(&self, customer_reference: &str, return_url: &str) -> Result<String>;
}

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    price_id: String,
    trial_days: u32,
}

impl StripeClient {
    pub fn new(config: &BillingConfig) -> Self {
        Self {
            client: Client::new(config.secret_key.clone()),
            price_id: config.price_id.clone(),
            trial_days: config.trial_days,
        }
    }
}

fn session_metadata(request: &CheckoutRequest) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert(CORRELATION_METADATA_KEY.to_string(), request.correlation_token.clone());
    metadata.insert("venue_id".to_string(), request.venue_id.to_string());
    metadata.insert("venue_name".to_string(), request.venue_name.clone());
    metadata
}

#[async_trait]
impl CheckoutProvider for StripeClient {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let metadata = session_metadata(&request);

        let mut params = CreateCheckoutSession::new();
        params.client_reference_id = Some(&request.correlation_token);
        params.customer_email = Some(&request.customer_email);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.metadata = Some(metadata.clone());

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(self.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
            trial_period_days: (self.trial_days > 0).then_some(self.trial_days),
            metadata: Some(metadata),
            ..Default::default()
        });

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| BillingError::Stripe(e.to_string()))?;

        let checkout_url = session.url.ok_or_else(|| {
            BillingError::Stripe("No checkout URL returned".into())
        })?;

        tracing::info!(
            session_id = %session.id,
            venue_id = %request.venue_id,
            "Created checkout session"
        );

        Ok(CheckoutSession {
            id: session.id.to_string(),
            checkout_url,
            correlation_token: request.correlation_token,
        })
    }

    async fn create_portal_session(&self, customer_reference: &str, return_url: &str) -> Result<String> {
        let customer = CustomerId::from_str(customer_reference)
            .map_err(|e| BillingError::Stripe(format!("invalid customer id: {e}")))?;

        let mut params = CreateBillingPortalSession::new(customer);
        params.return_url = Some(return_url);

        let session = BillingPortalSession::create(&self.client, params)
            .await
            .map_err(|e| BillingError::Stripe(e.to_string()))?;

        Ok(session.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            correlation_token: "vt_abc".into(),
            venue_id: VenueId::new(),
            venue_name: "Blue Door".into(),
            customer_email: "owner@example.com".into(),
            success_url: "http://localhost:3000/signup/success".into(),
            cancel_url: "http://localhost:3000/signup".into(),
        }
    }

    #[test]
    fn test_metadata_carries_correlation_token() {
        let request = request();
        let metadata = session_metadata(&request);
        assert_eq!(metadata.get(CORRELATION_METADATA_KEY).map(String::as_str), Some("vt_abc"));
        assert_eq!(metadata.get("venue_id"), Some(&request.venue_id.to_string()));
    }

    #[test]
    fn test_client_from_config() {
        let config = BillingConfig::new("sk_test_abc", "whsec_abc", "price_123");
        let client = StripeClient::new(&config);
        assert_eq!(client.price_id, "price_123");
        assert_eq!(client.trial_days, 7);
    }
}
