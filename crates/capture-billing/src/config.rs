//! Billing Configuration

use chrono::Duration;

use crate::error::{BillingError, Result};

/// Default trial length granted at signup and at checkout
pub const DEFAULT_TRIAL_DAYS: u32 = 7;

/// Default maximum age of a signed webhook
pub const DEFAULT_SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Everything the verifier, state machine and checkout client need.
///
/// Built once at startup and passed in at construction.
#[derive(Clone)]
pub struct BillingConfig {
    /// Stripe API key (`sk_...` or restricted `rk_...`)
    pub secret_key: String,

    /// Webhook signing secret (`whsec_...`)
    pub webhook_secret: String,

    /// Recurring price the checkout subscribes to
    pub price_id: String,

    pub trial_days: u32,

    /// Signed webhooks older than this are rejected
    pub signature_tolerance_secs: i64,
}

impl std::fmt::Debug for BillingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingConfig")
            .field("secret_key", &"[redacted]")
            .field("webhook_secret", &"[redacted]")
            .field("price_id", &self.price_id)
            .field("trial_days", &self.trial_days)
            .field("signature_tolerance_secs", &self.signature_tolerance_secs)
            .finish()
    }
}

impl BillingConfig {
    pub fn new(
        secret_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        price_id: impl Into<String>,
    ) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            price_id: price_id.into(),
            trial_days: DEFAULT_TRIAL_DAYS,
            signature_tolerance_secs: DEFAULT_SIGNATURE_TOLERANCE_SECS,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;
        let price_id = std::env::var("STRIPE_PRICE_ID")
            .map_err(|_| BillingError::Config("STRIPE_PRICE_ID not set".into()))?;

        let mut config = Self::new(secret_key, webhook_secret, price_id);

        if let Ok(days) = std::env::var("TRIAL_DAYS") {
            config.trial_days = days
                .parse()
                .map_err(|_| BillingError::Config(format!("TRIAL_DAYS is not a number: {days}")))?;
        }
        if let Ok(secs) = std::env::var("WEBHOOK_TOLERANCE_SECS") {
            config.signature_tolerance_secs = secs.parse().map_err(|_| {
                BillingError::Config(format!("WEBHOOK_TOLERANCE_SECS is not a number: {secs}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check key prefixes and numeric ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.secret_key.starts_with("sk_") || self.secret_key.starts_with("rk_")) {
            return Err(BillingError::Config(
                "STRIPE_SECRET_KEY must start with sk_ or rk_".into(),
            ));
        }
        if !self.webhook_secret.starts_with("whsec_") {
            return Err(BillingError::Config(
                "STRIPE_WEBHOOK_SECRET must start with whsec_".into(),
            ));
        }
        if self.price_id.trim().is_empty() {
            return Err(BillingError::Config("STRIPE_PRICE_ID is empty".into()));
        }
        if self.signature_tolerance_secs <= 0 {
            return Err(BillingError::Config(
                "WEBHOOK_TOLERANCE_SECS must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Trial length as a duration
    pub fn trial(&self) -> Duration {
        Duration::days(i64::from(self.trial_days))
    }

    pub fn is_test_mode(&self) -> bool {
        self.secret_key.starts_with("sk_test_") || self.secret_key.starts_with("rk_test_")
    }
}
