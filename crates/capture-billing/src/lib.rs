//! # capture-billing
//!
//! Stripe billing for qr-capture venues.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐  checkout   ┌─────────────────┐  webhook   ┌──────────────────────┐
//! │  /signup    │────────────▶│  Stripe Hosted  │───────────▶│  WebhookVerifier     │
//! │  (trialing) │             │  Checkout Page  │            │  SubscriptionMachine │
//! └─────────────┘             └─────────────────┘            └──────────┬───────────┘
//!                                                                       │ update row
//!                                                           ┌───────────▼───────────┐
//!                                     every request ───────▶│  gate::Access         │
//!                                                           └───────────────────────┘
//! ```
//!
//! The signup handler creates a trialing venue and a checkout session carrying
//! the venue's correlation token. Stripe later posts signed events; the
//! verifier authenticates the raw body, the machine finds the venue and writes
//! the new billing fields, and the gate reads them on each request.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use capture_billing::{BillingConfig, Outcome, SubscriptionMachine};
//!
//! let config = BillingConfig::from_env()?;
//! let machine = SubscriptionMachine::new(store, &config);
//!
//! match machine.process(&body, signature).await? {
//!     Outcome::Rejected(_) => { /* 400 */ }
//!     _ => { /* 200 */ }
//! }
//! ```

mod checkout;
mod config;
mod error;
mod event;
mod gate;
mod machine;
mod webhook;

pub use checkout::{CheckoutProvider, CheckoutRequest, CheckoutSession, StripeClient, CORRELATION_METADATA_KEY};
pub use config::{BillingConfig, DEFAULT_SIGNATURE_TOLERANCE_SECS, DEFAULT_TRIAL_DAYS};
pub use error::{BillingError, Result, WebhookError};
pub use event::{
    map_provider_status, BillingEvent, CheckoutCompleted, EventKind, EventPayload, PaymentFailed,
    SubscriptionDeleted, SubscriptionUpdated,
};
pub use gate::{features_enabled, Access};
pub use machine::{
    next_billing_state, venue_lookup, IgnoreReason, Outcome, RejectReason, SubscriptionMachine, Transition,
};
pub use webhook::{signature_header, SignatureHeader, WebhookVerifier, MAX_CLOCK_SKEW_SECS};
