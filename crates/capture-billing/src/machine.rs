//! Subscription State Machine
//!
//! Verified billing events drive the venue's subscription fields:
//!
//! ```text
//!   signup ──▶ trialing ──checkout──▶ active ◀──updated──▶ past_due
//!                 │                     │  ▲                  │
//!                 │                     │  └────updated───────┘
//!                 └──────deleted────────┴───────deleted───────▶ canceled
//! ```
//!
//! Every transition overwrites fields from the event alone, so a retried
//! delivery lands on the same row state. Events are applied in arrival order.

use std::sync::Arc;

use capture_core::{BillingUpdate, SubscriptionStatus, Venue, VenueLookup, VenueStore};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::BillingConfig;
use crate::error::{Result, WebhookError};
use crate::event::{BillingEvent, EventKind, EventPayload};
use crate::webhook::WebhookVerifier;

/// A change written to a venue row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub event_id: String,
    pub kind: EventKind,
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
    /// First time this venue was linked to a billing customer
    pub first_checkout: bool,
    /// The row as written
    pub venue: Venue,
}

/// Acknowledged without mutation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IgnoreReason {
    UnrecognizedEventType { event_type: String },
    UnmatchedVenue { event_type: String, lookup: String },
    MalformedEventData { detail: String },
}

/// Refused; the provider should see a client error
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    InvalidSignature { detail: String },
}

/// What happened to one webhook delivery
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Applied(Transition),
    Ignored(IgnoreReason),
    Rejected(RejectReason),
}

impl Outcome {
    /// Applied and ignored deliveries are answered with 200
    pub const fn is_acknowledged(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::Ignored(_) => "ignored",
            Self::Rejected(_) => "rejected",
        }
    }
}

impl From<WebhookError> for Outcome {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::InvalidSignature(detail) => {
                Self::Rejected(RejectReason::InvalidSignature { detail })
            }
            WebhookError::UnrecognizedEventType(event_type) => {
                Self::Ignored(IgnoreReason::UnrecognizedEventType { event_type })
            }
            WebhookError::MalformedEventData(detail) => {
                Self::Ignored(IgnoreReason::MalformedEventData { detail })
            }
        }
    }
}

/// Which row an event applies to
pub fn venue_lookup(event: &BillingEvent) -> VenueLookup<'_> {
    match &event.payload {
        EventPayload::CheckoutCompleted(data) => VenueLookup::CorrelationToken(&data.correlation_token),
        EventPayload::SubscriptionUpdated(data) => {
            VenueLookup::SubscriptionReference(&data.subscription_reference)
        }
        EventPayload::SubscriptionDeleted(data) => {
            VenueLookup::SubscriptionReference(&data.subscription_reference)
        }
        EventPayload::PaymentFailed(data) => match (&data.subscription_reference, &data.customer_reference) {
            (Some(sub), _) => VenueLookup::SubscriptionReference(sub),
            (None, Some(cus)) => VenueLookup::CustomerReference(cus),
            // Decoding guarantees one of the two
            (None, None) => VenueLookup::SubscriptionReference(""),
        },
    }
}

/// The billing fields `venue` should hold after `event`.
///
/// Pure: depends only on the row, the event and the trial length.
pub fn next_billing_state(venue: &Venue, event: &BillingEvent, trial: Duration) -> BillingUpdate {
    match &event.payload {
        EventPayload::CheckoutCompleted(data) => BillingUpdate {
            status: if data.subscription_reference.is_some() {
                SubscriptionStatus::Active
            } else {
                SubscriptionStatus::Incomplete
            },
            current_period_end: data.current_period_end.unwrap_or(event.created + trial),
            customer_reference: data.customer_reference.clone(),
            subscription_reference: data.subscription_reference.clone(),
        },
        EventPayload::SubscriptionUpdated(data) => BillingUpdate {
            status: data.status,
            current_period_end: data.current_period_end.unwrap_or(venue.current_period_end),
            customer_reference: None,
            subscription_reference: None,
        },
        EventPayload::SubscriptionDeleted(_) => BillingUpdate {
            status: SubscriptionStatus::Canceled,
            current_period_end: venue.current_period_end,
            customer_reference: None,
            subscription_reference: None,
        },
        EventPayload::PaymentFailed(_) => BillingUpdate {
            status: SubscriptionStatus::PastDue,
            current_period_end: venue.current_period_end,
            customer_reference: None,
            subscription_reference: None,
        },
    }
}

/// Verifies deliveries and writes the resulting transitions
pub struct SubscriptionMachine<S: ?Sized> {
    store: Arc<S>,
    verifier: WebhookVerifier,
    trial: Duration,
}

impl<S: VenueStore + ?Sized> SubscriptionMachine<S> {
    pub fn new(store: Arc<S>, config: &BillingConfig) -> Self {
        Self {
            store,
            verifier: WebhookVerifier::new(config),
            trial: config.trial(),
        }
    }

    /// Handle one raw delivery
    pub async fn process(&self, payload: &[u8], signature_header: &str) -> Result<Outcome> {
        self.process_at(payload, signature_header, Utc::now()).await
    }

    /// Handle one raw delivery, checking the signature window against `now`.
    ///
    /// Only a storage failure is an `Err`.
    pub async fn process_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let event = match self.verifier.verify(payload, signature_header, now) {
            Ok(event) => event,
            Err(err) => {
                let outcome = Outcome::from(err);
                log_unapplied(&outcome);
                return Ok(outcome);
            }
        };

        self.apply(&event).await
    }

    /// Apply an already verified event
    pub async fn apply(&self, event: &BillingEvent) -> Result<Outcome> {
        tracing::debug!(event_id = %event.id, event_type = %event.kind(), "Processing billing event");

        let lookup = venue_lookup(event);
        let Some(venue) = self.store.find_venue(lookup).await? else {
            let outcome = Outcome::Ignored(IgnoreReason::UnmatchedVenue {
                event_type: event.kind().to_string(),
                lookup: lookup.to_string(),
            });
            log_unapplied(&outcome);
            return Ok(outcome);
        };

        let update = next_billing_state(&venue, event, self.trial);
        let updated = self.store.update_venue_billing(venue.id, &update).await?;

        let transition = Transition {
            event_id: event.id.clone(),
            kind: event.kind(),
            from: venue.subscription_status,
            to: updated.subscription_status,
            first_checkout: event.kind() == EventKind::CheckoutSessionCompleted
                && venue.customer_reference.is_none()
                && updated.customer_reference.is_some(),
            venue: updated,
        };

        tracing::info!(
            venue_id = %transition.venue.id,
            event_id = %transition.event_id,
            event_type = %transition.kind,
            from = %transition.from,
            to = %transition.to,
            period_end = %transition.venue.current_period_end,
            "Applied billing event"
        );

        Ok(Outcome::Applied(transition))
    }
}

fn log_unapplied(outcome: &Outcome) {
    match outcome {
        Outcome::Applied(_) => {}
        Outcome::Ignored(IgnoreReason::UnrecognizedEventType { event_type }) => {
            tracing::debug!(event_type = %event_type, "Ignoring unhandled webhook event");
        }
        Outcome::Ignored(IgnoreReason::UnmatchedVenue { event_type, lookup }) => {
            tracing::warn!(
                event_type = %event_type,
                lookup = %lookup,
                "No venue matches billing event; discarding"
            );
        }
        Outcome::Ignored(IgnoreReason::MalformedEventData { detail }) => {
            tracing::warn!(detail = %detail, "Malformed billing event; discarding");
        }
        Outcome::Rejected(RejectReason::InvalidSignature { detail }) => {
            tracing::warn!(detail = %detail, "Rejected webhook with invalid signature");
        }
    }
}
