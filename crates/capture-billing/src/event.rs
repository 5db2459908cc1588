//! Typed Billing Events
//!
//! Decodes an authenticated Stripe event body into one of the four event kinds
//! the subscription state machine understands. Everything else is reported as
//! unrecognized; recognized kinds whose object is missing what we need are
//! reported as malformed.

use std::collections::HashMap;

use capture_core::SubscriptionStatus;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::checkout::CORRELATION_METADATA_KEY;
use crate::error::WebhookError;

/// The closed set of event kinds we act on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    CheckoutSessionCompleted,
    CustomerSubscriptionUpdated,
    CustomerSubscriptionDeleted,
    InvoicePaymentFailed,
}

impl EventKind {
    pub fn from_type(event_type: &str) -> Option<Self> {
        match event_type {
            "checkout.session.completed" => Some(Self::CheckoutSessionCompleted),
            "customer.subscription.updated" => Some(Self::CustomerSubscriptionUpdated),
            "customer.subscription.deleted" => Some(Self::CustomerSubscriptionDeleted),
            "invoice.payment_failed" => Some(Self::InvoicePaymentFailed),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::CustomerSubscriptionUpdated => "customer.subscription.updated",
            Self::CustomerSubscriptionDeleted => "customer.subscription.deleted",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hosted checkout finished
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutCompleted {
    pub session_id: String,
    /// Token we embedded when creating the session
    pub correlation_token: String,
    pub customer_reference: Option<String>,
    pub subscription_reference: Option<String>,
    pub customer_email: Option<String>,
    /// Only present when the session's subscription was expanded
    pub current_period_end: Option<DateTime<Utc>>,
}

/// The provider changed a subscription
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionUpdated {
    pub subscription_reference: String,
    pub provider_status: String,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// The provider ended a subscription
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionDeleted {
    pub subscription_reference: String,
}

/// An invoice charge failed. At least one reference is present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentFailed {
    pub invoice_id: Option<String>,
    pub subscription_reference: Option<String>,
    pub customer_reference: Option<String>,
}

/// Event-specific data, one variant per kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventPayload {
    CheckoutCompleted(CheckoutCompleted),
    SubscriptionUpdated(SubscriptionUpdated),
    SubscriptionDeleted(SubscriptionDeleted),
    PaymentFailed(PaymentFailed),
}

/// A verified, typed billing event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BillingEvent {
    /// Provider event id (`evt_...`)
    pub id: String,
    /// When the provider created the event
    pub created: DateTime<Utc>,
    pub payload: EventPayload,
}

impl BillingEvent {
    pub const fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::CheckoutCompleted(_) => EventKind::CheckoutSessionCompleted,
            EventPayload::SubscriptionUpdated(_) => EventKind::CustomerSubscriptionUpdated,
            EventPayload::SubscriptionDeleted(_) => EventKind::CustomerSubscriptionDeleted,
            EventPayload::PaymentFailed(_) => EventKind::InvoicePaymentFailed,
        }
    }

    /// Decode an event body. The caller has already checked the signature.
    pub fn decode(payload: &[u8]) -> Result<Self, WebhookError> {
        let envelope: Envelope = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::MalformedEventData(format!("event envelope: {e}")))?;

        let kind = EventKind::from_type(&envelope.event_type)
            .ok_or_else(|| WebhookError::UnrecognizedEventType(envelope.event_type.clone()))?;

        let created = timestamp(envelope.created).ok_or_else(|| {
            WebhookError::MalformedEventData(format!("bad created timestamp {}", envelope.created))
        })?;

        let object = envelope.data.object;
        let payload = match kind {
            EventKind::CheckoutSessionCompleted => {
                EventPayload::CheckoutCompleted(parse_object::<RawCheckoutSession>(kind, object)?.try_into()?)
            }
            EventKind::CustomerSubscriptionUpdated => {
                EventPayload::SubscriptionUpdated(parse_object::<RawSubscription>(kind, object)?.try_into()?)
            }
            EventKind::CustomerSubscriptionDeleted => {
                let sub = parse_object::<RawSubscription>(kind, object)?;
                EventPayload::SubscriptionDeleted(SubscriptionDeleted {
                    subscription_reference: sub.id,
                })
            }
            EventKind::InvoicePaymentFailed => {
                EventPayload::PaymentFailed(parse_object::<RawInvoice>(kind, object)?.try_into()?)
            }
        };

        Ok(Self {
            id: envelope.id,
            created,
            payload,
        })
    }
}

/// Map a Stripe subscription status onto ours
pub fn map_provider_status(status: &str) -> Option<SubscriptionStatus> {
    match status {
        "trialing" => Some(SubscriptionStatus::Trialing),
        "active" => Some(SubscriptionStatus::Active),
        "past_due" | "unpaid" => Some(SubscriptionStatus::PastDue),
        "canceled" | "incomplete_expired" => Some(SubscriptionStatus::Canceled),
        "incomplete" | "paused" => Some(SubscriptionStatus::Incomplete),
        _ => None,
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn parse_object<T: serde::de::DeserializeOwned>(
    kind: EventKind,
    object: serde_json::Value,
) -> Result<T, WebhookError> {
    serde_json::from_value(object)
        .map_err(|e| WebhookError::MalformedEventData(format!("{kind} object: {e}")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Wire shapes (only the fields we read)
// ============================================================================

#[derive(Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

/// A reference that Stripe may send as a bare id or as an expanded object
#[derive(Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object(ExpandedObject),
}

#[derive(Deserialize)]
struct ExpandedObject {
    id: String,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    items: Option<ItemList>,
}

impl Expandable {
    fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(obj) => &obj.id,
        }
    }

    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(obj) => obj.id,
        }
    }

    fn current_period_end(&self) -> Option<i64> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(obj) => period_end(obj.current_period_end, obj.items.as_ref()),
        }
    }
}

#[derive(Deserialize)]
struct ItemList {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Deserialize)]
struct SubscriptionItem {
    #[serde(default)]
    current_period_end: Option<i64>,
}

/// Newer API versions carry the period on subscription items
fn period_end(top_level: Option<i64>, items: Option<&ItemList>) -> Option<i64> {
    top_level.or_else(|| {
        items
            .and_then(|list| list.data.first())
            .and_then(|item| item.current_period_end)
    })
}

#[derive(Deserialize)]
struct RawCheckoutSession {
    id: String,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    customer: Option<Expandable>,
    #[serde(default)]
    subscription: Option<Expandable>,
    #[serde(default)]
    customer_email: Option<String>,
}

impl TryFrom<RawCheckoutSession> for CheckoutCompleted {
    type Error = WebhookError;

    fn try_from(raw: RawCheckoutSession) -> Result<Self, WebhookError> {
        let correlation_token = non_empty(raw.client_reference_id)
            .or_else(|| {
                raw.metadata
                    .as_ref()
                    .and_then(|m| m.get(CORRELATION_METADATA_KEY).cloned())
                    .and_then(|t| non_empty(Some(t)))
            })
            .ok_or_else(|| {
                WebhookError::MalformedEventData(format!(
                    "checkout session {} has no correlation token",
                    raw.id
                ))
            })?;

        let current_period_end = match raw.subscription.as_ref().and_then(Expandable::current_period_end) {
            Some(secs) => Some(timestamp(secs).ok_or_else(|| {
                WebhookError::MalformedEventData(format!("bad current_period_end {secs}"))
            })?),
            None => None,
        };

        Ok(Self {
            session_id: raw.id,
            correlation_token,
            customer_reference: non_empty(raw.customer.map(Expandable::into_id)),
            subscription_reference: non_empty(raw.subscription.map(Expandable::into_id)),
            customer_email: non_empty(raw.customer_email),
            current_period_end,
        })
    }
}

#[derive(Deserialize)]
struct RawSubscription {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    items: Option<ItemList>,
}

impl TryFrom<RawSubscription> for SubscriptionUpdated {
    type Error = WebhookError;

    fn try_from(raw: RawSubscription) -> Result<Self, WebhookError> {
        let provider_status = raw.status.ok_or_else(|| {
            WebhookError::MalformedEventData(format!("subscription {} has no status", raw.id))
        })?;
        let status = map_provider_status(&provider_status).ok_or_else(|| {
            WebhookError::MalformedEventData(format!(
                "subscription {} has unknown status {provider_status}",
                raw.id
            ))
        })?;

        let current_period_end = match period_end(raw.current_period_end, raw.items.as_ref()) {
            Some(secs) => Some(timestamp(secs).ok_or_else(|| {
                WebhookError::MalformedEventData(format!("bad current_period_end {secs}"))
            })?),
            None => None,
        };

        Ok(Self {
            subscription_reference: raw.id,
            provider_status,
            status,
            current_period_end,
        })
    }
}

#[derive(Deserialize)]
struct RawInvoice {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    subscription: Option<Expandable>,
    #[serde(default)]
    customer: Option<Expandable>,
    #[serde(default)]
    parent: Option<InvoiceParent>,
}

#[derive(Deserialize)]
struct InvoiceParent {
    #[serde(default)]
    subscription_details: Option<SubscriptionDetails>,
}

#[derive(Deserialize)]
struct SubscriptionDetails {
    #[serde(default)]
    subscription: Option<Expandable>,
}

impl TryFrom<RawInvoice> for PaymentFailed {
    type Error = WebhookError;

    fn try_from(raw: RawInvoice) -> Result<Self, WebhookError> {
        let subscription = raw.subscription.or_else(|| {
            raw.parent
                .and_then(|p| p.subscription_details)
                .and_then(|d| d.subscription)
        });

        let subscription_reference = non_empty(subscription.as_ref().map(|s| s.id().to_string()));
        let customer_reference = non_empty(raw.customer.map(Expandable::into_id));

        if subscription_reference.is_none() && customer_reference.is_none() {
            return Err(WebhookError::MalformedEventData(format!(
                "invoice {} has neither subscription nor customer",
                raw.id.as_deref().unwrap_or("?")
            )));
        }

        Ok(Self {
            invoice_id: raw.id,
            subscription_reference,
            customer_reference,
        })
    }
}
