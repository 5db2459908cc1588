//! Access Gate
//!
//! Decides per request whether a venue's dashboard and capture form are live.

use capture_core::{SubscriptionStatus, Venue};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why a venue does or does not have access
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Trial,
    Active,
    /// Payment failed; still enabled while the provider retries
    GracePeriod,
    TrialExpired,
    Canceled,
    Incomplete,
}

impl Access {
    pub fn evaluate(venue: &Venue, now: DateTime<Utc>) -> Self {
        match venue.subscription_status {
            SubscriptionStatus::Trialing if venue.current_period_end > now => Self::Trial,
            SubscriptionStatus::Trialing => Self::TrialExpired,
            SubscriptionStatus::Active => Self::Active,
            SubscriptionStatus::PastDue => Self::GracePeriod,
            SubscriptionStatus::Canceled => Self::Canceled,
            SubscriptionStatus::Incomplete => Self::Incomplete,
        }
    }

    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Trial | Self::Active | Self::GracePeriod)
    }

    /// Short explanation shown on the "inactive" page
    pub const fn message(self) -> &'static str {
        match self {
            Self::Trial => "Your free trial is running.",
            Self::Active => "Your subscription is active.",
            Self::GracePeriod => "Your last payment failed. Please update your card.",
            Self::TrialExpired => "Your free trial has ended.",
            Self::Canceled => "Your subscription has been canceled.",
            Self::Incomplete => "Your subscription setup is not complete.",
        }
    }
}

/// `true` when the venue's features are enabled at `now`
pub fn features_enabled(venue: &Venue, now: DateTime<Utc>) -> bool {
    Access::evaluate(venue, now).is_enabled()
}
