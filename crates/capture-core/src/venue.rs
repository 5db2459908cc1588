//! Venue Records
//!
//! A venue is the paying tenant: it owns a slug (the QR landing path), a
//! customer-facing profile, and the billing fields the subscription state
//! machine writes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Length of a generated venue slug
pub const SLUG_LEN: usize = 8;

const SLUG_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

pub const DEFAULT_WELCOME_MESSAGE: &str = "Welcome! Enter your info for exclusive offers.";
pub const DEFAULT_THANK_YOU_MESSAGE: &str = "Thanks! We'll be in touch soon.";
pub const DEFAULT_PRIMARY_COLOR: &str = "#6366f1";

/// Column widths shared by venues and leads
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 200;
pub const MAX_PHONE_LEN: usize = 50;

/// Reject `value` when it is longer than `max` characters
pub(crate) fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(CoreError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Unique venue identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(Uuid);

impl VenueId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse from the hyphenated string form
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CoreError::Validation(format!("invalid venue id: {e}")))
    }
}

impl Default for VenueId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VenueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate a short, URL-safe slug (`[a-z0-9]{8}`)
pub fn generate_slug() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(SLUG_LEN)
        .map(|b| SLUG_ALPHABET[usize::from(*b) % SLUG_ALPHABET.len()] as char)
        .collect()
}

/// Generate an opaque correlation token for matching checkout completions
pub fn generate_correlation_token() -> String {
    format!("vt_{}", Uuid::new_v4().simple())
}

/// Billing status of a venue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Free trial window, bounded by `current_period_end`
    Trialing,
    /// Paid and current
    Active,
    /// Latest invoice failed; still in the grace period
    PastDue,
    /// Terminal for this subscription
    Canceled,
    /// Checkout or subscription never completed
    Incomplete,
}

impl SubscriptionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "incomplete" => Ok(SubscriptionStatus::Incomplete),
            other => Err(CoreError::Validation(format!(
                "unknown subscription status: {other}"
            ))),
        }
    }
}

/// A single-row billing mutation.
///
/// `None` references leave the stored value untouched; status and period end
/// are always written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingUpdate {
    pub status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,
    pub customer_reference: Option<String>,
    pub subscription_reference: Option<String>,
}

/// Customer-facing venue settings editable from the dashboard.
///
/// Deliberately has no billing fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueProfile {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub welcome_message: String,
    pub thank_you_message: String,
    pub primary_color: String,
}

impl VenueProfile {
    /// Trim and validate the profile
    pub fn validated(mut self) -> Result<Self> {
        self.name = self.name.trim().to_string();
        self.welcome_message = self.welcome_message.trim().to_string();
        self.thank_you_message = self.thank_you_message.trim().to_string();
        self.primary_color = self.primary_color.trim().to_string();
        self.phone = self
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        if self.name.is_empty() {
            return Err(CoreError::Validation("Venue name is required".into()));
        }
        check_len("Venue name", &self.name, MAX_NAME_LEN)?;
        if let Some(phone) = &self.phone {
            check_len("Phone", phone, MAX_PHONE_LEN)?;
        }
        if !is_hex_color(&self.primary_color) {
            return Err(CoreError::Validation(
                "Colour must look like #6366f1".into(),
            ));
        }
        Ok(self)
    }
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7
        && s.starts_with('#')
        && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// A venue record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,

    /// Short public identifier used in the capture URL
    pub slug: String,

    pub name: String,

    /// Where lead notifications are sent
    pub email: String,

    pub phone: Option<String>,

    pub welcome_message: String,
    pub thank_you_message: String,
    pub primary_color: String,

    /// Embedded in the checkout session so the completion event can find us
    pub correlation_token: String,

    /// Billing provider customer id (`cus_...`)
    pub customer_reference: Option<String>,

    /// Billing provider subscription id (`sub_...`)
    pub subscription_reference: Option<String>,

    pub subscription_status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Venue {
    /// Create a venue in its trial state.
    ///
    /// This is the only place a status is chosen outside the webhook state
    /// machine.
    pub fn signup(
        name: impl Into<String>,
        email: impl Into<String>,
        trial: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let name = name.into().trim().to_string();
        let email = normalize_email(&email.into());

        if name.is_empty() || email.is_empty() {
            return Err(CoreError::Validation(
                "Venue name and email required".into(),
            ));
        }
        if !looks_like_email(&email) {
            return Err(CoreError::Validation("Please enter a valid email".into()));
        }
        check_len("Venue name", &name, MAX_NAME_LEN)?;
        check_len("Email", &email, MAX_EMAIL_LEN)?;

        Ok(Self {
            id: VenueId::new(),
            slug: generate_slug(),
            name,
            email,
            phone: None,
            welcome_message: DEFAULT_WELCOME_MESSAGE.into(),
            thank_you_message: DEFAULT_THANK_YOU_MESSAGE.into(),
            primary_color: DEFAULT_PRIMARY_COLOR.into(),
            correlation_token: generate_correlation_token(),
            customer_reference: None,
            subscription_reference: None,
            subscription_status: SubscriptionStatus::Trialing,
            current_period_end: now + trial,
            created_at: now,
            updated_at: now,
        })
    }

    /// Draw a new slug and correlation token
    pub fn regenerate_keys(&mut self) {
        self.slug = generate_slug();
        self.correlation_token = generate_correlation_token();
    }

    /// Path customers land on after scanning the QR code
    pub fn capture_path(&self) -> String {
        format!("/c/{}", self.slug)
    }

    /// Absolute URL encoded into the QR code
    pub fn capture_url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.capture_path())
    }

    /// Apply a billing mutation in place
    pub fn apply_billing(&mut self, update: &BillingUpdate, now: DateTime<Utc>) {
        self.subscription_status = update.status;
        self.current_period_end = update.current_period_end;
        if let Some(customer) = &update.customer_reference {
            self.customer_reference = Some(customer.clone());
        }
        if let Some(subscription) = &update.subscription_reference {
            self.subscription_reference = Some(subscription.clone());
        }
        self.updated_at = now;
    }

    /// Apply a profile update in place
    pub fn apply_profile(&mut self, profile: &VenueProfile, now: DateTime<Utc>) {
        self.name.clone_from(&profile.name);
        self.phone.clone_from(&profile.phone);
        self.welcome_message.clone_from(&profile.welcome_message);
        self.thank_you_message.clone_from(&profile.thank_you_message);
        self.primary_color.clone_from(&profile.primary_color);
        self.updated_at = now;
    }

    /// Current profile, for pre-filling the settings form
    pub fn profile(&self) -> VenueProfile {
        VenueProfile {
            name: self.name.clone(),
            phone: self.phone.clone(),
            welcome_message: self.welcome_message.clone(),
            thank_you_message: self.thank_you_message.clone(),
            primary_color: self.primary_color.clone(),
        }
    }
}

/// Lowercase and trim an email address for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
}
