//! Lead Records
//!
//! Contacts captured from the public form. Leads are written once and never
//! touched by billing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::venue::{check_len, VenueId, MAX_EMAIL_LEN, MAX_NAME_LEN, MAX_PHONE_LEN};

/// Unique lead identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(Uuid);

impl LeadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the lead reached us
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadSource {
    #[default]
    Qr,
    Web,
    Manual,
}

impl LeadSource {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LeadSource::Qr => "qr",
            LeadSource::Web => "web",
            LeadSource::Manual => "manual",
        }
    }
}

impl std::str::FromStr for LeadSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "qr" => Ok(LeadSource::Qr),
            "web" => Ok(LeadSource::Web),
            "manual" => Ok(LeadSource::Manual),
            other => Err(CoreError::Validation(format!("unknown lead source: {other}"))),
        }
    }
}

/// Raw contact details as submitted by the form
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// A captured lead
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub venue_id: VenueId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: LeadSource,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// Build a lead for `venue_id`. At least one of email or phone is required.
    pub fn capture(
        venue_id: VenueId,
        contact: ContactInfo,
        source: LeadSource,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let name = clean(contact.name);
        let email = clean(contact.email);
        let phone = clean(contact.phone);

        if email.is_none() && phone.is_none() {
            return Err(CoreError::Validation("Phone or email required".into()));
        }

        for (field, value, max) in [
            ("Name", &name, MAX_NAME_LEN),
            ("Email", &email, MAX_EMAIL_LEN),
            ("Phone", &phone, MAX_PHONE_LEN),
        ] {
            if let Some(value) = value {
                check_len(field, value, max)?;
            }
        }

        Ok(Self {
            id: LeadId::new(),
            venue_id,
            name,
            email,
            phone,
            source,
            notes: None,
            created_at: now,
        })
    }

    /// Best display label for notifications
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .or(self.phone.as_deref())
            .unwrap_or("Anonymous")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_requires_email_or_phone() {
        let err = Lead::capture(
            VenueId::new(),
            ContactInfo {
                name: Some("Sam".into()),
                email: Some("   ".into()),
                phone: None,
            },
            LeadSource::Qr,
            Utc::now(),
        );
        assert!(matches!(err, Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_capture_trims_fields() {
        let lead = Lead::capture(
            VenueId::new(),
            ContactInfo {
                name: Some(" Sam ".into()),
                email: None,
                phone: Some(" 555-0100 ".into()),
            },
            LeadSource::Qr,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(lead.name.as_deref(), Some("Sam"));
        assert_eq!(lead.phone.as_deref(), Some("555-0100"));
        assert_eq!(lead.label(), "Sam");
    }

    #[test]
    fn test_capture_rejects_oversized_fields() {
        let capture = |contact: ContactInfo| Lead::capture(VenueId::new(), contact, LeadSource::Qr, Utc::now());

        let long_name = capture(ContactInfo {
            name: Some("n".repeat(MAX_NAME_LEN + 1)),
            phone: Some("555-0100".into()),
            email: None,
        });
        assert!(matches!(long_name, Err(CoreError::Validation(_))));

        let long_phone = capture(ContactInfo {
            phone: Some("5".repeat(MAX_PHONE_LEN + 1)),
            ..Default::default()
        });
        assert!(matches!(long_phone, Err(CoreError::Validation(_))));

        let long_email = capture(ContactInfo {
            email: Some(format!("{}@example.com", "a".repeat(MAX_EMAIL_LEN))),
            ..Default::default()
        });
        assert!(matches!(long_email, Err(CoreError::Validation(_))));

        let at_limit = capture(ContactInfo {
            name: Some("é".repeat(MAX_NAME_LEN)),
            phone: Some("5".repeat(MAX_PHONE_LEN)),
            email: None,
        });
        assert!(at_limit.is_ok());
    }

    #[test]
    fn test_label_falls_back() {
        let lead = Lead::capture(
            VenueId::new(),
            ContactInfo {
                email: Some("sam@example.com".into()),
                ..Default::default()
            },
            LeadSource::Web,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(lead.label(), "sam@example.com");
    }
}
