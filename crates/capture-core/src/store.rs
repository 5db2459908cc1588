//! Storage Traits
//!
//! Persistence seams for venues and leads. Every billing write is a single-row
//! update keyed by venue id, so implementations only need single-statement
//! atomicity.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CoreError, Result};
use crate::lead::Lead;
use crate::venue::{normalize_email, BillingUpdate, Venue, VenueId, VenueProfile};

/// Unique keys a venue can be found by
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VenueLookup<'a> {
    Id(VenueId),
    Slug(&'a str),
    /// Matched case-insensitively
    Email(&'a str),
    CorrelationToken(&'a str),
    SubscriptionReference(&'a str),
    CustomerReference(&'a str),
}

impl std::fmt::Display for VenueLookup<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VenueLookup::Id(id) => write!(f, "id={id}"),
            VenueLookup::Slug(slug) => write!(f, "slug={slug}"),
            VenueLookup::Email(email) => write!(f, "email={email}"),
            VenueLookup::CorrelationToken(token) => write!(f, "correlation_token={token}"),
            VenueLookup::SubscriptionReference(sub) => write!(f, "subscription={sub}"),
            VenueLookup::CustomerReference(cus) => write!(f, "customer={cus}"),
        }
    }
}

impl VenueLookup<'_> {
    fn matches(&self, venue: &Venue) -> bool {
        match self {
            VenueLookup::Id(id) => venue.id == *id,
            VenueLookup::Slug(slug) => venue.slug == *slug,
            VenueLookup::Email(email) => venue.email == normalize_email(email),
            VenueLookup::CorrelationToken(token) => venue.correlation_token == *token,
            VenueLookup::SubscriptionReference(sub) => {
                venue.subscription_reference.as_deref() == Some(*sub)
            }
            VenueLookup::CustomerReference(cus) => {
                venue.customer_reference.as_deref() == Some(*cus)
            }
        }
    }
}

/// Venue persistence
#[async_trait]
pub trait VenueStore: Send + Sync {
    /// Insert a new venue. Fails with `Duplicate` on a taken slug, token or email.
    async fn create_venue(&self, venue: &Venue) -> Result<()>;

    /// Find a venue by any unique key
    async fn find_venue(&self, lookup: VenueLookup<'_>) -> Result<Option<Venue>>;

    /// Write billing fields on one venue and return the updated row
    async fn update_venue_billing(&self, id: VenueId, update: &BillingUpdate) -> Result<Venue>;

    /// Write profile fields on one venue and return the updated row
    async fn update_venue_profile(&self, id: VenueId, profile: &VenueProfile) -> Result<Venue>;

    /// Total number of venues
    async fn count_venues(&self) -> Result<u64>;
}

/// Lead persistence
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert a lead. Fails with `NotFound` if the owning venue does not exist.
    async fn create_lead(&self, lead: &Lead) -> Result<()>;

    /// Leads for a venue, newest first
    async fn recent_leads(&self, venue_id: VenueId, limit: Option<usize>) -> Result<Vec<Lead>>;

    /// Count leads, optionally for one venue and/or since a point in time
    async fn count_leads(
        &self,
        venue_id: Option<VenueId>,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64>;
}

/// Combined store handed to the server
pub trait Store: VenueStore + LeadStore {}

impl<T: VenueStore + LeadStore> Store for T {}

/// Insert a freshly signed-up venue.
///
/// A slug or token clash is retried once with fresh keys; an email clash
/// still fails with `Duplicate`.
pub async fn create_signup_venue<S: VenueStore + ?Sized>(store: &S, mut venue: Venue) -> Result<Venue> {
    match store.create_venue(&venue).await {
        Ok(()) => Ok(venue),
        Err(CoreError::Duplicate(detail)) => {
            if store.find_venue(VenueLookup::Email(&venue.email)).await?.is_some() {
                return Err(CoreError::Duplicate(detail));
            }
            tracing::warn!(slug = %venue.slug, "Venue key collision ({}); retrying with fresh keys", detail);
            venue.regenerate_keys();
            store.create_venue(&venue).await?;
            Ok(venue)
        }
        Err(e) => Err(e),
    }
}

fn poisoned<T>(_: T) -> CoreError {
    CoreError::Storage("store lock poisoned".into())
}

/// In-memory store (for development and tests)
pub struct MemoryStore {
    venues: RwLock<HashMap<VenueId, Venue>>,
    leads: RwLock<Vec<Lead>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            venues: RwLock::new(HashMap::new()),
            leads: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VenueStore for MemoryStore {
    async fn create_venue(&self, venue: &Venue) -> Result<()> {
        let mut venues = self.venues.write().map_err(poisoned)?;

        let clash = venues.values().find_map(|v| {
            if v.id == venue.id {
                Some("id")
            } else if v.slug == venue.slug {
                Some("slug")
            } else if v.correlation_token == venue.correlation_token {
                Some("correlation_token")
            } else if v.email == venue.email {
                Some("email")
            } else {
                None
            }
        });
        if let Some(field) = clash {
            return Err(CoreError::Duplicate(format!("venue {field} already exists")));
        }

        venues.insert(venue.id, venue.clone());
        Ok(())
    }

    async fn find_venue(&self, lookup: VenueLookup<'_>) -> Result<Option<Venue>> {
        let venues = self.venues.read().map_err(poisoned)?;

        if let VenueLookup::Id(id) = lookup {
            return Ok(venues.get(&id).cloned());
        }
        Ok(venues.values().find(|v| lookup.matches(v)).cloned())
    }

    async fn update_venue_billing(&self, id: VenueId, update: &BillingUpdate) -> Result<Venue> {
        let mut venues = self.venues.write().map_err(poisoned)?;
        let venue = venues
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("venue {id}")))?;

        venue.apply_billing(update, Utc::now());
        Ok(venue.clone())
    }

    async fn update_venue_profile(&self, id: VenueId, profile: &VenueProfile) -> Result<Venue> {
        let mut venues = self.venues.write().map_err(poisoned)?;
        let venue = venues
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("venue {id}")))?;

        venue.apply_profile(profile, Utc::now());
        Ok(venue.clone())
    }

    async fn count_venues(&self) -> Result<u64> {
        let venues = self.venues.read().map_err(poisoned)?;
        Ok(venues.len() as u64)
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn create_lead(&self, lead: &Lead) -> Result<()> {
        let venues = self.venues.read().map_err(poisoned)?;
        if !venues.contains_key(&lead.venue_id) {
            return Err(CoreError::NotFound(format!("venue {}", lead.venue_id)));
        }

        let mut leads = self.leads.write().map_err(poisoned)?;
        leads.push(lead.clone());
        Ok(())
    }

    async fn recent_leads(&self, venue_id: VenueId, limit: Option<usize>) -> Result<Vec<Lead>> {
        let leads = self.leads.read().map_err(poisoned)?;
        let mut result: Vec<_> = leads
            .iter()
            .filter(|l| l.venue_id == venue_id)
            .cloned()
            .collect();

        // Sort by created_at descending
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn count_leads(
        &self,
        venue_id: Option<VenueId>,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let leads = self.leads.read().map_err(poisoned)?;
        let count = leads
            .iter()
            .filter(|l| venue_id.is_none_or(|id| l.venue_id == id))
            .filter(|l| since.is_none_or(|t| l.created_at >= t))
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::{ContactInfo, LeadSource};
    use crate::venue::SubscriptionStatus;
    use chrono::Duration;

    fn venue(name: &str, email: &str) -> Venue {
        Venue::signup(name, email, Duration::days(7), Utc::now()).unwrap()
    }

    fn lead_for(venue_id: VenueId, at: DateTime<Utc>) -> Lead {
        Lead::capture(
            venue_id,
            ContactInfo {
                email: Some("guest@example.com".into()),
                ..Default::default()
            },
            LeadSource::Qr,
            at,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_find_by_every_key() {
        let store = MemoryStore::new();
        let venue = venue("Blue Door", "owner@example.com");
        store.create_venue(&venue).await.unwrap();
        store
            .update_venue_billing(
                venue.id,
                &BillingUpdate {
                    status: SubscriptionStatus::Active,
                    current_period_end: venue.current_period_end,
                    customer_reference: Some("cus_1".into()),
                    subscription_reference: Some("sub_1".into()),
                },
            )
            .await
            .unwrap();

        for lookup in [
            VenueLookup::Id(venue.id),
            VenueLookup::Slug(&venue.slug),
            VenueLookup::Email("OWNER@example.com"),
            VenueLookup::CorrelationToken(&venue.correlation_token),
            VenueLookup::SubscriptionReference("sub_1"),
            VenueLookup::CustomerReference("cus_1"),
        ] {
            let found = store.find_venue(lookup).await.unwrap();
            assert_eq!(found.map(|v| v.id), Some(venue.id), "lookup {lookup}");
        }

        assert!(store
            .find_venue(VenueLookup::SubscriptionReference("sub_other"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.create_venue(&venue("A", "same@example.com")).await.unwrap();

        let err = store.create_venue(&venue("B", "same@example.com")).await;
        assert!(matches!(err, Err(CoreError::Duplicate(_))));
        assert_eq!(store.count_venues().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_signup_retries_key_collision() {
        let store = MemoryStore::new();
        let first = venue("A", "a@example.com");
        store.create_venue(&first).await.unwrap();

        let mut second = venue("B", "b@example.com");
        second.slug.clone_from(&first.slug);
        second.correlation_token.clone_from(&first.correlation_token);

        let created = create_signup_venue(&store, second).await.unwrap();
        assert_ne!(created.slug, first.slug);
        assert_ne!(created.correlation_token, first.correlation_token);
        assert_eq!(store.count_venues().await.unwrap(), 2);
        assert!(store.find_venue(VenueLookup::Slug(&created.slug)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_signup_email_clash_is_not_retried() {
        let store = MemoryStore::new();
        store.create_venue(&venue("A", "same@example.com")).await.unwrap();

        let err = create_signup_venue(&store, venue("B", "same@example.com")).await;
        assert!(matches!(err, Err(CoreError::Duplicate(_))));
        assert_eq!(store.count_venues().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_venue() {
        let store = MemoryStore::new();
        let err = store
            .update_venue_billing(
                VenueId::new(),
                &BillingUpdate {
                    status: SubscriptionStatus::Canceled,
                    current_period_end: Utc::now(),
                    customer_reference: None,
                    subscription_reference: None,
                },
            )
            .await;
        assert!(matches!(err, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_lead_requires_existing_venue() {
        let store = MemoryStore::new();
        let err = store.create_lead(&lead_for(VenueId::new(), Utc::now())).await;
        assert!(matches!(err, Err(CoreError::NotFound(_))));
        assert_eq!(store.count_leads(None, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recent_leads_newest_first() {
        let store = MemoryStore::new();
        let a = venue("A", "a@example.com");
        let b = venue("B", "b@example.com");
        store.create_venue(&a).await.unwrap();
        store.create_venue(&b).await.unwrap();

        let now = Utc::now();
        let old = lead_for(a.id, now - Duration::days(40));
        let new = lead_for(a.id, now);
        store.create_lead(&old).await.unwrap();
        store.create_lead(&new).await.unwrap();
        store.create_lead(&lead_for(b.id, now)).await.unwrap();

        let leads = store.recent_leads(a.id, None).await.unwrap();
        assert_eq!(leads.iter().map(|l| l.id).collect::<Vec<_>>(), vec![new.id, old.id]);
        assert_eq!(store.recent_leads(a.id, Some(1)).await.unwrap().len(), 1);

        assert_eq!(store.count_leads(None, None).await.unwrap(), 3);
        assert_eq!(store.count_leads(Some(a.id), None).await.unwrap(), 2);
        assert_eq!(
            store
                .count_leads(Some(a.id), Some(now - Duration::days(1)))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_profile_update_leaves_billing_alone() {
        let store = MemoryStore::new();
        let venue = venue("Blue Door", "owner@example.com");
        store.create_venue(&venue).await.unwrap();

        let mut profile = venue.profile();
        profile.name = "Red Door".into();
        let updated = store.update_venue_profile(venue.id, &profile).await.unwrap();

        assert_eq!(updated.name, "Red Door");
        assert_eq!(updated.subscription_status, venue.subscription_status);
        assert_eq!(updated.current_period_end, venue.current_period_end);
    }
}
