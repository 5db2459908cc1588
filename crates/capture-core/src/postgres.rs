//! PostgreSQL Store
//!
//! `VenueStore` and `LeadStore` over a sqlx connection pool. Billing writes are
//! one `UPDATE ... RETURNING` each.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::lead::{Lead, LeadId};
use crate::store::{LeadStore, VenueLookup, VenueStore};
use crate::venue::{normalize_email, BillingUpdate, Venue, VenueId, VenueProfile};

const VENUE_COLUMNS: &str = "id, slug, name, email, phone, welcome_message, thank_you_message, \
    primary_color, correlation_token, customer_reference, subscription_reference, \
    subscription_status, current_period_end, created_at, updated_at";

const LEAD_COLUMNS: &str = "id, venue_id, name, email, phone, source, notes, created_at";

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and run pending migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VenueRow {
    id: Uuid,
    slug: String,
    name: String,
    email: String,
    phone: Option<String>,
    welcome_message: String,
    thank_you_message: String,
    primary_color: String,
    correlation_token: String,
    customer_reference: Option<String>,
    subscription_reference: Option<String>,
    subscription_status: String,
    current_period_end: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VenueRow> for Venue {
    type Error = CoreError;

    fn try_from(row: VenueRow) -> Result<Self> {
        Ok(Venue {
            id: VenueId::from_uuid(row.id),
            slug: row.slug,
            name: row.name,
            email: row.email,
            phone: row.phone,
            welcome_message: row.welcome_message,
            thank_you_message: row.thank_you_message,
            primary_color: row.primary_color,
            correlation_token: row.correlation_token,
            customer_reference: row.customer_reference,
            subscription_reference: row.subscription_reference,
            subscription_status: row
                .subscription_status
                .parse()
                .map_err(|e: CoreError| CoreError::Storage(e.to_string()))?,
            current_period_end: row.current_period_end,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LeadRow {
    id: Uuid,
    venue_id: Uuid,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    source: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LeadRow> for Lead {
    type Error = CoreError;

    fn try_from(row: LeadRow) -> Result<Self> {
        Ok(Lead {
            id: LeadId::from_uuid(row.id),
            venue_id: VenueId::from_uuid(row.venue_id),
            name: row.name,
            email: row.email,
            phone: row.phone,
            source: row
                .source
                .parse()
                .map_err(|e: CoreError| CoreError::Storage(e.to_string()))?,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[async_trait]
impl VenueStore for PostgresStore {
    async fn create_venue(&self, venue: &Venue) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO venues ({VENUE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(venue.id.as_uuid())
        .bind(&venue.slug)
        .bind(&venue.name)
        .bind(&venue.email)
        .bind(&venue.phone)
        .bind(&venue.welcome_message)
        .bind(&venue.thank_you_message)
        .bind(&venue.primary_color)
        .bind(&venue.correlation_token)
        .bind(&venue.customer_reference)
        .bind(&venue.subscription_reference)
        .bind(venue.subscription_status.as_str())
        .bind(venue.current_period_end)
        .bind(venue.created_at)
        .bind(venue.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_venue(&self, lookup: VenueLookup<'_>) -> Result<Option<Venue>> {
        let (column, key) = match lookup {
            VenueLookup::Id(id) => {
                let row = sqlx::query_as::<_, VenueRow>(&format!(
                    "SELECT {VENUE_COLUMNS} FROM venues WHERE id = $1"
                ))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
                return row.map(Venue::try_from).transpose();
            }
            VenueLookup::Slug(slug) => ("slug", slug.to_string()),
            VenueLookup::Email(email) => ("email", normalize_email(email)),
            VenueLookup::CorrelationToken(token) => ("correlation_token", token.to_string()),
            VenueLookup::SubscriptionReference(sub) => ("subscription_reference", sub.to_string()),
            VenueLookup::CustomerReference(cus) => ("customer_reference", cus.to_string()),
        };

        let row = sqlx::query_as::<_, VenueRow>(&format!(
            "SELECT {VENUE_COLUMNS} FROM venues WHERE {column} = $1 LIMIT 1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Venue::try_from).transpose()
    }

    async fn update_venue_billing(&self, id: VenueId, update: &BillingUpdate) -> Result<Venue> {
        let row = sqlx::query_as::<_, VenueRow>(&format!(
            "UPDATE venues SET \
                subscription_status = $2, \
                current_period_end = $3, \
                customer_reference = COALESCE($4, customer_reference), \
                subscription_reference = COALESCE($5, subscription_reference), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {VENUE_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(update.status.as_str())
        .bind(update.current_period_end)
        .bind(&update.customer_reference)
        .bind(&update.subscription_reference)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("venue {id}")))?;

        Venue::try_from(row)
    }

    async fn update_venue_profile(&self, id: VenueId, profile: &VenueProfile) -> Result<Venue> {
        let row = sqlx::query_as::<_, VenueRow>(&format!(
            "UPDATE venues SET \
                name = $2, phone = $3, welcome_message = $4, \
                thank_you_message = $5, primary_color = $6, updated_at = NOW() \
             WHERE id = $1 RETURNING {VENUE_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(&profile.name)
        .bind(&profile.phone)
        .bind(&profile.welcome_message)
        .bind(&profile.thank_you_message)
        .bind(&profile.primary_color)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("venue {id}")))?;

        Venue::try_from(row)
    }

    async fn count_venues(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM venues")
            .fetch_one(&self.pool)
            .await?;
        Ok(count(total))
    }
}

#[async_trait]
impl LeadStore for PostgresStore {
    async fn create_lead(&self, lead: &Lead) -> Result<()> {
        // The foreign key turns an unknown venue into CoreError::NotFound
        sqlx::query(&format!(
            "INSERT INTO leads ({LEAD_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(lead.id.as_uuid())
        .bind(lead.venue_id.as_uuid())
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(lead.source.as_str())
        .bind(&lead.notes)
        .bind(lead.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_leads(&self, venue_id: VenueId, limit: Option<usize>) -> Result<Vec<Lead>> {
        let limit = limit.and_then(|l| i64::try_from(l).ok());
        let rows = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE venue_id = $1 \
             ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(venue_id.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Lead::try_from).collect()
    }

    async fn count_leads(
        &self,
        venue_id: Option<VenueId>,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM leads \
             WHERE ($1::uuid IS NULL OR venue_id = $1) \
               AND ($2::timestamptz IS NULL OR created_at >= $2)",
        )
        .bind(venue_id.map(|id| *id.as_uuid()))
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count(total))
    }
}
