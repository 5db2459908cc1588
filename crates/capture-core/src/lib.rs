//! # capture-core
//!
//! Venue and lead records for qr-capture, plus the storage seams the billing
//! and HTTP layers write through.
//!
//! ## Model
//!
//! ```text
//! ┌──────────────────────────┐ 1      * ┌──────────────────┐
//! │ Venue                    │──────────│ Lead             │
//! │  slug  → /c/{slug}       │          │  name/email/phone│
//! │  correlation_token       │          │  created_at      │
//! │  subscription_status     │          └──────────────────┘
//! │  current_period_end      │
//! └──────────────────────────┘
//! ```
//!
//! `MemoryStore` is always available; `PostgresStore` sits behind the
//! `postgres` feature.

pub mod error;
pub mod lead;
pub mod store;
pub mod venue;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use error::{CoreError, Result};
pub use lead::{ContactInfo, Lead, LeadId, LeadSource};
pub use store::{create_signup_venue, LeadStore, MemoryStore, Store, VenueLookup, VenueStore};
pub use venue::{BillingUpdate, SubscriptionStatus, Venue, VenueId, VenueProfile};

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
