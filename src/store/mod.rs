//! Durable storage seam for reconciliation.
//!
//! [`Store`] hands out one [`StoreSession`] per pull; the session owns a
//! single connection and releases it when dropped.
//! [`PgStore`] implements both over PostgreSQL.

mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use postgres::{PgSession, PgStore, migrate};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::VehicleRecord;

/// Source of store sessions.
#[async_trait]
pub trait Store: Send + Sync {
    type Session: StoreSession;

    /// Acquires a session. Fails with [`StoreError::Connectivity`].
    async fn session(&self) -> Result<Self::Session, StoreError>;
}

/// One connection's worth of reconciliation statements.
#[async_trait]
pub trait StoreSession: Send {
    /// Upserts all records keyed by `vehicle_id` inside one transaction,
    /// forcing `is_active = true`. On error nothing from `records` is visible.
    /// Returns the number of rows written.
    async fn upsert_all(&mut self, records: &[VehicleRecord]) -> Result<u64, StoreError>;

    /// Marks every active row whose `vehicle_id` is not in `keep` as inactive.
    /// Returns the number of rows demoted.
    async fn deactivate_missing(&mut self, keep: &[String]) -> Result<u64, StoreError>;
}
