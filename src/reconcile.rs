//! Synchronizes a decoded batch into the store's active-vehicle set.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::record::VehicleRecord;
use crate::store::{Store, StoreSession};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub upserted: u64,
    pub deactivated: u64,
}

pub struct ReconciliationEngine<S> {
    store: S,
}

impl<S: Store> ReconciliationEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Upserts `batch` and demotes every active vehicle missing from it.
    ///
    /// An empty batch is a no-op: a blank upstream response must not look
    /// like "no vehicles running". The upsert commits before the demotion
    /// runs; if the demotion then fails, the upsert stays committed and
    /// [`StoreError::Deactivation`] is returned.
    #[tracing::instrument(skip_all, fields(batch = batch.len()))]
    pub async fn reconcile(
        &self,
        batch: Vec<VehicleRecord>,
    ) -> Result<ReconcileSummary, StoreError> {
        let records = last_write_wins(batch);
        if records.is_empty() {
            info!("Empty batch, leaving active vehicles unchanged");
            return Ok(ReconcileSummary::default());
        }
        let keep: Vec<String> = records.iter().map(|r| r.vehicle_id.clone()).collect();

        let mut session = self.store.session().await?;

        let upserted = session.upsert_all(&records).await?;
        info!(upserted, "Updated/inserted vehicle position records");

        let deactivated = session.deactivate_missing(&keep).await?;
        info!(deactivated, "Marked vehicles as inactive");

        Ok(ReconcileSummary {
            upserted,
            deactivated,
        })
    }
}

/// Drops unpersistable records and collapses duplicate ids, keeping the last
/// occurrence's fields at the first occurrence's position.
fn last_write_wins(batch: Vec<VehicleRecord>) -> Vec<VehicleRecord> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(batch.len());
    let mut records: Vec<VehicleRecord> = Vec::with_capacity(batch.len());

    for mut record in batch {
        if !record.is_persistable() {
            warn!(vehicle_id = %record.vehicle_id, "Skipping vehicle record that cannot be persisted");
            continue;
        }
        record.is_active = true;
        match slots.get(&record.vehicle_id) {
            Some(&slot) => records[slot] = record,
            None => {
                slots.insert(record.vehicle_id.clone(), records.len());
                records.push(record);
            }
        }
    }

    records
}
