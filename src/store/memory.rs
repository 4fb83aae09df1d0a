//! In-memory [`Store`] used by the reconciliation tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Store, StoreSession};
use crate::error::StoreError;
use crate::record::VehicleRecord;

#[derive(Default)]
struct Shared {
    rows: Mutex<BTreeMap<String, VehicleRecord>>,
    fail_upsert_after: Mutex<Option<usize>>,
    fail_deactivation: AtomicBool,
    sessions_open: AtomicUsize,
    sessions_opened: AtomicUsize,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub(crate) fn seed(&self, records: impl IntoIterator<Item = VehicleRecord>) {
        let mut rows = self.shared.rows.lock().unwrap();
        for record in records {
            rows.insert(record.vehicle_id.clone(), record);
        }
    }

    pub(crate) fn rows(&self) -> BTreeMap<String, VehicleRecord> {
        self.shared.rows.lock().unwrap().clone()
    }

    pub(crate) fn is_active(&self, vehicle_id: &str) -> Option<bool> {
        self.shared
            .rows
            .lock()
            .unwrap()
            .get(vehicle_id)
            .map(|r| r.is_active)
    }

    /// The next upsert fails after writing `n` records (inside its transaction).
    pub(crate) fn fail_upsert_after(&self, n: usize) {
        *self.shared.fail_upsert_after.lock().unwrap() = Some(n);
    }

    pub(crate) fn fail_deactivation(&self) {
        self.shared.fail_deactivation.store(true, Ordering::SeqCst);
    }

    pub(crate) fn sessions_open(&self) -> usize {
        self.shared.sessions_open.load(Ordering::SeqCst)
    }

    pub(crate) fn sessions_opened(&self) -> usize {
        self.shared.sessions_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Session = MemorySession;

    async fn session(&self) -> Result<MemorySession, StoreError> {
        self.shared.sessions_open.fetch_add(1, Ordering::SeqCst);
        self.shared.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession {
            shared: Arc::clone(&self.shared),
        })
    }
}

pub(crate) struct MemorySession {
    shared: Arc<Shared>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.shared.sessions_open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn upsert_all(&mut self, records: &[VehicleRecord]) -> Result<u64, StoreError> {
        let fail_after = self.shared.fail_upsert_after.lock().unwrap().take();
        let mut rows = self.shared.rows.lock().unwrap();

        // Work on a copy so a failure leaves the committed rows untouched.
        let mut staged = rows.clone();
        for (written, record) in records.iter().enumerate() {
            if fail_after == Some(written) {
                return Err(StoreError::Transaction(sqlx::Error::WorkerCrashed));
            }
            let mut row = record.clone();
            row.is_active = true;
            staged.insert(row.vehicle_id.clone(), row);
        }

        *rows = staged;
        Ok(records.len() as u64)
    }

    async fn deactivate_missing(&mut self, keep: &[String]) -> Result<u64, StoreError> {
        if self.shared.fail_deactivation.load(Ordering::SeqCst) {
            return Err(StoreError::Deactivation(sqlx::Error::PoolTimedOut));
        }

        let mut demoted = 0;
        for (vehicle_id, row) in self.shared.rows.lock().unwrap().iter_mut() {
            if row.is_active && !keep.contains(vehicle_id) {
                row.is_active = false;
                demoted += 1;
            }
        }
        Ok(demoted)
    }
}
