//! One feed pull (fetch, decode, reconcile) and the fixed-interval loop that
//! repeats it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::decoder::decode_feed;
use crate::error::{PullError, StoreError};
use crate::fetch::{HttpClient, fetch_bytes};
use crate::health::HealthState;
use crate::reconcile::{ReconcileSummary, ReconciliationEngine};
use crate::report::DecodeReport;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct PullSummary {
    /// Ingestion time shared by every record of the pull.
    pub started_at: DateTime<Utc>,
    pub bytes: usize,
    pub report: DecodeReport,
    pub reconciled: ReconcileSummary,
    /// Set when the payload could not be decoded; nothing was written.
    pub decode_error: Option<String>,
}

/// Drives pulls of one feed into one store.
///
/// Pulls never overlap: [`Puller::pull_once`] refuses to start while another
/// pull holds the gate, and [`Puller::run`] awaits each pull before the next
/// tick.
pub struct Puller<C, S> {
    client: C,
    feed_url: String,
    engine: ReconciliationEngine<S>,
    gate: Mutex<()>,
}

impl<C: HttpClient, S: Store> Puller<C, S> {
    pub fn new(client: C, feed_url: impl Into<String>, engine: ReconciliationEngine<S>) -> Self {
        Self {
            client,
            feed_url: feed_url.into(),
            engine,
            gate: Mutex::new(()),
        }
    }

    #[tracing::instrument(skip(self), fields(url = %self.feed_url))]
    pub async fn pull_once(&self) -> Result<PullSummary, PullError> {
        let _gate = self.gate.try_lock().map_err(|_| PullError::Overlapping)?;
        let now = Utc::now();

        info!("Fetching feed");
        let bytes = fetch_bytes(&self.client, &self.feed_url).await?;

        Ok(self.process(&bytes, now).await?)
    }

    /// Decodes `bytes` and reconciles the result, using `now` as the ingestion
    /// time. Undecodable or vehicle-free payloads leave the store untouched.
    pub async fn process(
        &self,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<PullSummary, StoreError> {
        let decoded = decode_feed(bytes, now);
        let mut summary = PullSummary {
            started_at: now,
            bytes: bytes.len(),
            report: decoded.report,
            reconciled: ReconcileSummary::default(),
            decode_error: decoded.error.map(|e| e.to_string()),
        };

        if decoded.records.is_empty() {
            warn!("No vehicle positions found in the feed, store left unchanged");
            return Ok(summary);
        }

        summary.reconciled = self.engine.reconcile(decoded.records).await?;
        info!(
            parsed = summary.report.parsed,
            upserted = summary.reconciled.upserted,
            deactivated = summary.reconciled.deactivated,
            "Successfully processed vehicle positions"
        );
        Ok(summary)
    }

    /// Pulls immediately, then once per `period`, until `shutdown` flips or
    /// its sender is dropped. A failed pull is logged and the loop goes on.
    pub async fn run(
        &self,
        period: Duration,
        health: Arc<HealthState>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = period.as_secs(), "Puller started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let result = self.pull_once().await;
            if let Err(e) = &result {
                error!(error = ?e, "Scheduled pull failed");
            }
            health.record_pull(&result).await;
        }

        info!("Puller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::canned::CannedClient;
    use crate::gtfs_rt::{
        FeedEntity, FeedHeader, FeedMessage, Position, VehicleDescriptor, VehiclePosition,
    };
    use crate::store::memory::MemoryStore;
    use axum::http::StatusCode;
    use chrono::TimeZone;
    use prost::Message;

    const URL: &str = "https://example.com/vehiclepositions.pb";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn feed_bytes(vehicle_ids: &[&str]) -> Vec<u8> {
        let entity = vehicle_ids
            .iter()
            .map(|id| FeedEntity {
                id: format!("e-{id}"),
                vehicle: Some(VehiclePosition {
                    vehicle: Some(VehicleDescriptor {
                        id: Some(id.to_string()),
                        ..Default::default()
                    }),
                    position: Some(Position {
                        latitude: Some(42.35),
                        longitude: Some(-71.06),
                        ..Default::default()
                    }),
                    timestamp: Some(1_714_564_700),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect();

        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                ..Default::default()
            },
            entity,
        }
        .encode_to_vec()
    }

    fn puller(client: CannedClient, store: &MemoryStore) -> Puller<CannedClient, MemoryStore> {
        Puller::new(client, URL, ReconciliationEngine::new(store.clone()))
    }

    #[tokio::test]
    async fn test_pull_reconciles_feed() {
        let store = MemoryStore::default();
        let puller = puller(CannedClient::ok(feed_bytes(&["v1", "v2"])), &store);

        let summary = puller.pull_once().await.unwrap();

        assert_eq!(summary.report.parsed, 2);
        assert_eq!(summary.reconciled.upserted, 2);
        assert_eq!(store.is_active("v1"), Some(true));
        assert_eq!(store.is_active("v2"), Some(true));
    }

    #[tokio::test]
    async fn test_process_uses_one_ingestion_time() {
        let store = MemoryStore::default();
        let puller = puller(CannedClient::ok(Vec::new()), &store);

        let summary = puller.process(&feed_bytes(&["v1"]), now()).await.unwrap();

        assert_eq!(summary.started_at, now());
        assert_eq!(store.rows()["v1"].last_seen, now());
        assert_eq!(store.rows()["v1"].timestamp.timestamp(), 1_714_564_700);
    }

    #[tokio::test]
    async fn test_nul_vehicle_id_does_not_stall_reconciliation() {
        let store = MemoryStore::default();
        let puller = puller(CannedClient::ok(Vec::new()), &store);
        puller.process(&feed_bytes(&["v1", "v3"]), now()).await.unwrap();

        let summary = puller
            .process(&feed_bytes(&["v1", "bad\0id"]), now())
            .await
            .unwrap();

        assert_eq!(summary.report.invalid_vehicle_id, 1);
        assert_eq!(summary.reconciled.upserted, 1);
        assert_eq!(store.is_active("v3"), Some(false));
        assert_eq!(store.is_active("bad\0id"), None);
    }

    #[tokio::test]
    async fn test_undecodable_payload_leaves_store_alone() {
        let store = MemoryStore::default();
        let puller = puller(CannedClient::ok(Vec::new()), &store);
        puller.process(&feed_bytes(&["v1"]), now()).await.unwrap();

        let summary = puller.process(&[0xFF, 0xFE, 0x00, 0x01], now()).await.unwrap();

        assert!(summary.decode_error.is_some());
        assert_eq!(summary.reconciled, ReconcileSummary::default());
        assert_eq!(store.is_active("v1"), Some(true));
    }

    #[tokio::test]
    async fn test_vehicle_free_feed_leaves_store_alone() {
        let store = MemoryStore::default();
        let puller = puller(CannedClient::ok(Vec::new()), &store);
        puller.process(&feed_bytes(&["v1"]), now()).await.unwrap();

        let summary = puller.process(&feed_bytes(&[]), now()).await.unwrap();

        assert!(summary.decode_error.is_none());
        assert_eq!(store.is_active("v1"), Some(true));
        assert_eq!(store.sessions_opened(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_propagated() {
        let store = MemoryStore::default();
        let client = CannedClient {
            status: StatusCode::BAD_GATEWAY,
            body: b"oops".to_vec(),
        };
        let puller = puller(client, &store);

        let err = puller.pull_once().await.unwrap_err();

        assert!(matches!(err, PullError::Fetch(FetchError::Status(_))));
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_pull_is_refused() {
        let store = MemoryStore::default();
        let puller = puller(CannedClient::ok(feed_bytes(&["v1"])), &store);

        let _in_flight = puller.gate.try_lock().unwrap();
        let err = puller.pull_once().await.unwrap_err();

        assert!(matches!(err, PullError::Overlapping));
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_run_pulls_until_shutdown() {
        let store = MemoryStore::default();
        let puller = puller(CannedClient::ok(feed_bytes(&["v1"])), &store);
        let health = Arc::new(HealthState::new());
        let (tx, rx) = watch::channel(false);

        let run = puller.run(Duration::from_secs(3600), Arc::clone(&health), rx);
        let stop = async {
            while health.last_pull().await.is_none() {
                tokio::task::yield_now().await;
            }
            tx.send(true).unwrap();
        };
        tokio::join!(run, stop);

        assert_eq!(store.is_active("v1"), Some(true));
        assert!(health.last_pull().await.unwrap().ok);
    }
}
