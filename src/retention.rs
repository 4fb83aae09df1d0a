//! Periodic deletion of vehicles that have been inactive for too long.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::config::RetentionConfig;
use crate::store::PgStore;

/// Oldest `last_seen` an inactive row may have and still be kept.
pub fn cutoff(now: DateTime<Utc>, max_age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Purges once per `config.interval` until `shutdown` flips. Does nothing when
/// retention is disabled.
pub async fn run(store: PgStore, config: RetentionConfig, mut shutdown: watch::Receiver<bool>) {
    if !config.enabled {
        info!("Retention disabled, inactive vehicles are kept forever");
        return;
    }

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let before = cutoff(Utc::now(), config.max_age);
        match store.purge_inactive_before(before).await {
            Ok(purged) => info!(purged, cutoff = %before, "Purged stale inactive vehicles"),
            Err(e) => error!(error = ?e, "Retention purge failed"),
        }
    }
}
