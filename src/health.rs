//! Liveness endpoint.
//!
//! `GET /health` always answers 200 while the process is up; the body carries
//! the outcome of the most recent pull for operators.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, watch};
use tracing::info;

use crate::error::PullError;
use crate::pull::PullSummary;

/// Outcome of the last pull, as shown on the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastPull {
    pub at: DateTime<Utc>,
    pub ok: bool,
    pub parsed: usize,
    pub skipped: usize,
    pub upserted: u64,
    pub deactivated: u64,
    pub error: Option<String>,
}

pub struct HealthState {
    service: &'static str,
    version: &'static str,
    started_at: DateTime<Utc>,
    last_pull: RwLock<Option<LastPull>>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
    pub last_pull: Option<LastPull>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            started_at: Utc::now(),
            last_pull: RwLock::new(None),
        }
    }

    pub async fn record_pull(&self, result: &Result<PullSummary, PullError>) {
        let last = match result {
            Ok(summary) => LastPull {
                at: summary.started_at,
                ok: summary.decode_error.is_none(),
                parsed: summary.report.parsed,
                skipped: summary.report.skipped(),
                upserted: summary.reconciled.upserted,
                deactivated: summary.reconciled.deactivated,
                error: summary.decode_error.clone(),
            },
            Err(e) => LastPull {
                at: Utc::now(),
                ok: false,
                parsed: 0,
                skipped: 0,
                upserted: 0,
                deactivated: 0,
                error: Some(e.to_string()),
            },
        };
        *self.last_pull.write().await = Some(last);
    }

    pub async fn last_pull(&self) -> Option<LastPull> {
        self.last_pull.read().await.clone()
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(health))
        .with_state(state)
}

pub(crate) async fn health(State(st): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.service,
            version: st.version,
            started_at: st.started_at,
            last_pull: st.last_pull().await,
        }),
    )
}

/// Binds the health listener; `run` does this before spawning any task.
pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Health endpoint listening");
    Ok(listener)
}

/// Serves the health router on `listener` until `shutdown` flips.
pub async fn serve(
    listener: TcpListener,
    state: Arc<HealthState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::reconcile::ReconcileSummary;
    use crate::report::DecodeReport;

    async fn body_json(state: Arc<HealthState>) -> serde_json::Value {
        let resp = health(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_before_first_pull() {
        let body = body_json(Arc::new(HealthState::new())).await;

        assert_eq!(body["ok"], true);
        assert_eq!(body["service"], "gtfs_rt_tracker");
        assert!(body["last_pull"].is_null());
    }

    #[tokio::test]
    async fn test_health_reports_last_pull() {
        let state = Arc::new(HealthState::new());
        let summary = PullSummary {
            started_at: Utc::now(),
            bytes: 120,
            report: DecodeReport {
                vehicles: 3,
                parsed: 2,
                missing_position: 1,
                ..Default::default()
            },
            reconciled: ReconcileSummary {
                upserted: 2,
                deactivated: 1,
            },
            decode_error: None,
        };
        state.record_pull(&Ok(summary)).await;

        let body = body_json(Arc::clone(&state)).await;
        assert_eq!(body["last_pull"]["ok"], true);
        assert_eq!(body["last_pull"]["parsed"], 2);
        assert_eq!(body["last_pull"]["skipped"], 1);
        assert_eq!(body["last_pull"]["deactivated"], 1);
    }

    #[tokio::test]
    async fn test_failed_pull_stays_live() {
        let state = Arc::new(HealthState::new());
        state
            .record_pull(&Err(PullError::Fetch(FetchError::EmptyBody)))
            .await;

        let body = body_json(state).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["last_pull"]["ok"], false);
        assert_eq!(body["last_pull"]["error"], "feed returned an empty body");
    }

    #[tokio::test]
    async fn test_bind_fails_when_port_is_taken() {
        let taken = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = taken.local_addr().unwrap();

        assert!(bind(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_serve_answers_until_shutdown() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let server = tokio::spawn(serve(listener, Arc::new(HealthState::new()), rx));

        let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body = resp.text().await.unwrap();
        assert!(body.contains("\"ok\":true"));

        tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }
}
