//! Abuse-report intake.
//!
//! Reports come from two places: sessions hosted here that just entered
//! lockout, and widgets posting to `/report-bot`. Both go through a bounded
//! queue drained by a background worker into a capped Redis list. A full
//! queue or a Redis failure loses the report and is only logged.

use redis::aio::ConnectionManager;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use smudge_common::constants::redis_keys::BOT_REPORTS;
use smudge_common::{AbuseReport, SmudgeError};

use crate::attempts::redis_error;
use crate::stats::GatehouseStats;

/// Report queue occupancy as seen by the sending side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueState {
    pub queued: usize,
    pub capacity: usize,
    /// False once the worker has stopped draining
    pub draining: bool,
}

/// Sending half of the report queue
#[derive(Clone)]
pub struct ReportSink {
    tx: mpsc::Sender<AbuseReport>,
    stats: Arc<GatehouseStats>,
}

impl ReportSink {
    pub fn channel(capacity: usize, stats: Arc<GatehouseStats>) -> (Self, mpsc::Receiver<AbuseReport>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, stats }, rx)
    }

    pub fn queue_state(&self) -> QueueState {
        let capacity = self.tx.max_capacity();
        QueueState {
            queued: capacity - self.tx.capacity(),
            capacity,
            draining: !self.tx.is_closed(),
        }
    }

    /// Queue a report without waiting. Returns false if it was dropped.
    pub fn submit(&self, report: AbuseReport) -> bool {
        match self.tx.try_send(report) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Abuse report dropped");
                GatehouseStats::incr(&self.stats.reports_dropped);
                false
            }
        }
    }
}

/// Background worker draining the report queue into Redis
pub async fn report_worker(
    mut rx: mpsc::Receiver<AbuseReport>,
    mut redis: ConnectionManager,
    list_cap: usize,
    stats: Arc<GatehouseStats>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(list_cap, "Report worker started");

    loop {
        tokio::select! {
            report = rx.recv() => {
                let Some(report) = report else { break };
                let mut stored = store_report(&mut redis, &report, list_cap).await;
                if matches!(&stored, Err(e) if e.is_retryable()) {
                    tracing::debug!("Retrying abuse report");
                    stored = store_report(&mut redis, &report, list_cap).await;
                }
                match stored {
                    Ok(()) => {
                        GatehouseStats::incr(&stats.reports_stored);
                        tracing::info!(
                            score = report.score,
                            attempts = report.attempts,
                            "Abuse report stored"
                        );
                    }
                    Err(e) => {
                        GatehouseStats::incr(&stats.reports_dropped);
                        tracing::error!(error = %e, "Failed to store abuse report");
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Report worker shutting down");
                break;
            }
        }
    }
}

/// LPUSH then trim the list to the newest `list_cap` entries
async fn store_report(
    redis: &mut ConnectionManager,
    report: &AbuseReport,
    list_cap: usize,
) -> Result<(), SmudgeError> {
    let payload = serde_json::to_string(report).map_err(|e| SmudgeError::Internal(e.to_string()))?;
    let last = list_cap.saturating_sub(1) as isize;

    let _: () = redis::pipe()
        .lpush(BOT_REPORTS, payload)
        .ignore()
        .ltrim(BOT_REPORTS, 0, last)
        .ignore()
        .query_async(redis)
        .await
        .map_err(redis_error)?;
    Ok(())
}
