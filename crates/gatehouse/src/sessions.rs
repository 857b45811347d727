//! Live challenge sessions.
//!
//! Sessions are held in memory behind their own async mutex. Persisted
//! attempt fields are per scope, so every operation that can touch them also
//! takes the scope lock. Lock order is always session, then scope.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, broadcast};

use smudge_common::AbuseReport;
use smudge_engine::{ChallengeObserver, ChallengeSession, MemoryStore};

use crate::reports::ReportSink;
use crate::stats::GatehouseStats;

/// A hosted session plus its bookkeeping
pub struct LiveSession {
    pub session: ChallengeSession<MemoryStore>,
    pub scope: String,
    last_seen: Instant,
}

impl LiveSession {
    pub fn new(session: ChallengeSession<MemoryStore>, scope: String) -> Self {
        Self { session, scope, last_seen: Instant::now() }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// Session table and per-scope locks
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<LiveSession>>>>,
    scope_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a session under a fresh random id
    pub async fn insert(&self, live: LiveSession) -> String {
        let id = generate_session_id();
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(live)));
        id
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<LiveSession>>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Lock guarding the persisted fields of `scope`
    pub async fn scope_lock(&self, scope: &str) -> Arc<Mutex<()>> {
        self.scope_locks
            .lock()
            .await
            .entry(scope.to_string())
            .or_default()
            .clone()
    }

    /// Drop sessions idle for longer than `ttl`, then scope locks nobody holds.
    ///
    /// Sessions currently locked by a request are kept.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, live| match live.try_lock() {
            Ok(live) => live.idle_for(now) < ttl,
            Err(_) => true,
        });
        let evicted = before - sessions.len();
        drop(sessions);

        self.scope_locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);

        evicted
    }
}

/// Generate a random session id
fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Background worker evicting idle sessions
pub async fn session_sweeper(
    registry: Arc<SessionRegistry>,
    stats: Arc<GatehouseStats>,
    ttl: Duration,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    tracing::info!(ttl_secs = ttl.as_secs(), "Session sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = registry.evict_idle(ttl).await;
                if evicted > 0 {
                    stats.sessions_evicted.fetch_add(evicted as u64, std::sync::atomic::Ordering::Relaxed);
                    let remaining = registry.len().await;
                    tracing::debug!(evicted, remaining, "Idle sessions evicted");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Session sweeper shutting down");
                break;
            }
        }
    }
}

/// Observer wiring session callbacks to logs, counters and report intake
pub struct SessionObserver {
    scope: String,
    stats: Arc<GatehouseStats>,
    reports: ReportSink,
}

impl SessionObserver {
    pub fn new(scope: String, stats: Arc<GatehouseStats>, reports: ReportSink) -> Self {
        Self { scope, stats, reports }
    }
}

impl ChallengeObserver for SessionObserver {
    fn on_complete(&mut self, digits: &[u8]) {
        tracing::debug!(scope = %self.scope, len = digits.len(), "Challenge completed");
    }

    fn on_validation_success(&mut self) {
        GatehouseStats::incr(&self.stats.passed);
    }

    fn on_validation_failed(&mut self, score: u8) {
        GatehouseStats::incr(&self.stats.failed);
        tracing::info!(scope = %self.scope, score, "Challenge failed");
    }

    fn on_failure_threshold_reached(&mut self, report: &AbuseReport) {
        GatehouseStats::incr(&self.stats.lockouts);
        tracing::warn!(
            scope = %self.scope,
            score = report.score,
            attempts = report.attempts,
            "Failure threshold reached, scope locked"
        );
        self.reports.submit(report.clone());
    }
}
