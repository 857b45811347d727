//! Runtime counters exposed on `/metrics`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Service-wide statistics
#[derive(Default)]
pub struct GatehouseStats {
    /// Sessions created
    pub sessions_created: AtomicU64,
    /// Sessions evicted by the idle sweeper
    pub sessions_evicted: AtomicU64,
    /// Attempts accepted as human
    pub passed: AtomicU64,
    /// Attempts rejected (local or remote)
    pub failed: AtomicU64,
    /// Failures that started a lockout
    pub lockouts: AtomicU64,
    /// Requests answered on `/verify`
    pub verifications: AtomicU64,
    /// Abuse reports written to Redis
    pub reports_stored: AtomicU64,
    /// Abuse reports lost (queue full or Redis error)
    pub reports_dropped: AtomicU64,
}

/// Point-in-time copy of [`GatehouseStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub sessions_created: u64,
    pub sessions_evicted: u64,
    pub passed: u64,
    pub failed: u64,
    pub lockouts: u64,
    pub verifications: u64,
    pub reports_stored: u64,
    pub reports_dropped: u64,
}

impl GatehouseStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_evicted: self.sessions_evicted.load(Ordering::Relaxed),
            passed: self.passed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            lockouts: self.lockouts.load(Ordering::Relaxed),
            verifications: self.verifications.load(Ordering::Relaxed),
            reports_stored: self.reports_stored.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let stats = GatehouseStats::default();
        GatehouseStats::incr(&stats.passed);
        GatehouseStats::incr(&stats.passed);
        GatehouseStats::incr(&stats.lockouts);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.passed, 2);
        assert_eq!(snapshot.lockouts, 1);
        assert_eq!(snapshot.failed, 0);
    }
}
