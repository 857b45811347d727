//! Attempt/lockout state machine.
//!
//! Counts consecutive failed attempts for a persistence scope, escalates the
//! response, and holds a cooldown deadline that survives page loads. The
//! counters live in the [`KeyValueStore`] and are read-modify-written at each
//! transition; nothing here runs a timer. Callers poll [`AttemptStateMachine::check_expiry`].

use serde::Serialize;

use smudge_common::AttemptSnapshot;
use smudge_common::constants::store_keys::{BOT_ATTEMPTS, LAST_SUCCESS, TIMEOUT_END};

use crate::store::KeyValueStore;

/// Escalation thresholds and cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures at which difficulty escalates
    pub escalate_after: u32,
    /// Failures at which the cooldown starts
    pub lock_after: u32,
    pub cooldown_ms: i64,
}

/// Current lockout state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockoutState {
    /// Solvable, no recent failures
    Active,
    /// Failed once or twice; challenge re-issued
    Warned { attempts: u32 },
    /// Failed enough to get a harder challenge
    Escalated { attempts: u32 },
    /// Cooldown running until `deadline_ms`
    Locked { deadline_ms: i64 },
    /// Cooldown elapsed; behaves like a fresh `Active`
    Expired,
}

impl LockoutState {
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

/// Transition taken by one failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum FailureVerdict {
    Warned { attempts: u32 },
    Escalated { attempts: u32 },
    Locked { attempts: u32, deadline_ms: i64 },
}

impl FailureVerdict {
    pub fn attempts(&self) -> u32 {
        match *self {
            Self::Warned { attempts } | Self::Escalated { attempts } | Self::Locked { attempts, .. } => {
                attempts
            }
        }
    }
}

/// Per-scope failure counter with persisted cooldown
#[derive(Debug, Clone)]
pub struct AttemptStateMachine {
    policy: LockoutPolicy,
    state: LockoutState,
}

impl AttemptStateMachine {
    /// Restore from persisted fields.
    ///
    /// A deadline still in the future starts `Locked`; a passed deadline
    /// clears both fields and starts `Expired`.
    pub fn open<S: KeyValueStore + ?Sized>(policy: LockoutPolicy, store: &mut S, now_ms: i64) -> Self {
        let snapshot = read_snapshot(store);
        let state = match snapshot.lockout_deadline {
            Some(deadline_ms) if deadline_ms > now_ms => {
                tracing::info!(
                    remaining_ms = deadline_ms.saturating_sub(now_ms),
                    attempts = snapshot.failed_attempt_count,
                    "Restored active lockout"
                );
                LockoutState::Locked { deadline_ms }
            }
            Some(_) => {
                clear_lockout(store);
                tracing::debug!("Persisted lockout already elapsed, cleared");
                LockoutState::Expired
            }
            None => LockoutState::Active,
        };

        Self { policy, state }
    }

    pub fn state(&self) -> LockoutState {
        self.state
    }

    pub fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    /// Whether a challenge may be presented as solvable at `now_ms`
    pub fn is_solvable(&self, now_ms: i64) -> bool {
        match self.state {
            LockoutState::Locked { deadline_ms } => now_ms >= deadline_ms,
            _ => true,
        }
    }

    /// Time left on the cooldown; `None` when not locked or already elapsed
    pub fn remaining_ms(&self, now_ms: i64) -> Option<u64> {
        match self.state {
            LockoutState::Locked { deadline_ms } if deadline_ms > now_ms => {
                Some(deadline_ms.saturating_sub(now_ms) as u64)
            }
            _ => None,
        }
    }

    /// Record one failed attempt and persist the new counters
    pub fn record_failure<S: KeyValueStore + ?Sized>(&mut self, store: &mut S, now_ms: i64) -> FailureVerdict {
        if let LockoutState::Locked { deadline_ms } = self.state {
            // interaction is disabled while locked; nothing to count
            return FailureVerdict::Locked {
                attempts: read_snapshot(store).failed_attempt_count,
                deadline_ms,
            };
        }

        let attempts = read_snapshot(store).failed_attempt_count.saturating_add(1);
        store.set(BOT_ATTEMPTS, attempts.to_string());

        if attempts >= self.policy.lock_after {
            let deadline_ms = now_ms.saturating_add(self.policy.cooldown_ms);
            store.set(TIMEOUT_END, deadline_ms.to_string());
            self.state = LockoutState::Locked { deadline_ms };
            tracing::warn!(attempts, deadline_ms, "Failure threshold reached, locking out");
            FailureVerdict::Locked { attempts, deadline_ms }
        } else if attempts >= self.policy.escalate_after {
            self.state = LockoutState::Escalated { attempts };
            tracing::warn!(attempts, "Repeated failure, escalating difficulty");
            FailureVerdict::Escalated { attempts }
        } else {
            self.state = LockoutState::Warned { attempts };
            tracing::warn!(attempts, "Failed attempt, re-issuing challenge");
            FailureVerdict::Warned { attempts }
        }
    }

    /// Record an accepted attempt: counters and lockout cleared
    pub fn record_success<S: KeyValueStore + ?Sized>(&mut self, store: &mut S, now_ms: i64) {
        clear_lockout(store);
        store.set(LAST_SUCCESS, now_ms.to_string());
        self.state = LockoutState::Active;
    }

    /// Adopt a lockout persisted by another holder of the same scope.
    ///
    /// Returns true when this call moved the machine to `Locked`.
    pub fn sync<S: KeyValueStore + ?Sized>(&mut self, store: &S, now_ms: i64) -> bool {
        if self.state.is_locked() {
            return false;
        }
        match read_snapshot(store).lockout_deadline {
            Some(deadline_ms) if deadline_ms > now_ms => {
                self.state = LockoutState::Locked { deadline_ms };
                true
            }
            _ => false,
        }
    }

    /// Transition `Locked` to `Expired` once the deadline has passed.
    ///
    /// Returns true when the transition happened on this call.
    pub fn check_expiry<S: KeyValueStore + ?Sized>(&mut self, store: &mut S, now_ms: i64) -> bool {
        match self.state {
            LockoutState::Locked { deadline_ms } if now_ms >= deadline_ms => {
                clear_lockout(store);
                self.state = LockoutState::Expired;
                tracing::info!("Lockout expired");
                true
            }
            _ => false,
        }
    }
}

/// Read the persisted fields; absent or malformed values read as defaults
pub fn read_snapshot<S: KeyValueStore + ?Sized>(store: &S) -> AttemptSnapshot {
    AttemptSnapshot {
        failed_attempt_count: store
            .get(BOT_ATTEMPTS)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0),
        lockout_deadline: store.get(TIMEOUT_END).and_then(|v| v.trim().parse().ok()),
        last_success: store.get(LAST_SUCCESS).and_then(|v| v.trim().parse().ok()),
    }
}

fn clear_lockout<S: KeyValueStore + ?Sized>(store: &mut S) {
    store.remove(BOT_ATTEMPTS);
    store.remove(TIMEOUT_END);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const COOLDOWN: i64 = 300_000;

    fn policy() -> LockoutPolicy {
        LockoutPolicy {
            escalate_after: 3,
            lock_after: 5,
            cooldown_ms: COOLDOWN,
        }
    }

    #[test]
    fn test_fresh_store_starts_active() {
        let mut store = MemoryStore::new();
        let machine = AttemptStateMachine::open(policy(), &mut store, 0);
        assert_eq!(machine.state(), LockoutState::Active);
        assert!(machine.is_solvable(0));
        assert_eq!(machine.remaining_ms(0), None);
    }

    #[test]
    fn test_escalation_ladder() {
        let mut store = MemoryStore::new();
        let mut machine = AttemptStateMachine::open(policy(), &mut store, 0);

        assert_eq!(machine.record_failure(&mut store, 10), FailureVerdict::Warned { attempts: 1 });
        assert_eq!(machine.record_failure(&mut store, 20), FailureVerdict::Warned { attempts: 2 });
        assert_eq!(machine.record_failure(&mut store, 30), FailureVerdict::Escalated { attempts: 3 });
        assert_eq!(machine.record_failure(&mut store, 40), FailureVerdict::Escalated { attempts: 4 });
        assert_eq!(
            machine.record_failure(&mut store, 50),
            FailureVerdict::Locked { attempts: 5, deadline_ms: 50 + COOLDOWN }
        );

        let snapshot = read_snapshot(&store);
        assert_eq!(snapshot.failed_attempt_count, 5);
        assert_eq!(snapshot.lockout_deadline, Some(50 + COOLDOWN));
        assert!(!machine.is_solvable(51));
        assert_eq!(machine.remaining_ms(50), Some(COOLDOWN as u64));
    }

    #[test]
    fn test_failures_while_locked_are_not_counted() {
        let mut store = MemoryStore::from_entries([("botAttempts", "5"), ("timeoutEnd", "1000")]);
        let mut machine = AttemptStateMachine::open(policy(), &mut store, 0);
        let verdict = machine.record_failure(&mut store, 10);
        assert_eq!(verdict, FailureVerdict::Locked { attempts: 5, deadline_ms: 1000 });
        assert_eq!(read_snapshot(&store).failed_attempt_count, 5);
    }

    #[test]
    fn test_reopen_during_cooldown_is_locked() {
        let mut store = MemoryStore::new();
        let mut machine = AttemptStateMachine::open(policy(), &mut store, 0);
        for t in 0..5 {
            machine.record_failure(&mut store, t);
        }
        let deadline = 4 + COOLDOWN;

        // simulated page reload a minute later
        let reopened = AttemptStateMachine::open(policy(), &mut store, 60_004);
        assert_eq!(reopened.state(), LockoutState::Locked { deadline_ms: deadline });
        let remaining = reopened.remaining_ms(60_004).unwrap();
        assert!(remaining <= COOLDOWN as u64);
        assert_eq!(remaining, 240_000);
    }

    #[test]
    fn test_reopen_after_deadline_clears_fields() {
        let mut store = MemoryStore::from_entries([("botAttempts", "5"), ("timeoutEnd", "1000")]);
        let machine = AttemptStateMachine::open(policy(), &mut store, 1_000);
        assert_eq!(machine.state(), LockoutState::Expired);
        assert!(store.get("botAttempts").is_none());
        assert!(store.get("timeoutEnd").is_none());
    }

    #[test]
    fn test_check_expiry_is_explicit() {
        let mut store = MemoryStore::from_entries([("botAttempts", "5"), ("timeoutEnd", "1000")]);
        let mut machine = AttemptStateMachine::open(policy(), &mut store, 0);

        assert!(!machine.check_expiry(&mut store, 999));
        assert!(machine.state().is_locked());

        assert!(machine.check_expiry(&mut store, 1_000));
        assert_eq!(machine.state(), LockoutState::Expired);
        assert_eq!(read_snapshot(&store), AttemptSnapshot::default());

        // counting restarts from zero
        assert_eq!(machine.record_failure(&mut store, 2_000), FailureVerdict::Warned { attempts: 1 });
    }

    #[test]
    fn test_success_resets_counter_and_stamps_last_success() {
        let mut store = MemoryStore::from_entries([("botAttempts", "4")]);
        let mut machine = AttemptStateMachine::open(policy(), &mut store, 0);
        machine.record_success(&mut store, 7_777);

        let snapshot = read_snapshot(&store);
        assert_eq!(snapshot.failed_attempt_count, 0);
        assert_eq!(snapshot.lockout_deadline, None);
        assert_eq!(snapshot.last_success, Some(7_777));
        assert_eq!(machine.state(), LockoutState::Active);
    }

    #[test]
    fn test_counter_is_read_from_store_each_time() {
        let mut store = MemoryStore::new();
        let mut machine = AttemptStateMachine::open(policy(), &mut store, 0);
        machine.record_failure(&mut store, 1);

        // another tab bumped the counter in the meantime
        store.reload([("botAttempts", "3")]);
        assert_eq!(machine.record_failure(&mut store, 2), FailureVerdict::Escalated { attempts: 4 });
    }

    #[test]
    fn test_sync_adopts_foreign_lockout() {
        let mut store = MemoryStore::new();
        let mut machine = AttemptStateMachine::open(policy(), &mut store, 0);
        assert!(!machine.sync(&store, 10));

        store.reload([("botAttempts", "5"), ("timeoutEnd", "9000")]);
        assert!(machine.sync(&store, 10));
        assert_eq!(machine.state(), LockoutState::Locked { deadline_ms: 9_000 });
        assert!(!machine.sync(&store, 20));

        let mut stale = AttemptStateMachine::open(policy(), &mut MemoryStore::new(), 0);
        assert!(!stale.sync(&store, 9_000));
    }

    #[test]
    fn test_malformed_values_read_as_defaults() {
        let store = MemoryStore::from_entries([("botAttempts", "lots"), ("timeoutEnd", "")]);
        assert_eq!(read_snapshot(&store), AttemptSnapshot::default());
    }
}
