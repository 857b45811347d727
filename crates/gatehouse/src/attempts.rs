//! Redis persistence for per-scope attempt fields.
//!
//! Each field lives under its own key, `attempts:{scope}:{field}`, holding the
//! same string value the engine writes to its key/value port. Callers hold the
//! scope lock across `refresh` → engine call → `flush`. A failed flush keeps
//! its changes pending, so the next `refresh` and `flush` carry them.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use smudge_common::SmudgeError;
use smudge_common::constants::redis_keys::ATTEMPTS_PREFIX;
use smudge_common::constants::store_keys::{BOT_ATTEMPTS, LAST_SUCCESS, TIMEOUT_END};
use smudge_engine::{MemoryStore, StoreChange};

const FIELDS: [&str; 3] = [BOT_ATTEMPTS, TIMEOUT_END, LAST_SUCCESS];

/// Longest accepted scope identifier
pub const MAX_SCOPE_LEN: usize = 128;

pub fn redis_key(scope: &str, field: &str) -> String {
    format!("{}{}:{}", ATTEMPTS_PREFIX, scope, field)
}

/// Scopes end up inside Redis keys; keep them printable and bounded
pub fn validate_scope(scope: &str) -> Result<&str, SmudgeError> {
    let scope = scope.trim();
    if scope.is_empty() || scope.len() > MAX_SCOPE_LEN {
        return Err(SmudgeError::InvalidInput(format!(
            "scope must be 1..={} bytes",
            MAX_SCOPE_LEN
        )));
    }
    if !scope.chars().all(|c| c.is_ascii_graphic()) {
        return Err(SmudgeError::InvalidInput("scope must be printable ASCII".to_string()));
    }
    Ok(scope)
}

fn entries(values: Vec<Option<String>>) -> Vec<(&'static str, String)> {
    FIELDS
        .iter()
        .zip(values)
        .filter_map(|(field, value)| value.map(|v| (*field, v)))
        .collect()
}

async fn fetch(redis: &mut ConnectionManager, scope: &str) -> Result<Vec<(&'static str, String)>, SmudgeError> {
    let keys: Vec<String> = FIELDS.iter().map(|f| redis_key(scope, f)).collect();
    let values: Vec<Option<String>> = redis.mget(&keys).await.map_err(redis_error)?;
    Ok(entries(values))
}

/// Fresh store holding the scope's persisted fields
pub async fn load(redis: &mut ConnectionManager, scope: &str) -> Result<MemoryStore, SmudgeError> {
    Ok(MemoryStore::from_entries(fetch(redis, scope).await?))
}

/// Re-read the scope's fields into an existing session store. Writes a
/// failed flush left behind stay on top of the fresh read.
pub async fn refresh(
    redis: &mut ConnectionManager,
    scope: &str,
    store: &mut MemoryStore,
) -> Result<(), SmudgeError> {
    store.reload_keeping_pending(fetch(redis, scope).await?);
    Ok(())
}

/// Write the store's pending changes back in one atomic pipeline. On failure
/// the changes go back into the store for the next flush.
pub async fn flush(
    redis: &mut ConnectionManager,
    scope: &str,
    store: &mut MemoryStore,
) -> Result<(), SmudgeError> {
    let changes = store.take_changes();
    if changes.is_empty() {
        return Ok(());
    }

    let mut pipe = redis::pipe();
    pipe.atomic();
    for change in &changes {
        let key = redis_key(scope, change.key());
        match change {
            StoreChange::Set { value, .. } => pipe.set(key, value).ignore(),
            StoreChange::Remove { .. } => pipe.del(key).ignore(),
        };
    }

    let written: Result<(), _> = pipe.query_async(redis).await;
    if let Err(e) = written {
        tracing::warn!(scope = %scope, changes = changes.len(), error = %e, "Attempt flush failed, changes kept");
        store.requeue(changes);
        return Err(redis_error(e));
    }
    tracing::debug!(scope = %scope, changes = changes.len(), "Attempt fields flushed");
    Ok(())
}

pub fn redis_error(e: redis::RedisError) -> SmudgeError {
    SmudgeError::Redis(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use smudge_engine::KeyValueStore;

    #[test]
    fn test_redis_key_layout() {
        assert_eq!(redis_key("abc123", BOT_ATTEMPTS), "attempts:abc123:botAttempts");
        assert_eq!(redis_key("site", TIMEOUT_END), "attempts:site:timeoutEnd");
    }

    #[test]
    fn test_entries_skip_missing_fields() {
        let got = entries(vec![Some("3".to_string()), None, Some("1700".to_string())]);
        assert_eq!(got, vec![(BOT_ATTEMPTS, "3".to_string()), (LAST_SUCCESS, "1700".to_string())]);
        assert!(entries(vec![None, None, None]).is_empty());
    }

    #[test]
    fn test_failed_flush_keeps_lockout_for_next_refresh() {
        use smudge_common::DeviceClass;
        use smudge_engine::{ChallengeSession, EngineConfig, SessionPhase, TelemetryEvent};

        let config = EngineConfig { lock_after: 1, escalate_after: 1, ..Default::default() };
        let mut session =
            ChallengeSession::new(config.clone(), MemoryStore::new(), DeviceClass::Desktop, None, 0).unwrap();
        session.record(&TelemetryEvent::FirstInteraction { t: 0, touch: false });
        let digits = session.digits().to_vec();
        for (i, d) in digits.iter().enumerate() {
            session.submit(i, &d.to_string(), 100);
        }
        assert!(matches!(session.phase(), SessionPhase::Locked { .. }));

        // the pipeline errored: the changes are put back, Redis is still empty
        let changes = session.store_mut().take_changes();
        session.store_mut().requeue(changes);
        session.store_mut().reload_keeping_pending(entries(vec![None, None, None]));

        let store = session.store_mut();
        assert_eq!(store.get(BOT_ATTEMPTS).as_deref(), Some("1"));
        assert!(store.get(TIMEOUT_END).is_some());
        assert!(store.has_changes());

        // a sibling opened from what the next flush writes is locked too
        let written = MemoryStore::from_entries(
            store
                .clone()
                .take_changes()
                .into_iter()
                .filter_map(|change| match change {
                    StoreChange::Set { key, value } => Some((key, value)),
                    StoreChange::Remove { .. } => None,
                }),
        );
        let sibling = ChallengeSession::new(config, written, DeviceClass::Desktop, None, 200).unwrap();
        assert!(matches!(sibling.phase(), SessionPhase::Locked { .. }));
    }

    #[test]
    fn test_validate_scope() {
        assert_eq!(validate_scope("  login-form ").unwrap(), "login-form");
        assert!(validate_scope("").is_err());
        assert!(validate_scope("has space").is_err());
        assert!(validate_scope(&"x".repeat(MAX_SCOPE_LEN + 1)).is_err());
    }
}
