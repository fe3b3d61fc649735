//! Session and user identity resolution.

use crate::storage::{keys, Storage};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

/// Length of the random suffix on generated identifiers.
const SUFFIX_LEN: usize = 9;

/// Identifiers for one page session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub session_id: String,
    pub user_id: String,
}

/// Generate `<prefix>_<unix millis>_<random suffix>`.
///
/// Uniqueness is not enforced; collisions are improbable enough to ignore.
pub fn generate_id(prefix: &str, now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{prefix}_{}_{}",
        now.timestamp_millis(),
        &random[..SUFFIX_LEN]
    )
}

/// Read the identifier under `key`, creating and storing one if absent.
///
/// Storage failures never block identity: an unreadable value is replaced
/// and an unwritable one lives for this instance only.
pub fn read_or_create(storage: &dyn Storage, key: &str, prefix: &str, now: DateTime<Utc>) -> String {
    match storage.get(key) {
        Ok(Some(existing)) if !existing.is_empty() => return existing,
        Ok(_) => {}
        Err(e) => warn!(key, error = %e, "could not read identifier"),
    }

    let id = generate_id(prefix, now);
    if let Err(e) = storage.set(key, &id) {
        warn!(key, error = %e, "could not store identifier");
    }
    id
}

/// Resolve both identifiers from their scopes.
pub fn resolve(session: &dyn Storage, persistent: &dyn Storage, now: DateTime<Utc>) -> Identity {
    Identity {
        session_id: read_or_create(session, keys::SESSION_ID, "sess", now),
        user_id: read_or_create(persistent, keys::USER_ID, "user", now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_generated_id_shape() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let id = generate_id("sess", now);

        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "sess");
        assert_eq!(parts[1], "1700000000123");
        assert_eq!(parts[2].len(), SUFFIX_LEN);
    }

    #[test]
    fn test_resolve_reuses_stored_ids() {
        let session = MemoryStorage::new();
        let persistent = MemoryStorage::new();
        let now = Utc::now();

        let first = resolve(&session, &persistent, now);
        let second = resolve(&session, &persistent, now);
        assert_eq!(first, second);
        assert!(first.session_id.starts_with("sess_"));
        assert!(first.user_id.starts_with("user_"));
    }

    #[test]
    fn test_new_session_keeps_user() {
        let persistent = MemoryStorage::new();
        let now = Utc::now();

        let first = resolve(&MemoryStorage::new(), &persistent, now);
        let second = resolve(&MemoryStorage::new(), &persistent, now);
        assert_eq!(first.user_id, second.user_id);
        assert_ne!(first.session_id, second.session_id);
    }
}
