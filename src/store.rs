/*!
Correlation state stores.

A store keeps one opaque artifact per pending request, keyed by the request
identifier. `take_and_delete` is the only way to read an artifact back, so a
record can be redeemed at most once.
*/
use crate::{
    cookies::{CookieManager, CookieOptions},
    error::Store,
    Transaction,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub trait StateStore: std::fmt::Debug + Send + Sync {
    /// Persists `artifact` under `identifier` until `expires_at`.
    fn put(
        &self,
        transaction: &mut Transaction,
        identifier: &str,
        artifact: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Store>;

    /// Atomically removes and returns the artifact stored under `identifier`.
    ///
    /// Unknown and already consumed identifiers both yield [`Store::NotFound`].
    fn take_and_delete(
        &self,
        transaction: &mut Transaction,
        identifier: &str,
    ) -> Result<String, Store>;

    /// Drops artifacts that expired before `now`, returning how many were dropped.
    fn evict_expired(&self, now: DateTime<Utc>) -> usize;
}

/// Keeps artifacts on the client, one cookie per pending request.
///
/// Deletion is an instruction to the client; the server never sees the
/// artifact again through this store once it has been taken.
#[derive(Debug, Clone)]
pub struct CookieStateStore {
    manager: Arc<dyn CookieManager>,
    cookie_name: String,
    options: CookieOptions,
}

impl CookieStateStore {
    pub fn new(manager: Arc<dyn CookieManager>, cookie_name: &str, options: CookieOptions) -> Self {
        CookieStateStore {
            manager,
            cookie_name: cookie_name.to_string(),
            options,
        }
    }

    /// `{cookie_name}.{identifier}`
    pub fn cookie_name(&self, identifier: &str) -> String {
        format!("{}.{}", self.cookie_name, identifier)
    }
}

impl StateStore for CookieStateStore {
    fn put(
        &self,
        transaction: &mut Transaction,
        identifier: &str,
        artifact: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Store> {
        self.manager.append(
            transaction,
            &self.cookie_name(identifier),
            artifact,
            &self.options,
            Some(expires_at),
        )
    }

    fn take_and_delete(
        &self,
        transaction: &mut Transaction,
        identifier: &str,
    ) -> Result<String, Store> {
        // Identifiers are base64url; anything else cannot name one of our cookies.
        if identifier.is_empty()
            || !identifier
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(Store::NotFound);
        }
        self.manager
            .retrieve(
                transaction,
                &self.cookie_name(identifier),
                &self.options,
                true,
            )?
            .filter(|value| !value.is_empty())
            .ok_or(Store::NotFound)
    }

    fn evict_expired(&self, _now: DateTime<Utc>) -> usize {
        0
    }
}

/// Keeps artifacts server side, for hosts that do not want correlation cookies.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> Store {
    Store::Unavailable("state store lock poisoned".to_string())
}

impl StateStore for MemoryStateStore {
    fn put(
        &self,
        _transaction: &mut Transaction,
        identifier: &str,
        artifact: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Store> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.insert(
            identifier.to_string(),
            (artifact.to_string(), expires_at),
        );
        Ok(())
    }

    fn take_and_delete(
        &self,
        _transaction: &mut Transaction,
        identifier: &str,
    ) -> Result<String, Store> {
        self.entries
            .lock()
            .map_err(poisoned)?
            .remove(identifier)
            .map(|(artifact, _)| artifact)
            .ok_or(Store::NotFound)
    }

    fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        match self.entries.lock() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, (_, at)| *at >= now);
                before - entries.len()
            }
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::HeaderCookieManager;
    use chrono::Duration;
    use std::thread;

    fn cookie_store() -> CookieStateStore {
        CookieStateStore::new(
            Arc::new(HeaderCookieManager),
            "OpenIddict.Client.State",
            CookieOptions::default(),
        )
    }

    #[test]
    fn cookie_store_single_consumption() {
        let store = cookie_store();
        let mut tx = Transaction::new(true);
        store
            .put(&mut tx, "S1", "artifact", Utc::now() + Duration::minutes(5))
            .unwrap();
        assert_eq!(
            "OpenIddict.Client.State.S1",
            tx.response_cookies()[0].name()
        );

        let mut callback = tx.follow(true);
        assert_eq!(
            Ok("artifact".to_string()),
            store.take_and_delete(&mut callback, "S1")
        );

        let mut replay = callback.follow(true);
        assert_eq!(Err(Store::NotFound), store.take_and_delete(&mut replay, "S1"));
    }

    #[test]
    fn cookie_store_unknown_and_consumed_look_alike() {
        let store = cookie_store();
        let mut tx = Transaction::new(true);
        let unknown = store.take_and_delete(&mut tx, "never-issued");
        let invalid = store.take_and_delete(&mut tx, "bad;name");
        assert_eq!(Err(Store::NotFound), unknown);
        assert_eq!(unknown, invalid);
        assert!(tx.response_cookies().is_empty());
    }

    #[test]
    fn memory_store_single_consumption() {
        let store = MemoryStateStore::new();
        let mut tx = Transaction::new(true);
        store
            .put(&mut tx, "S1", "artifact", Utc::now() + Duration::minutes(5))
            .unwrap();
        assert_eq!(Ok("artifact".to_string()), store.take_and_delete(&mut tx, "S1"));
        assert_eq!(Err(Store::NotFound), store.take_and_delete(&mut tx, "S1"));
        assert_eq!(Err(Store::NotFound), store.take_and_delete(&mut tx, "S2"));
        assert!(store.is_empty());
    }

    #[test]
    fn memory_store_concurrent_consumption_has_one_winner() {
        let store = Arc::new(MemoryStateStore::new());
        store
            .put(
                &mut Transaction::new(true),
                "S1",
                "artifact",
                Utc::now() + Duration::minutes(5),
            )
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    store
                        .take_and_delete(&mut Transaction::new(true), "S1")
                        .is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(1, winners);
    }

    #[test]
    fn memory_store_evicts_expired() {
        let store = MemoryStateStore::new();
        let mut tx = Transaction::new(true);
        let now = Utc::now();
        store
            .put(&mut tx, "old", "a", now - Duration::seconds(1))
            .unwrap();
        store
            .put(&mut tx, "new", "b", now + Duration::minutes(5))
            .unwrap();
        assert_eq!(1, store.evict_expired(now));
        assert_eq!(1, store.len());
        assert_eq!(Err(Store::NotFound), store.take_and_delete(&mut tx, "old"));
    }
}
