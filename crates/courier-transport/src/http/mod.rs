//! HTTP polling transport.
//!
//! Events are appended to a bounded cache per session; clients drain it with
//! the `fetch*`/`peek*` routes. Actions are plain GET/POST requests.

mod cache;
pub mod routes;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use courier_core::{
    CourierResult, DeliveryOutcome, HubEvent, Session, SessionKey, TransportAdapter,
};

pub use cache::EventCache;

/// HTTP adapter configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Events kept per session before the oldest is evicted.
    pub cache_capacity: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 4096,
        }
    }
}

struct CacheEntry {
    session: Weak<Session>,
    cache: EventCache,
}

/// Which end of the cache a poll reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOrder {
    Oldest,
    Newest,
}

/// Polling adapter: one [`EventCache`] per session.
pub struct HttpAdapter {
    config: HttpConfig,
    enabled: AtomicBool,
    caches: Mutex<HashMap<SessionKey, CacheEntry>>,
}

impl HttpAdapter {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            enabled: AtomicBool::new(true),
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// Removes up to `count` cached events for `key`.
    pub fn fetch(&self, key: &SessionKey, count: usize, order: PollOrder) -> Vec<Value> {
        let mut caches = self.caches.lock();
        Self::prune(&mut caches);
        let Some(entry) = caches.get_mut(key) else {
            return Vec::new();
        };
        match order {
            PollOrder::Oldest => entry.cache.drain_oldest(count),
            PollOrder::Newest => entry.cache.drain_newest(count),
        }
    }

    /// Reads up to `count` cached events for `key` without removing them.
    pub fn peek(&self, key: &SessionKey, count: usize, order: PollOrder) -> Vec<Value> {
        let mut caches = self.caches.lock();
        Self::prune(&mut caches);
        let Some(entry) = caches.get(key) else {
            return Vec::new();
        };
        match order {
            PollOrder::Oldest => entry.cache.peek_oldest(count),
            PollOrder::Newest => entry.cache.peek_newest(count),
        }
    }

    /// Number of cached events for `key`.
    pub fn count(&self, key: &SessionKey) -> usize {
        let mut caches = self.caches.lock();
        Self::prune(&mut caches);
        caches.get(key).map_or(0, |e| e.cache.len())
    }

    /// Number of sessions holding a cache.
    pub fn cached_sessions(&self) -> usize {
        let mut caches = self.caches.lock();
        Self::prune(&mut caches);
        caches.len()
    }

    /// Drops caches whose session is gone.
    fn prune(caches: &mut HashMap<SessionKey, CacheEntry>) {
        caches.retain(|_, entry| {
            entry
                .session
                .upgrade()
                .is_some_and(|session| !session.is_closed())
        });
    }
}

#[async_trait]
impl TransportAdapter for HttpAdapter {
    fn name(&self) -> &'static str {
        "http"
    }

    fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    async fn on_receive_event(
        &self,
        event: &HubEvent,
        session: &Arc<Session>,
    ) -> CourierResult<DeliveryOutcome> {
        let mut caches = self.caches.lock();
        if !caches.contains_key(session.key()) {
            Self::prune(&mut caches);
            caches.insert(
                session.key().clone(),
                CacheEntry {
                    session: Arc::downgrade(session),
                    cache: EventCache::new(self.config.cache_capacity),
                },
            );
            debug!(session = %session.key(), capacity = self.config.cache_capacity, "Poll cache created");
        }

        if let Some(entry) = caches.get_mut(session.key())
            && entry.cache.push(event.payload.clone())
        {
            trace!(session = %session.key(), sequence = event.sequence, "Poll cache full, evicted oldest event");
        }
        Ok(DeliveryOutcome::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use courier_core::{BotEvent, EventKind, JsonCodec, Codec, SessionConfig, SessionManager, StaticBotRegistry};

    use super::*;

    fn hub_event(sequence: u64, text: &str) -> HubEvent {
        let kind = EventKind::friend_text(1, text);
        HubEvent {
            sequence,
            payload: JsonCodec.encode_event(&kind).unwrap(),
            event: BotEvent::new(1, kind),
        }
    }

    #[tokio::test]
    async fn test_cache_keeps_most_recent() {
        let sessions = SessionManager::new(SessionConfig::default(), Arc::new(StaticBotRegistry::new()));
        let session = sessions.create_session().unwrap();
        let adapter = HttpAdapter::new(HttpConfig { cache_capacity: 3 });

        for i in 1..=5 {
            let outcome = adapter
                .on_receive_event(&hub_event(i, &i.to_string()), &session)
                .await
                .unwrap();
            assert_eq!(outcome, DeliveryOutcome::Delivered);
        }

        assert_eq!(adapter.count(session.key()), 3);
        let texts: Vec<String> = adapter
            .fetch(session.key(), 10, PollOrder::Oldest)
            .iter()
            .map(|v| v["messageChain"][0]["text"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["3", "4", "5"]);
        assert_eq!(adapter.count(session.key()), 0);
    }

    #[tokio::test]
    async fn test_closed_sessions_pruned() {
        let sessions = SessionManager::new(SessionConfig::default(), Arc::new(StaticBotRegistry::new()));
        let a = sessions.create_session().unwrap();
        let b = sessions.create_session().unwrap();
        let adapter = HttpAdapter::new(HttpConfig::default());

        adapter.on_receive_event(&hub_event(1, "x"), &a).await.unwrap();
        sessions.close_session(a.key());
        adapter.on_receive_event(&hub_event(2, "y"), &b).await.unwrap();

        assert_eq!(adapter.count(a.key()), 0);
        assert_eq!(adapter.peek(b.key(), 5, PollOrder::Newest).len(), 1);
    }

    #[tokio::test]
    async fn test_polling_drops_closed_session_caches() {
        let sessions = SessionManager::new(SessionConfig::default(), Arc::new(StaticBotRegistry::new()));
        let a = sessions.create_session().unwrap();
        let b = sessions.create_session().unwrap();
        let adapter = HttpAdapter::new(HttpConfig::default());

        adapter.on_receive_event(&hub_event(1, "x"), &a).await.unwrap();
        adapter.on_receive_event(&hub_event(1, "x"), &b).await.unwrap();
        sessions.close_session(a.key());

        assert_eq!(adapter.fetch(b.key(), 1, PollOrder::Oldest).len(), 1);
        assert_eq!(adapter.cached_sessions(), 1);
        assert_eq!(adapter.count(a.key()), 0);
    }
}
