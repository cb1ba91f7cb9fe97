//! Registry of active exchanges
//!
//! Maps a thread identifier to the one exchange running on it. Every
//! read-modify-write on the map happens under a single lock, so two
//! triggers racing on the same thread can never both register. Each
//! exchange sits behind its own async mutex, which serializes the
//! messages arriving on one thread.

use super::Exchange;
use crate::error::{BotError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Shared handle to a running exchange
pub type ExchangeHandle = Arc<tokio::sync::Mutex<Exchange>>;

struct Entry {
    exchange_id: String,
    handle: ExchangeHandle,
}

/// Thread → active exchange map
#[derive(Default)]
pub struct ExchangeRegistry {
    active: Mutex<HashMap<String, Entry>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The exchange running on `thread`, if any
    pub fn get(&self, thread: &str) -> Option<ExchangeHandle> {
        if thread.is_empty() {
            return None;
        }
        self.lock().get(thread).map(|e| Arc::clone(&e.handle))
    }

    pub fn contains(&self, thread: &str) -> bool {
        !thread.is_empty() && self.lock().contains_key(thread)
    }

    /// Register an exchange unless the thread already has one
    pub fn register(&self, thread: &str, exchange_id: &str, handle: ExchangeHandle) -> Result<()> {
        let mut active = self.lock();
        if active.contains_key(thread) {
            return Err(BotError::ExchangeActive(thread.to_string()));
        }
        active.insert(
            thread.to_string(),
            Entry {
                exchange_id: exchange_id.to_string(),
                handle,
            },
        );
        tracing::debug!(thread = %thread, exchange = %exchange_id, "Exchange registered");
        Ok(())
    }

    /// Remove the entry for `thread` if it still belongs to `exchange_id`
    pub fn remove(&self, thread: &str, exchange_id: &str) -> bool {
        let mut active = self.lock();
        match active.get(thread) {
            Some(entry) if entry.exchange_id == exchange_id => {
                active.remove(thread);
                tracing::debug!(thread = %thread, exchange = %exchange_id, "Exchange removed");
                true
            }
            _ => false,
        }
    }

    /// Remove whatever exchange runs on `thread`
    pub fn terminate(&self, thread: &str) -> Option<ExchangeHandle> {
        self.lock().remove(thread).map(|e| e.handle)
    }

    /// Number of active exchanges
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Thread identifiers with an active exchange
    pub fn threads(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Drop exchanges idle for longer than `timeout`
    ///
    /// Exchanges currently executing a step are skipped.
    pub fn sweep_idle(&self, timeout: Duration, now: Instant) -> Vec<String> {
        let mut active = self.lock();
        let mut expired = Vec::new();

        active.retain(|thread, entry| match entry.handle.try_lock() {
            Ok(mut exchange) if exchange.is_idle(timeout, now) => {
                exchange.expire();
                expired.push(thread.clone());
                false
            }
            _ => true,
        });

        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::Bot;
    use crate::exchange::{ExchangeTemplate, MessageOutcome, Step};
    use crate::store::SimpleStore;
    use crate::transport::memory::MemoryTransport;
    use crate::types::{BotIdentity, MessageEvent};
    use tokio_test::{assert_err, assert_ok};

    fn handle(ts: &str) -> (String, ExchangeHandle) {
        let bot = Bot::builder(Arc::new(MemoryTransport::new(BotIdentity {
            id: "B1".to_string(),
            name: "bee".to_string(),
        })))
        .build()
        .unwrap();
        let template = ExchangeTemplate::new("^start", "").unwrap().then(Step::message_handler(
            "wait",
            |_ex, _ev| Box::pin(async { Ok(MessageOutcome::Advance) }),
        ));
        let ev = MessageEvent::new("C1", "U1", "start", ts);
        let exchange = Exchange::start(&template, bot, &ev, Box::new(SimpleStore::default()));
        (exchange.id().to_string(), Arc::new(tokio::sync::Mutex::new(exchange)))
    }

    #[test]
    fn test_register_and_get() {
        let registry = ExchangeRegistry::new();
        let (id, h) = handle("1.0");
        assert_ok!(registry.register("1.0", &id, h));

        assert!(registry.contains("1.0"));
        assert!(registry.get("1.0").is_some());
        assert!(registry.get("2.0").is_none());
        assert!(registry.get("").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_twice_rejected() {
        let registry = ExchangeRegistry::new();
        let (id1, h1) = handle("1.0");
        let (id2, h2) = handle("1.0");
        registry.register("1.0", &id1, h1).unwrap();

        let err = assert_err!(registry.register("1.0", &id2, h2));
        assert!(matches!(err, BotError::ExchangeActive(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_checks_owner() {
        let registry = ExchangeRegistry::new();
        let (id, h) = handle("1.0");
        registry.register("1.0", &id, h).unwrap();

        assert!(!registry.remove("1.0", "exc-someone-else"));
        assert!(registry.contains("1.0"));
        assert!(registry.remove("1.0", &id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_terminate() {
        let registry = ExchangeRegistry::new();
        let (id, h) = handle("1.0");
        registry.register("1.0", &id, h).unwrap();
        assert!(registry.terminate("1.0").is_some());
        assert!(registry.terminate("1.0").is_none());
    }

    #[test]
    fn test_concurrent_register_single_winner() {
        let registry = Arc::new(ExchangeRegistry::new());
        let mut threads = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let (id, h) = handle("1.0");
            threads.push(std::thread::spawn(move || registry.register("1.0", &id, h).is_ok()));
        }
        let winners = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sweep_idle() {
        let registry = ExchangeRegistry::new();
        let (id, h) = handle("1.0");
        registry.register("1.0", &id, h.clone()).unwrap();

        let timeout = Duration::from_secs(60);
        assert!(registry.sweep_idle(timeout, Instant::now()).is_empty());

        let later = Instant::now() + Duration::from_secs(120);
        assert_eq!(registry.sweep_idle(timeout, later), vec!["1.0".to_string()]);
        assert!(registry.is_empty());
        assert!(!h.try_lock().unwrap().is_active());
    }

    #[test]
    fn test_sweep_skips_busy_exchange() {
        let registry = ExchangeRegistry::new();
        let (id, h) = handle("1.0");
        registry.register("1.0", &id, h.clone()).unwrap();

        let _busy = h.try_lock().unwrap();
        let later = Instant::now() + Duration::from_secs(120);
        assert!(registry.sweep_idle(Duration::from_secs(60), later).is_empty());
        assert_eq!(registry.len(), 1);
    }
}
