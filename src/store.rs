//! Conversation-scoped key/value storage
//!
//! Every running exchange owns a `Store` so that steps can hand data to
//! later steps. Values are kept as opaque serialized bytes; the typed
//! `put`/`get` helpers on `dyn Store` handle the encoding.

use crate::error::{BotError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for exchange-scoped storage backends
pub trait Store: Send + Sync {
    /// Store encoded bytes under a key, replacing any previous value
    fn put_bytes(&mut self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Fetch the encoded bytes for a key; a missing key is an error
    fn get_bytes(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove a key; a missing key is an error
    fn delete(&mut self, key: &str) -> Result<()>;

    /// Number of stored keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl dyn Store {
    /// Serialize and store a value
    ///
    /// Values that encode to nothing (`None`, `()`) are rejected.
    pub fn put<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value)?;
        if encoded.is_null() {
            return Err(BotError::EmptyValue(key.to_string()));
        }
        self.put_bytes(key, serde_json::to_vec(&encoded)?)
    }

    /// Fetch and deserialize a value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let bytes = self.get_bytes(key)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Builds a fresh store for each new exchange
pub type StoreFactory = Arc<dyn Fn() -> Box<dyn Store> + Send + Sync>;

/// Default factory producing empty `SimpleStore`s
pub fn simple_store_factory() -> StoreFactory {
    Arc::new(|| Box::new(SimpleStore::default()))
}

/// In-process store backed by a `HashMap`
#[derive(Debug, Default, Clone)]
pub struct SimpleStore {
    values: HashMap<String, Vec<u8>>,
}

impl Store for SimpleStore {
    fn put_bytes(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| BotError::NotFound(format!("key {} not found", key)))
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.values
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BotError::NotFound(format!("key {} not found", key)))
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}
