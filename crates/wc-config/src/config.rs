// SPDX-License-Identifier: Apache-2.0
//! Storage port for raw config blobs, and a service that (de)serializes
//! typed values over it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Storage port for raw config blobs, keyed by logical name.
pub trait ConfigStore {
    /// Load a raw config blob.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when `key` has never been saved.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;

    /// Persist a raw config blob under `key`, overwriting any prior value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the underlying write fails.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Errors raised by a [`ConfigStore`] or [`ConfigService`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `key` has never been saved.
    #[error("not found")]
    NotFound,
    /// The underlying read/write failed.
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    /// The stored blob was not valid JSON for the requested type.
    #[error("config serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A store-specific failure that doesn't fit the other variants.
    #[error("config error: {0}")]
    Other(String),
}

/// Serializes typed config values to JSON and delegates raw storage to a
/// [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Wrap `store`.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Consume the service, returning the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S: ConfigStore> ConfigService<S> {
    /// Load and deserialize `key`. Returns `Ok(None)` if `key` was never
    /// saved.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the stored blob exists but fails to
    /// deserialize, or the store reports any error other than
    /// [`ConfigError::NotFound`].
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if serialization or the underlying write
    /// fails.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemStore {
        blobs: RefCell<HashMap<String, Vec<u8>>>,
    }

    impl ConfigStore for MemStore {
        fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
            self.blobs.borrow().get(key).cloned().ok_or(ConfigError::NotFound)
        }

        fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
            self.blobs.borrow_mut().insert(key.to_string(), data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn load_of_missing_key_is_none_not_error() {
        let service = ConfigService::new(MemStore::default());
        assert!(service.load::<String>("absent").unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let service = ConfigService::new(MemStore::default());
        service.save("greeting", &"hello".to_string()).unwrap();
        let loaded: Option<String> = service.load("greeting").unwrap();
        assert_eq!(loaded, Some("hello".to_string()));
    }
}
