//! Access/refresh token persistence

use std::sync::Arc;

use super::storage::{KeyValueStorage, StorageError};

/// Thin wrapper over [`KeyValueStorage`] under two configurable keys.
/// Performs no validation of the tokens themselves.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
    access_key: String,
    refresh_key: String,
}

impl TokenStore {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        access_key: impl Into<String>,
        refresh_key: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            access_key: access_key.into(),
            refresh_key: refresh_key.into(),
        }
    }

    pub fn save_tokens(&self, access: &str, refresh: &str) -> Result<(), StorageError> {
        self.storage.set_item(&self.access_key, access)?;
        self.storage.set_item(&self.refresh_key, refresh)
    }

    /// Replace the access token after a refresh, keeping the refresh token
    pub fn save_access_token(&self, access: &str) -> Result<(), StorageError> {
        self.storage.set_item(&self.access_key, access)
    }

    pub fn clear_tokens(&self) -> Result<(), StorageError> {
        self.storage.remove_item(&self.access_key)?;
        self.storage.remove_item(&self.refresh_key)
    }

    pub fn load_access_token(&self) -> Result<Option<String>, StorageError> {
        self.storage.get_item(&self.access_key)
    }

    pub fn load_refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.storage.get_item(&self.refresh_key)
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("access_key", &self.access_key)
            .field("refresh_key", &self.refresh_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::storage::MemoryStorage;

    fn store() -> TokenStore {
        TokenStore::new(Arc::new(MemoryStorage::new()), "access", "refresh")
    }

    #[test]
    fn test_save_then_load() {
        let store = store();
        store.save_tokens("a", "r").unwrap();
        assert_eq!(store.load_access_token().unwrap().as_deref(), Some("a"));
        assert_eq!(store.load_refresh_token().unwrap().as_deref(), Some("r"));
    }

    #[test]
    fn test_access_token_replacement_keeps_refresh() {
        let store = store();
        store.save_tokens("a1", "r").unwrap();
        store.save_access_token("a2").unwrap();
        assert_eq!(store.load_access_token().unwrap().as_deref(), Some("a2"));
        assert_eq!(store.load_refresh_token().unwrap().as_deref(), Some("r"));
    }

    #[test]
    fn test_clear() {
        let store = store();
        store.save_tokens("a", "r").unwrap();
        store.clear_tokens().unwrap();
        assert_eq!(store.load_access_token().unwrap(), None);
        assert_eq!(store.load_refresh_token().unwrap(), None);
    }

    #[test]
    fn test_custom_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(storage.clone(), "ehr_access", "ehr_refresh");
        store.save_tokens("a", "r").unwrap();
        assert_eq!(storage.get_item("ehr_access").unwrap().as_deref(), Some("a"));
        assert_eq!(storage.get_item("access").unwrap(), None);
    }
}
