use async_trait::async_trait;
use keyring::Entry;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const API_KEY_SERVICE: &str = "ai.omnichat.api_keys";

/// Environment variables consulted for the API key, in priority order.
pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

#[async_trait]
pub trait SecureStorage: Send + Sync {
    async fn store(&self, service: &str, key: &str, value: &str) -> Result<()>;
    async fn retrieve(&self, service: &str, key: &str) -> Result<Option<String>>;
    async fn delete(&self, service: &str, key: &str) -> Result<()>;
}

pub struct SecureStorageManager {
    backend: Box<dyn SecureStorage>,
}

impl SecureStorageManager {
    pub fn new() -> Self {
        Self::with_backend(Box::new(KeyringStorage))
    }

    pub fn with_backend(backend: Box<dyn SecureStorage>) -> Self {
        Self { backend }
    }

    pub async fn store_api_key(&self, provider: &str, key: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(Error::validation("API key must not be empty"));
        }

        let result = self.backend.store(API_KEY_SERVICE, provider, key.trim()).await;
        match &result {
            Ok(()) => debug!("Stored API key for provider: {}", provider),
            Err(e) => warn!("Failed to store API key for provider {}: {}", provider, e),
        }
        result
    }

    pub async fn retrieve_api_key(&self, provider: &str) -> Result<Option<String>> {
        let result = self.backend.retrieve(API_KEY_SERVICE, provider).await;
        match &result {
            Ok(Some(_)) => debug!("Retrieved API key for provider: {}", provider),
            Ok(None) => debug!("No API key found for provider: {}", provider),
            Err(e) => warn!("Failed to retrieve API key for provider {}: {}", provider, e),
        }
        result
    }

    pub async fn delete_api_key(&self, provider: &str) -> Result<()> {
        let result = self.backend.delete(API_KEY_SERVICE, provider).await;
        if let Err(e) = &result {
            warn!("Failed to delete API key for provider {}: {}", provider, e);
        }
        result
    }

    /// Resolves the key from an explicit value, then the environment, then
    /// the keyring.
    pub async fn resolve_api_key<F>(
        &self,
        provider: &str,
        explicit: Option<&str>,
        env_lookup: F,
    ) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = key_from_sources(explicit, env_lookup) {
            return Ok(key);
        }

        self.retrieve_api_key(provider).await?.ok_or_else(|| {
            Error::platform(format!(
                "No API key for {}. Set {} or run `omnichat api-key {} --set <KEY>`",
                provider,
                API_KEY_ENV_VARS.join(" or "),
                provider
            ))
        })
    }
}

impl Default for SecureStorageManager {
    fn default() -> Self {
        Self::new()
    }
}

fn key_from_sources<F>(explicit: Option<&str>, env_lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .map(str::to_string)
        .into_iter()
        .chain(API_KEY_ENV_VARS.iter().filter_map(|name| env_lookup(name)))
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}

/// OS keychain backend via the `keyring` crate.
pub struct KeyringStorage;

#[async_trait]
impl SecureStorage for KeyringStorage {
    async fn store(&self, service: &str, key: &str, value: &str) -> Result<()> {
        let entry = Entry::new(service, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    async fn retrieve(&self, service: &str, key: &str) -> Result<Option<String>> {
        let entry = Entry::new(service, key)?;
        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::SecureStorage(e)),
        }
    }

    async fn delete(&self, service: &str, key: &str) -> Result<()> {
        let entry = Entry::new(service, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::SecureStorage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStorage {
        entries: Mutex<HashMap<(String, String), String>>,
    }

    #[async_trait]
    impl SecureStorage for MemoryStorage {
        async fn store(&self, service: &str, key: &str, value: &str) -> Result<()> {
            self.entries
                .lock()
                .insert((service.to_string(), key.to_string()), value.to_string());
            Ok(())
        }

        async fn retrieve(&self, service: &str, key: &str) -> Result<Option<String>> {
            Ok(self
                .entries
                .lock()
                .get(&(service.to_string(), key.to_string()))
                .cloned())
        }

        async fn delete(&self, service: &str, key: &str) -> Result<()> {
            self.entries.lock().remove(&(service.to_string(), key.to_string()));
            Ok(())
        }
    }

    fn memory_manager() -> SecureStorageManager {
        SecureStorageManager::with_backend(Box::new(MemoryStorage::default()))
    }

    fn env_of(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[tokio::test]
    async fn test_store_retrieve_delete() {
        let storage = memory_manager();

        storage.store_api_key("gemini", " AIza-test ").await.unwrap();
        assert_eq!(
            storage.retrieve_api_key("gemini").await.unwrap(),
            Some("AIza-test".to_string())
        );

        storage.delete_api_key("gemini").await.unwrap();
        assert_eq!(storage.retrieve_api_key("gemini").await.unwrap(), None);
        assert!(storage.store_api_key("gemini", "  ").await.is_err());
    }

    #[tokio::test]
    async fn test_resolution_order() {
        let storage = memory_manager();
        storage.store_api_key("gemini", "from-keyring").await.unwrap();

        let key = storage
            .resolve_api_key("gemini", Some("from-flag"), env_of(&[("GEMINI_API_KEY", "from-env")]))
            .await
            .unwrap();
        assert_eq!(key, "from-flag");

        let key = storage
            .resolve_api_key(
                "gemini",
                None,
                env_of(&[("API_KEY", "generic"), ("GEMINI_API_KEY", "specific")]),
            )
            .await
            .unwrap();
        assert_eq!(key, "specific");

        let key = storage
            .resolve_api_key("gemini", None, env_of(&[("GEMINI_API_KEY", "  "), ("API_KEY", "generic")]))
            .await
            .unwrap();
        assert_eq!(key, "generic");

        let key = storage.resolve_api_key("gemini", None, env_of(&[])).await.unwrap();
        assert_eq!(key, "from-keyring");
    }

    #[tokio::test]
    async fn test_missing_key_is_an_error() {
        let storage = memory_manager();
        let err = storage
            .resolve_api_key("gemini", None, env_of(&[]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
