//! Password storage contract and the in-memory cache behind the agent
//!
//! Values are zeroized when replaced, removed, or when the cache is dropped.
//! Nothing here is ever persisted or logged.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::{AgentError, Result};

/// Something that can hold passwords by name.
///
/// Implemented by the agent's own cache and by [`crate::AgentClient`], which
/// forwards every call to a running agent.
#[async_trait]
pub trait PasswordStore: Send + Sync {
    /// Fails with [`AgentError::KeyNotFound`] if nothing is stored under `name`
    async fn get_password(&self, name: &str) -> Result<String>;

    /// Stores or overwrites
    async fn set_password(&self, name: &str, password: &str) -> Result<()>;

    /// Removes `name`; succeeds even if it was never set
    async fn reset_password(&self, name: &str) -> Result<()>;
}

/// Mutex guarded name -> password table
#[derive(Default)]
pub struct CredentialCache {
    entries: Mutex<HashMap<String, Zeroizing<String>>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Result<String> {
        let entries = self.entries.lock().map_err(|_| AgentError::CachePoisoned)?;
        entries
            .get(name)
            .map(|password| password.as_str().to_string())
            .ok_or_else(|| AgentError::KeyNotFound(name.to_string()))
    }

    pub fn set(&self, name: &str, password: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| AgentError::CachePoisoned)?;
        entries.insert(name.to_string(), Zeroizing::new(password.to_string()));
        Ok(())
    }

    pub fn reset(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| AgentError::CachePoisoned)?;
        entries.remove(name);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PasswordStore for CredentialCache {
    async fn get_password(&self, name: &str) -> Result<String> {
        self.get(name)
    }

    async fn set_password(&self, name: &str, password: &str) -> Result<()> {
        self.set(name, password)
    }

    async fn reset_password(&self, name: &str) -> Result<()> {
        self.reset(name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// SET, GET, RESET, GET-must-fail against any store
    pub(crate) async fn exercise_store<S: PasswordStore + ?Sized>(store: &S) {
        store.set_password("dummykey", "dummyvalue").await.unwrap();
        assert_eq!(store.get_password("dummykey").await.unwrap(), "dummyvalue");

        store.reset_password("dummykey").await.unwrap();
        assert!(store.get_password("dummykey").await.is_err());
    }

    #[tokio::test]
    async fn test_cache_semantics() {
        let cache = CredentialCache::new();
        exercise_store(&cache).await;
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_missing_is_key_not_found() {
        let cache = CredentialCache::new();
        assert!(matches!(cache.get("nope"), Err(AgentError::KeyNotFound(name)) if name == "nope"));
    }

    #[test]
    fn test_reset_unknown_succeeds() {
        let cache = CredentialCache::new();
        assert!(cache.reset("unknown").is_ok());
    }

    #[test]
    fn test_set_overwrites() {
        let cache = CredentialCache::new();
        cache.set("k", "v1").unwrap();
        cache.set("k", "v2").unwrap();

        assert_eq!(cache.get("k").unwrap(), "v2");
        assert_eq!(cache.len(), 1);
    }
}
