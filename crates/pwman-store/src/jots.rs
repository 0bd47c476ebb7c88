//! In-memory container contents

use std::collections::BTreeMap;

use pwman_crypto::KdfId;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::{Result, StoreError};

/// One entry as it appears in the serialized container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JotsEntry {
    pub key: String,
    pub text: String,
}

impl Drop for JotsEntry {
    fn drop(&mut self) {
        self.text.zeroize();
    }
}

/// Decrypted container: entries plus the KDF the container is sealed with
pub struct Jots {
    entries: BTreeMap<String, String>,
    kdf: KdfId,
}

impl Jots {
    pub fn empty(kdf: KdfId) -> Self {
        Self {
            entries: BTreeMap::new(),
            kdf,
        }
    }

    /// Parse the plaintext of a container. Later duplicates win.
    pub fn from_json(plaintext: &[u8], kdf: KdfId) -> Result<Self> {
        let list: Vec<JotsEntry> = serde_json::from_slice(plaintext)?;

        let mut jots = Self::empty(kdf);
        for entry in list {
            jots.entries.insert(entry.key.clone(), entry.text.clone());
        }
        Ok(jots)
    }

    /// Serialize as a key-ordered JSON list, indented by four spaces
    pub fn to_json(&self) -> Result<Zeroizing<Vec<u8>>> {
        let list: Vec<JotsEntry> = self
            .entries
            .iter()
            .map(|(key, text)| JotsEntry {
                key: key.clone(),
                text: text.clone(),
            })
            .collect();

        let mut out = Zeroizing::new(Vec::new());
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut *out, formatter);
        list.serialize(&mut serializer)?;
        Ok(out)
    }

    pub fn kdf(&self) -> KdfId {
        self.kdf
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names in ascending order
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn get(&self, key: &str) -> Result<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    /// Insert or replace. Returns `true` if an existing entry was replaced.
    pub fn upsert(&mut self, key: &str, text: &str) -> bool {
        match self.entries.insert(key.to_string(), text.to_string()) {
            Some(mut old) => {
                old.zeroize();
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, key: &str) -> Result<()> {
        let mut old = self
            .entries
            .remove(key)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))?;
        old.zeroize();
        Ok(())
    }

    /// Move an entry to a new name that must not be taken yet
    pub fn rename(&mut self, key: &str, new_key: &str) -> Result<()> {
        if !self.entries.contains_key(key) {
            return Err(StoreError::KeyNotFound(key.to_string()));
        }
        if self.entries.contains_key(new_key) {
            return Err(StoreError::KeyExists(new_key.to_string()));
        }

        if let Some(text) = self.entries.remove(key) {
            self.entries.insert(new_key.to_string(), text);
        }
        Ok(())
    }
}

impl Drop for Jots {
    fn drop(&mut self) {
        for text in self.entries.values_mut() {
            text.zeroize();
        }
    }
}
