//! Password based key derivation
//!
//! Every KDF turns `(password, salt)` into a 32 byte key. The id of the KDF
//! is stored in the envelope, so ids are part of the on-disk format and must
//! never change meaning.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::{CryptoError, Result};

/// Size of every derived key (32 bytes)
pub const DERIVED_KEY_SIZE: usize = 32;

const ARGON2_TIME_COST: u32 = 2;
const ARGON2_MEMORY_KIB: u32 = 15 * 1024;
const ARGON2_PARALLELISM: u32 = 1;

// N = 2^15 = 32768
const SCRYPT_LOG_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 2;

/// A key derivation strategy
pub type KeyDeriveFn = fn(password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; DERIVED_KEY_SIZE]>>;

/// Identifier of a key derivation function as stored in an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdfId {
    Sha256Double,
    Argon2id,
    Scrypt,
}

impl KdfId {
    pub const ALL: [KdfId; 3] = [KdfId::Sha256Double, KdfId::Argon2id, KdfId::Scrypt];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256Double => "sha256-double",
            Self::Argon2id => "argon2id",
            Self::Scrypt => "scrypt",
        }
    }
}

impl Default for KdfId {
    fn default() -> Self {
        Self::Argon2id
    }
}

impl fmt::Display for KdfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KdfId {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256-double" | "sha256" => Ok(Self::Sha256Double),
            "argon2id" | "argon2" => Ok(Self::Argon2id),
            "scrypt" => Ok(Self::Scrypt),
            other => Err(CryptoError::KdfUnknown(other.to_string())),
        }
    }
}

/// Immutable lookup table from KDF id to strategy
#[derive(Clone)]
pub struct KdfRegistry {
    strategies: HashMap<KdfId, KeyDeriveFn>,
}

impl Default for KdfRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl KdfRegistry {
    /// Registry containing every supported KDF
    pub fn standard() -> Self {
        Self::empty()
            .with(KdfId::Sha256Double, sha256_double)
            .with(KdfId::Argon2id, argon2id)
            .with(KdfId::Scrypt, scrypt)
    }

    /// Registry without any strategy
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Register (or replace) the strategy for `id`
    pub fn with(mut self, id: KdfId, derive: KeyDeriveFn) -> Self {
        self.strategies.insert(id, derive);
        self
    }

    pub fn resolve(&self, id: KdfId) -> Result<KeyDeriveFn> {
        self.strategies
            .get(&id)
            .copied()
            .ok_or_else(|| CryptoError::KdfUnknown(id.to_string()))
    }
}

/// SHA256(password || salt || password)
pub fn sha256_double(password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; DERIVED_KEY_SIZE]>> {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.update(password);

    let mut key = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
    key.copy_from_slice(&hasher.finalize());
    Ok(key)
}

/// Argon2id, t=2, m=15 MiB, p=1
pub fn argon2id(password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; DERIVED_KEY_SIZE]>> {
    let params = argon2::Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_TIME_COST,
        ARGON2_PARALLELISM,
        Some(DERIVED_KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("invalid Argon2id parameters: {e}")))?;

    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
    argon2
        .hash_password_into(password, salt, key.as_mut())
        .map_err(|e| CryptoError::KeyDerivation(format!("Argon2id failed: {e}")))?;
    Ok(key)
}

/// scrypt, N=32768, r=8, p=2
pub fn scrypt(password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; DERIVED_KEY_SIZE]>> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, DERIVED_KEY_SIZE)
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid scrypt parameters: {e}")))?;

    let mut key = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
    scrypt::scrypt(password, salt, &params, key.as_mut())
        .map_err(|e| CryptoError::KeyDerivation(format!("scrypt failed: {e}")))?;
    Ok(key)
}
