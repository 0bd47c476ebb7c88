//! pwman Crypto - password based envelope encryption
//!
//! This crate provides:
//! - A registry of key derivation functions (double SHA-256, Argon2id, scrypt)
//! - The cipher suite selector (AES-256-GCM, AES-192-GCM, ChaCha20-Poly1305)
//! - The JSON envelope codec that binds a KDF and an AEAD together
//! - The CFB-8 obfuscation used for remote storage credentials

pub mod cipher;
pub mod envelope;
pub mod kdf;
pub mod obfuscate;

pub use cipher::{AeadCipher, AeadFactory, CipherSuite, CIPHER_ENV_VAR};
pub use envelope::{Codec, Envelope};
pub use kdf::{KdfId, KdfRegistry, KeyDeriveFn, DERIVED_KEY_SIZE};
pub use obfuscate::{Cfb8Cryptor, Obfuscator, OBFUSCATION_CONFIG, OBFUSCATION_ENV_VAR};

use std::path::PathBuf;

/// Errors that can occur in cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Key derivation function '{0}' unknown")]
    KdfUnknown(String),

    #[error("Envelope malformed: {0}")]
    EnvelopeMalformed(String),

    #[error("Authentication failed - wrong password, corrupted data or cipher mismatch")]
    AuthenticationFailure,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Invalid key size: {0}")]
    InvalidKeySize(usize),

    #[error("Config already exists: {}", .0.display())]
    ConfigAlreadyExists(PathBuf),

    #[error("Config could not be parsed: {}", .0.display())]
    ConfigUnparseable(PathBuf),

    #[error("Environment variable '{0}' not set")]
    SecretEnvVarMissing(String),

    #[error("Invalid record pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Unable to determine home directory")]
    HomeDirUnavailable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Fill `buf` from the system CSPRNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    use ring::rand::SecureRandom;

    ring::rand::SystemRandom::new()
        .fill(buf)
        .map_err(|_| CryptoError::Encryption("system random generator failed".to_string()))
}
