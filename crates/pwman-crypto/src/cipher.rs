//! Authenticated encryption strategies
//!
//! The cipher suite is not recorded in the envelope. It is chosen once per
//! process and passed to the codec, so encrypt-time and decrypt-time must
//! agree on it or opening fails with an authentication error.

use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::{consts::U12, Aead, AeadCore, KeyInit, Nonce};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes256Gcm, AesGcm};
use chacha20poly1305::ChaCha20Poly1305;

use crate::kdf::DERIVED_KEY_SIZE;
use crate::{CryptoError, Result};

/// Environment variable that selects the process wide cipher suite
pub const CIPHER_ENV_VAR: &str = "PWMAN_CIPHER";

/// AES-192 only consumes the first 24 bytes of the derived key
const AES192_KEY_SIZE: usize = 24;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// An AEAD instance bound to one key
pub trait AeadCipher {
    fn nonce_size(&self) -> usize;

    /// Returns ciphertext || tag
    fn seal(&self, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Builds an AEAD from a derived key
pub type AeadFactory = fn(key: &[u8]) -> Result<Box<dyn AeadCipher>>;

/// Process wide AEAD selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherSuite {
    #[default]
    Aes256Gcm,
    Aes192Gcm,
    ChaCha20Poly1305,
}

impl CipherSuite {
    /// Map the selector value: unset or empty is AES-256-GCM, `AES192` is
    /// AES-192-GCM, anything else is ChaCha20-Poly1305.
    pub fn from_selector(value: Option<&str>) -> Self {
        match value {
            None | Some("") => Self::Aes256Gcm,
            Some("AES192") => Self::Aes192Gcm,
            Some(_) => Self::ChaCha20Poly1305,
        }
    }

    /// Read [`CIPHER_ENV_VAR`]. Call once at startup.
    pub fn from_env() -> Self {
        let value = std::env::var(CIPHER_ENV_VAR).ok();
        Self::from_selector(value.as_deref())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
            Self::Aes192Gcm => "AES-192-GCM",
            Self::ChaCha20Poly1305 => "ChaCha20-Poly1305",
        }
    }

    pub fn factory(&self) -> AeadFactory {
        match self {
            Self::Aes256Gcm => aes256_gcm,
            Self::Aes192Gcm => aes192_gcm,
            Self::ChaCha20Poly1305 => chacha20_poly1305,
        }
    }
}

struct RustCryptoAead<C>(C);

impl<C: Aead> AeadCipher for RustCryptoAead<C> {
    fn nonce_size(&self) -> usize {
        <C as AeadCore>::NonceSize::USIZE
    }

    fn seal(&self, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != self.nonce_size() {
            return Err(CryptoError::Encryption(format!("invalid nonce size {}", nonce.len())));
        }

        self.0
            .encrypt(Nonce::<C>::from_slice(nonce), plaintext)
            .map_err(|_| CryptoError::Encryption("AEAD seal failed".to_string()))
    }

    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != self.nonce_size() {
            return Err(CryptoError::AuthenticationFailure);
        }

        self.0
            .decrypt(Nonce::<C>::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailure)
    }
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.len() != DERIVED_KEY_SIZE {
        return Err(CryptoError::InvalidKeySize(key.len()));
    }
    Ok(())
}

pub fn aes256_gcm(key: &[u8]) -> Result<Box<dyn AeadCipher>> {
    check_key(key)?;
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeySize(key.len()))?;
    Ok(Box::new(RustCryptoAead(cipher)))
}

pub fn aes192_gcm(key: &[u8]) -> Result<Box<dyn AeadCipher>> {
    check_key(key)?;
    let cipher = Aes192Gcm::new_from_slice(&key[..AES192_KEY_SIZE])
        .map_err(|_| CryptoError::InvalidKeySize(AES192_KEY_SIZE))?;
    Ok(Box::new(RustCryptoAead(cipher)))
}

pub fn chacha20_poly1305(key: &[u8]) -> Result<Box<dyn AeadCipher>> {
    check_key(key)?;
    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKeySize(key.len()))?;
    Ok(Box::new(RustCryptoAead(cipher)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITES: [CipherSuite; 3] = [
        CipherSuite::Aes256Gcm,
        CipherSuite::Aes192Gcm,
        CipherSuite::ChaCha20Poly1305,
    ];

    #[test]
    fn test_selector_mapping() {
        assert_eq!(CipherSuite::from_selector(None), CipherSuite::Aes256Gcm);
        assert_eq!(CipherSuite::from_selector(Some("")), CipherSuite::Aes256Gcm);
        assert_eq!(CipherSuite::from_selector(Some("AES192")), CipherSuite::Aes192Gcm);
        assert_eq!(CipherSuite::from_selector(Some("CHACHA")), CipherSuite::ChaCha20Poly1305);
        assert_eq!(CipherSuite::from_selector(Some("aes192")), CipherSuite::ChaCha20Poly1305);
    }

    #[test]
    fn test_seal_open_roundtrip_for_every_suite() {
        let key = [7u8; DERIVED_KEY_SIZE];

        for suite in SUITES {
            let aead = suite.factory()(&key).unwrap();
            let nonce = vec![3u8; aead.nonce_size()];

            let ciphertext = aead.seal(&nonce, b"mail.example.org: hunter2").unwrap();
            assert_eq!(ciphertext.len(), b"mail.example.org: hunter2".len() + 16);

            let plaintext = aead.open(&nonce, &ciphertext).unwrap();
            assert_eq!(plaintext, b"mail.example.org: hunter2", "{}", suite.name());
        }
    }

    #[test]
    fn test_suite_mismatch_fails_authentication() {
        let key = [9u8; DERIVED_KEY_SIZE];
        let nonce = [0u8; 12];

        let sealed = aes256_gcm(&key).unwrap().seal(&nonce, b"data").unwrap();
        let result = chacha20_poly1305(&key).unwrap().open(&nonce, &sealed);

        assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
    }

    #[test]
    fn test_wrong_key_size_rejected() {
        assert!(matches!(aes256_gcm(&[0u8; 16]), Err(CryptoError::InvalidKeySize(16))));
    }
}
