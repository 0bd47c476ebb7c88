//! Encrypted envelope format for data at rest
//!
//! On disk an envelope is a JSON object:
//!
//! ```json
//! { "PbKdf": "argon2id", "Salt": "<base64>", "Nonce": "<base64>", "Data": "<base64>" }
//! ```
//!
//! `Data` is ciphertext || tag. The envelope never holds plaintext or the
//! derived key.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::cipher::{AeadFactory, CipherSuite};
use crate::kdf::{KdfId, KdfRegistry};
use crate::{fill_random, CryptoError, Result};

/// Salt length used for new envelopes
pub const DEFAULT_SALT_LEN: usize = 16;

/// The serialized form of an encrypted container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope {
    /// Id of the KDF the key was derived with
    pub pb_kdf: String,
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    /// Ciphertext followed by the authentication tag
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| CryptoError::EnvelopeMalformed(e.to_string()))
    }
}

/// Drives the KDF registry and the AEAD strategy to seal and open envelopes
#[derive(Clone)]
pub struct Codec {
    kdfs: KdfRegistry,
    aead: AeadFactory,
    salt_len: usize,
}

impl Codec {
    pub fn new(kdfs: KdfRegistry, aead: AeadFactory) -> Self {
        Self {
            kdfs,
            aead,
            salt_len: DEFAULT_SALT_LEN,
        }
    }

    /// Codec with every standard KDF and the given cipher suite
    pub fn with_suite(suite: CipherSuite) -> Self {
        Self::new(KdfRegistry::standard(), suite.factory())
    }

    pub fn with_salt_len(mut self, salt_len: usize) -> Self {
        self.salt_len = salt_len;
        self
    }

    /// Encrypt `plaintext` under `password` and return the serialized envelope
    pub fn encrypt(&self, password: &[u8], plaintext: &[u8], kdf: KdfId) -> Result<Vec<u8>> {
        self.seal(password, plaintext, kdf)?.to_bytes()
    }

    /// Decrypt a serialized envelope, reporting which KDF it was sealed with
    pub fn decrypt(&self, password: &[u8], envelope: &[u8]) -> Result<(Zeroizing<Vec<u8>>, KdfId)> {
        let envelope = Envelope::from_bytes(envelope)?;
        self.open(password, &envelope)
    }

    pub fn seal(&self, password: &[u8], plaintext: &[u8], kdf: KdfId) -> Result<Envelope> {
        let derive = self.kdfs.resolve(kdf)?;

        let mut salt = vec![0u8; self.salt_len];
        fill_random(&mut salt)?;

        let key = derive(password, &salt)?;
        let aead = (self.aead)(key.as_slice())?;

        let mut nonce = vec![0u8; aead.nonce_size()];
        fill_random(&mut nonce)?;

        let data = aead.seal(&nonce, plaintext)?;
        tracing::debug!(kdf = %kdf, len = plaintext.len(), "sealed envelope");

        Ok(Envelope {
            pb_kdf: kdf.as_str().to_string(),
            salt,
            nonce,
            data,
        })
    }

    pub fn open(&self, password: &[u8], envelope: &Envelope) -> Result<(Zeroizing<Vec<u8>>, KdfId)> {
        let kdf: KdfId = envelope.pb_kdf.parse()?;
        let derive = self.kdfs.resolve(kdf)?;

        let key = derive(password, &envelope.salt)?;
        let aead = (self.aead)(key.as_slice())?;

        if envelope.nonce.len() != aead.nonce_size() {
            return Err(CryptoError::EnvelopeMalformed(format!(
                "nonce has {} bytes, cipher expects {}",
                envelope.nonce.len(),
                aead.nonce_size()
            )));
        }

        let plaintext = aead.open(&envelope.nonce, &envelope.data)?;
        Ok((Zeroizing::new(plaintext), kdf))
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher;

    fn fast_codec() -> Codec {
        Codec::with_suite(CipherSuite::Aes256Gcm)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let codec = fast_codec();
        let plaintext = b"Dies ist ein toller Klartext";

        let sealed = codec.encrypt(b"schnuppsi", plaintext, KdfId::Sha256Double).unwrap();
        let (decrypted, kdf) = codec.decrypt(b"schnuppsi", &sealed).unwrap();

        assert_eq!(decrypted.as_slice(), plaintext);
        assert_eq!(kdf, KdfId::Sha256Double);
        assert_eq!(kdf.as_str(), "sha256-double");
    }

    #[test]
    fn test_roundtrip_for_every_kdf() {
        let codec = fast_codec();

        for kdf in KdfId::ALL {
            let sealed = codec.encrypt(b"pw", b"payload", kdf).unwrap();
            let (plain, used) = codec.decrypt(b"pw", &sealed).unwrap();
            assert_eq!(plain.as_slice(), b"payload");
            assert_eq!(used, kdf);
        }
    }

    #[test]
    fn test_roundtrip_for_every_suite() {
        for suite in [CipherSuite::Aes256Gcm, CipherSuite::Aes192Gcm, CipherSuite::ChaCha20Poly1305] {
            let codec = Codec::with_suite(suite);
            let sealed = codec.encrypt(b"pw", b"payload", KdfId::Sha256Double).unwrap();
            let (plain, _) = codec.decrypt(b"pw", &sealed).unwrap();
            assert_eq!(plain.as_slice(), b"payload", "{}", suite.name());
        }
    }

    #[test]
    fn test_encryption_is_not_deterministic() {
        let codec = fast_codec();

        let a = codec.seal(b"pw", b"same", KdfId::Sha256Double).unwrap();
        let b = codec.seal(b"pw", b"same", KdfId::Sha256Double).unwrap();

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.data, b.data);
        assert_eq!(a.salt.len(), DEFAULT_SALT_LEN);
    }

    #[test]
    fn test_any_flipped_bit_fails_authentication() {
        let codec = fast_codec();
        let envelope = codec.seal(b"pw", b"secret", KdfId::Sha256Double).unwrap();

        for byte in 0..envelope.data.len() {
            for bit in 0..8 {
                let mut tampered = envelope.clone();
                tampered.data[byte] ^= 1 << bit;
                let result = codec.open(b"pw", &tampered);
                assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
            }
        }
    }

    #[test]
    fn test_wrong_password_fails_authentication() {
        let codec = fast_codec();
        let sealed = codec.encrypt(b"right", b"secret", KdfId::Sha256Double).unwrap();

        assert!(matches!(
            codec.decrypt(b"wrong", &sealed),
            Err(CryptoError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_cipher_suite_mismatch_is_indistinguishable_from_wrong_password() {
        let sealed = Codec::with_suite(CipherSuite::Aes256Gcm)
            .encrypt(b"pw", b"secret", KdfId::Sha256Double)
            .unwrap();

        let result = Codec::with_suite(CipherSuite::ChaCha20Poly1305).decrypt(b"pw", &sealed);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
    }

    #[test]
    fn test_malformed_and_unknown_kdf() {
        let codec = fast_codec();
        assert!(matches!(codec.decrypt(b"pw", b"not json"), Err(CryptoError::EnvelopeMalformed(_))));

        let mut envelope = codec.seal(b"pw", b"x", KdfId::Sha256Double).unwrap();
        envelope.pb_kdf = "bcrypt".to_string();
        let bytes = envelope.to_bytes().unwrap();
        assert!(matches!(codec.decrypt(b"pw", &bytes), Err(CryptoError::KdfUnknown(_))));

        let restricted = Codec::new(
            KdfRegistry::empty().with(KdfId::Scrypt, crate::kdf::scrypt),
            cipher::aes256_gcm,
        );
        assert!(matches!(
            restricted.encrypt(b"pw", b"x", KdfId::Sha256Double),
            Err(CryptoError::KdfUnknown(_))
        ));
    }

    #[test]
    fn test_legacy_kdf_id_still_decrypts() {
        let codec = fast_codec();
        let mut envelope = codec.seal(b"pw", b"old data", KdfId::Sha256Double).unwrap();
        envelope.pb_kdf = "sha256".to_string();

        let (plain, kdf) = codec.decrypt(b"pw", &envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(plain.as_slice(), b"old data");
        assert_eq!(kdf, KdfId::Sha256Double);
    }

    #[test]
    fn test_wire_field_names() {
        let envelope = Envelope {
            pb_kdf: "scrypt".to_string(),
            salt: vec![0, 1],
            nonce: vec![2],
            data: vec![],
        };
        let json: serde_json::Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();

        assert_eq!(json["PbKdf"], "scrypt");
        assert_eq!(json["Salt"], "AAE=");
        assert_eq!(json["Nonce"], "Ag==");
        assert_eq!(json["Data"], "");
    }

    fn fake_kdf(_password: &[u8], _salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        Ok(Zeroizing::new([42u8; 32]))
    }

    #[test]
    fn test_codec_accepts_fake_strategies() {
        let codec = Codec::new(KdfRegistry::empty().with(KdfId::Argon2id, fake_kdf), cipher::aes256_gcm);

        let sealed = codec.encrypt(b"ignored", b"data", KdfId::Argon2id).unwrap();
        let (plain, _) = codec.decrypt(b"also ignored", &sealed).unwrap();
        assert_eq!(plain.as_slice(), b"data");
    }
}
