//! Obfuscation of remote storage credentials
//!
//! The WebDAV password is kept in `~/.rustpwman` masked with AES-128 in
//! CFB-8 mode. Key and IV are the two halves of SHA256 over a secret taken
//! from an environment variable. There is no authentication tag: a wrong
//! secret yields a wrong password, not an error.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::{CryptoError, Result};

/// Environment variable holding the obfuscation secret
pub const OBFUSCATION_ENV_VAR: &str = "RUSTPWMAN_OBFUSCATION";
/// Name of the config file in the home directory
pub const OBFUSCATION_CONFIG: &str = ".rustpwman";

const BLOCK_SIZE: usize = 16;
const OBFUSCATED_MARKER: &str = "##obfuscated##:";

/// AES-128 in CFB-8 mode
pub struct Cfb8Cryptor {
    cipher: Aes128,
    register: [u8; BLOCK_SIZE],
}

impl Cfb8Cryptor {
    pub fn new(key: &[u8; BLOCK_SIZE], iv: &[u8; BLOCK_SIZE]) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(key)),
            register: *iv,
        }
    }

    fn keystream_byte(&self) -> u8 {
        let mut block = GenericArray::clone_from_slice(&self.register);
        self.cipher.encrypt_block(&mut block);
        block[0]
    }

    fn shift_in(&mut self, feedback: u8) {
        self.register.copy_within(1.., 0);
        self.register[BLOCK_SIZE - 1] = feedback;
    }

    /// The register is fed the produced ciphertext byte
    pub fn encrypt_byte(&mut self, input: u8) -> u8 {
        let output = input ^ self.keystream_byte();
        self.shift_in(output);
        output
    }

    /// The register is fed the consumed ciphertext byte
    pub fn decrypt_byte(&mut self, input: u8) -> u8 {
        let output = input ^ self.keystream_byte();
        self.shift_in(input);
        output
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte = self.encrypt_byte(*byte);
        }
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte = self.decrypt_byte(*byte);
        }
    }
}

/// Derive `(key, iv)` from the obfuscation secret
pub fn derive_key_iv(secret: &str) -> ([u8; BLOCK_SIZE], [u8; BLOCK_SIZE]) {
    let digest = Sha256::digest(secret.as_bytes());

    let mut key = [0u8; BLOCK_SIZE];
    let mut iv = [0u8; BLOCK_SIZE];
    key.copy_from_slice(&digest[..BLOCK_SIZE]);
    iv.copy_from_slice(&digest[BLOCK_SIZE..]);
    (key, iv)
}

const USER_PATTERN: &str = r#"^.*webdav_user.+"(.+)".*$"#;
const PASSWORD_PATTERN: &str = r"^.*webdav_pw.+##obfuscated##:([0-9A-Fa-f]+).*$";

/// Reads and writes the obfuscation record
pub struct Obfuscator {
    env_var: String,
    config_path: PathBuf,
    re_user: Regex,
    re_password: Regex,
}

impl Obfuscator {
    pub fn new(env_var: impl Into<String>, config_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            env_var: env_var.into(),
            config_path: config_path.into(),
            re_user: Regex::new(USER_PATTERN)?,
            re_password: Regex::new(PASSWORD_PATTERN)?,
        })
    }

    /// `$RUSTPWMAN_OBFUSCATION` and `~/.rustpwman`
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(CryptoError::HomeDirUnavailable)?;
        Self::new(OBFUSCATION_ENV_VAR, home.join(OBFUSCATION_CONFIG))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn cryptor(&self) -> Result<Cfb8Cryptor> {
        let secret = std::env::var(&self.env_var).unwrap_or_default();
        if secret.is_empty() {
            return Err(CryptoError::SecretEnvVarMissing(self.env_var.clone()));
        }

        let (key, iv) = derive_key_iv(&secret);
        Ok(Cfb8Cryptor::new(&key, &iv))
    }

    /// Write a new record. Never overwrites an existing config.
    pub fn obfuscate(&self, user_id: &str, password: &str) -> Result<()> {
        let mut cryptor = self.cryptor()?;

        if self.config_path.exists() {
            return Err(CryptoError::ConfigAlreadyExists(self.config_path.clone()));
        }

        let mut masked = password.as_bytes().to_vec();
        cryptor.encrypt(&mut masked);

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.config_path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    CryptoError::ConfigAlreadyExists(self.config_path.clone())
                }
                _ => CryptoError::Io(e),
            })?;

        writeln!(file, "webdav_user = \"{user_id}\"")?;
        writeln!(
            file,
            "webdav_pw = \"{OBFUSCATED_MARKER}{}\"",
            hex::encode_upper(&masked)
        )?;

        tracing::info!(path = %self.config_path.display(), "wrote obfuscated credentials");
        Ok(())
    }

    /// Returns `(user_id, password)`
    pub fn deobfuscate(&self) -> Result<(String, String)> {
        let mut cryptor = self.cryptor()?;
        let (user_id, mut masked) = self.read_record()?;

        cryptor.decrypt(&mut masked);
        let password = String::from_utf8_lossy(&masked).into_owned();

        Ok((user_id, password))
    }

    fn read_record(&self) -> Result<(String, Vec<u8>)> {
        let content = fs::read_to_string(&self.config_path)?;

        let mut user_id: Option<String> = None;
        let mut masked: Option<Vec<u8>> = None;

        for line in content.lines() {
            if user_id.is_none() {
                user_id = self.re_user.captures(line).map(|c| c[1].to_string());
            }

            if masked.is_none() {
                masked = self
                    .re_password
                    .captures(line)
                    .and_then(|c| hex::decode(&c[1]).ok());
            }
        }

        match (user_id, masked) {
            (Some(user_id), Some(masked)) => Ok((user_id, masked)),
            _ => Err(CryptoError::ConfigUnparseable(self.config_path.clone())),
        }
    }
}
