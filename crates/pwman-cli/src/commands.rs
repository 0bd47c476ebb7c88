//! The `pwman` subcommands

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use pwman_agent::{fingerprint, PasswordStore};
use pwman_crypto::{CipherSuite, Codec, KdfId, Obfuscator, CIPHER_ENV_VAR, OBFUSCATION_ENV_VAR};
use pwman_store::{backend_for, write_private, ContainerBackend, Jots};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::password::{self, ENTER_PASSWORD};

/// Environment variable naming the default container
pub const CONTAINER_ENV_VAR: &str = "PWMANFILE";

/// Asks the user for a secret, showing the given text
pub type Prompt = fn(&str) -> io::Result<String>;

/// Everything a command needs: how to encrypt, whom to ask for cached
/// passwords and how to prompt
pub struct Session {
    codec: Codec,
    agent: Arc<dyn PasswordStore>,
    ask: Prompt,
}

impl Session {
    pub fn new(suite: CipherSuite, agent: Arc<dyn PasswordStore>) -> Self {
        debug!(cipher = suite.name(), "session configured");
        Self {
            codec: Codec::with_suite(suite),
            agent,
            ask: password::prompt,
        }
    }

    pub fn with_prompt(mut self, ask: Prompt) -> Self {
        self.ask = ask;
        self
    }

    fn backend(&self, location: &str) -> Result<Box<dyn ContainerBackend>> {
        Ok(backend_for(location, self.codec.clone())?)
    }

    async fn unlock(&self, location: &str) -> Result<(Box<dyn ContainerBackend>, Jots, SecretString)> {
        let backend = self.backend(location)?;
        let password = password::get_password(self.agent.as_ref(), location, || {
            (self.ask)(ENTER_PASSWORD)
        })
        .await
        .context("Unable to read password")?;

        let jots = backend
            .open(location, password.expose_secret())
            .with_context(|| format!("Unable to open container '{location}'"))?;
        Ok((backend, jots, password))
    }

    /// Open, let `edit` change the container, then seal it again
    async fn modify<F>(&self, location: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Jots) -> Result<()>,
    {
        let (backend, mut jots, password) = self.unlock(location).await?;
        edit(&mut jots)?;

        backend
            .close(location, password.expose_secret(), &jots)
            .with_context(|| format!("Unable to save container '{location}'"))
    }

    /// Create a new empty container
    pub fn init(&self, location: &str, kdf: KdfId) -> Result<()> {
        let backend = self.backend(location)?;
        if backend.exists(location)? {
            bail!("Container '{location}' already exists");
        }

        let password = password::get_new_password(self.ask)?;
        backend.close(location, password.expose_secret(), &backend.init(kdf))?;
        info!(location, %kdf, "container created");
        Ok(())
    }

    pub async fn list(&self, location: &str, out: &mut impl Write) -> Result<()> {
        let (_, jots, _) = self.unlock(location).await?;
        for key in jots.keys() {
            writeln!(out, "{key}")?;
        }
        Ok(())
    }

    pub async fn get(&self, location: &str, key: &str, out: &mut impl Write) -> Result<()> {
        let (_, jots, _) = self.unlock(location).await?;
        writeln!(out, "{}", jots.get(key)?)?;
        Ok(())
    }

    /// Add or replace `key` with the contents of `value_file`
    pub async fn put(&self, location: &str, key: &str, value_file: &Path, out: &mut impl Write) -> Result<()> {
        let value = std::fs::read_to_string(value_file)
            .with_context(|| format!("Unable to load value data from '{}'", value_file.display()))?;

        let mut replaced = false;
        self.modify(location, |jots| {
            replaced = jots.upsert(key, &value);
            Ok(())
        })
        .await?;

        writeln!(out, "{}", if replaced { "Entry replaced" } else { "Entry added" })?;
        Ok(())
    }

    pub async fn delete(&self, location: &str, key: &str) -> Result<()> {
        self.modify(location, |jots| Ok(jots.delete(key)?)).await
    }

    pub async fn rename(&self, location: &str, key: &str, new_key: &str) -> Result<()> {
        self.modify(location, |jots| Ok(jots.rename(key, new_key)?)).await
    }

    /// Seal an arbitrary file. The envelope goes to `output` or `out`.
    pub fn encrypt(&self, input: &Path, output: Option<&Path>, kdf: KdfId, out: &mut impl Write) -> Result<()> {
        let plaintext = std::fs::read(input)
            .with_context(|| format!("Unable to read '{}'", input.display()))?;
        let password = password::get_new_password(self.ask)?;

        let sealed = self
            .codec
            .encrypt(password.expose_secret().as_bytes(), &plaintext, kdf)
            .context("Unable to encrypt data")?;

        match output {
            Some(path) => write_private(path, &sealed)?,
            None => {
                out.write_all(&sealed)?;
                writeln!(out)?;
            }
        }
        Ok(())
    }

    /// Open an envelope produced by [`Session::encrypt`] or by `close`
    pub async fn decrypt(&self, input: &Path, output: Option<&Path>, out: &mut impl Write) -> Result<()> {
        let location = input.to_string_lossy();
        let sealed = std::fs::read(input)
            .with_context(|| format!("Unable to read '{}'", input.display()))?;

        let password = password::get_password(self.agent.as_ref(), &location, || {
            (self.ask)(ENTER_PASSWORD)
        })
        .await?;

        let (plaintext, kdf) = self
            .codec
            .decrypt(password.expose_secret().as_bytes(), &sealed)
            .with_context(|| format!("Unable to decrypt '{location}'"))?;
        debug!(%kdf, "decrypted");

        match output {
            Some(path) => write_private(path, &plaintext)?,
            None => out.write_all(&plaintext)?,
        }
        Ok(())
    }

    /// Check a typed password against the container and hand it to the agent
    pub async fn remember(&self, location: &str) -> Result<()> {
        let backend = self.backend(location)?;
        let password = SecretString::new((self.ask)(ENTER_PASSWORD)?);

        backend
            .open(location, password.expose_secret())
            .with_context(|| format!("Unable to open container '{location}'"))?;

        let name = fingerprint(location)?;
        self.agent
            .set_password(&name, password.expose_secret())
            .await
            .context("Unable to set password in pwserv")?;
        info!(%name, "password cached");
        Ok(())
    }

    /// Drop the cached password of the container
    pub async fn forget(&self, location: &str) -> Result<()> {
        let name = fingerprint(location)?;
        self.agent
            .reset_password(&name)
            .await
            .context("Unable to reset password in pwserv")?;
        info!(%name, "password removed from cache");
        Ok(())
    }

    /// Store remote storage credentials in the obfuscation record
    pub fn obfuscate(&self, obfuscator: &Obfuscator, user: &str, out: &mut impl Write) -> Result<()> {
        let password = password::get_new_password(self.ask)?;
        obfuscator.obfuscate(user, password.expose_secret())?;

        writeln!(out, "Credentials written to {}", obfuscator.config_path().display())?;
        Ok(())
    }
}

/// Names of the environment variables pwman reads
pub fn variables(out: &mut impl Write) -> Result<()> {
    writeln!(out, "{CONTAINER_ENV_VAR}")?;
    writeln!(out, "{CIPHER_ENV_VAR}")?;
    writeln!(out, "{OBFUSCATION_ENV_VAR}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwman_agent::CredentialCache;

    fn typed_secret(_: &str) -> io::Result<String> {
        Ok("secret".to_string())
    }

    fn typed_wrong(_: &str) -> io::Result<String> {
        Ok("wrong".to_string())
    }

    fn no_terminal(_: &str) -> io::Result<String> {
        Err(io::Error::new(io::ErrorKind::Other, "no terminal"))
    }

    fn session(cache: &Arc<CredentialCache>, ask: Prompt) -> Session {
        let agent: Arc<dyn PasswordStore> = cache.clone();
        Session::new(CipherSuite::default(), agent).with_prompt(ask)
    }

    fn location(dir: &tempfile::TempDir) -> String {
        dir.path().join("safe.enc").to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_container_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let safe = location(&dir);
        let value_file = dir.path().join("value.txt");
        std::fs::write(&value_file, "hunter2").unwrap();

        let cache = Arc::new(CredentialCache::new());
        let session = session(&cache, typed_secret);
        session.init(&safe, KdfId::Sha256Double).unwrap();
        assert!(session.init(&safe, KdfId::Sha256Double).is_err());

        let mut out = Vec::new();
        session.put(&safe, "mail", &value_file, &mut out).await.unwrap();
        session.put(&safe, "mail", &value_file, &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Entry added\nEntry replaced\n");

        session.rename(&safe, "mail", "email").await.unwrap();

        let mut out = Vec::new();
        session.get(&safe, "email", &mut out).await.unwrap();
        assert_eq!(out, b"hunter2\n");

        session.delete(&safe, "email").await.unwrap();
        assert!(session.delete(&safe, "email").await.is_err());

        let mut out = Vec::new();
        session.list(&safe, &mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_password_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let safe = location(&dir);
        let cache = Arc::new(CredentialCache::new());
        session(&cache, typed_secret).init(&safe, KdfId::Sha256Double).unwrap();

        let mut out = Vec::new();
        assert!(session(&cache, typed_wrong).list(&safe, &mut out).await.is_err());
    }

    #[tokio::test]
    async fn test_remember_verifies_then_caches() {
        let dir = tempfile::tempdir().unwrap();
        let safe = location(&dir);
        let cache = Arc::new(CredentialCache::new());
        session(&cache, typed_secret).init(&safe, KdfId::Sha256Double).unwrap();

        assert!(session(&cache, typed_wrong).remember(&safe).await.is_err());
        assert!(cache.is_empty());

        session(&cache, typed_secret).remember(&safe).await.unwrap();
        assert_eq!(cache.get(&fingerprint(&safe).unwrap()).unwrap(), "secret");

        // Cached password is used without prompting
        let mut out = Vec::new();
        session(&cache, no_terminal).list(&safe, &mut out).await.unwrap();

        session(&cache, no_terminal).forget(&safe).await.unwrap();
        assert!(cache.is_empty());
        assert!(session(&cache, no_terminal).list(&safe, &mut out).await.is_err());
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt_file() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.txt");
        let sealed = dir.path().join("plain.enc");
        let restored = dir.path().join("restored.txt");
        std::fs::write(&plain, b"Dies ist ein toller Klartext").unwrap();

        let cache = Arc::new(CredentialCache::new());
        let session = session(&cache, typed_secret);
        let mut out = Vec::new();

        session
            .encrypt(&plain, Some(&sealed), KdfId::Sha256Double, &mut out)
            .unwrap();
        session.decrypt(&sealed, Some(&restored), &mut out).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(std::fs::read(&restored).unwrap(), b"Dies ist ein toller Klartext");

        session.decrypt(&sealed, None, &mut out).await.unwrap();
        assert_eq!(out, b"Dies ist ein toller Klartext");
    }

    #[test]
    fn test_variables() {
        let mut out = Vec::new();
        variables(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "PWMANFILE\nPWMAN_CIPHER\nRUSTPWMAN_OBFUSCATION\n"
        );
    }

    #[test]
    fn test_obfuscate_writes_record() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join(".rustpwman");
        let env_var = "PWMAN_CLI_TEST_OBFUSCATION";
        std::env::set_var(env_var, "cli-test-secret");

        let obfuscator = Obfuscator::new(env_var, &record).unwrap();
        let cache = Arc::new(CredentialCache::new());
        let mut out = Vec::new();
        session(&cache, typed_secret)
            .obfuscate(&obfuscator, "dav-user", &mut out)
            .unwrap();

        let (user, password) = obfuscator.deobfuscate().unwrap();
        assert_eq!(user, "dav-user");
        assert_eq!(password, "secret");
    }
}
