//! Where container passwords come from
//!
//! The agent is asked first. Whatever goes wrong there (no agent running,
//! broken transport, nothing cached) silently falls back to an interactive
//! prompt. A password typed at the prompt is never pushed to the agent;
//! only `pwman pwd` does that after verifying it.

use std::io;

use anyhow::bail;
use pwman_agent::{fingerprint, PasswordStore};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

pub const ENTER_PASSWORD: &str = "Please enter password: ";
pub const ENTER_NEW_PASSWORD: &str = "Please enter new password: ";
pub const REENTER_PASSWORD: &str = "Please reenter password: ";

/// Echo-free terminal prompt
pub fn prompt(text: &str) -> io::Result<String> {
    rpassword::prompt_password(text)
}

/// Password for the container at `location`, from `store` if it has a
/// non-empty one cached, from `ask` otherwise
pub async fn get_password<S, F>(store: &S, location: &str, ask: F) -> io::Result<SecretString>
where
    S: PasswordStore + ?Sized,
    F: FnOnce() -> io::Result<String>,
{
    match fingerprint(location) {
        Ok(name) => match store.get_password(&name).await {
            Ok(password) if !password.is_empty() => {
                debug!(%name, "using cached password");
                return Ok(SecretString::new(password));
            }
            Ok(_) => debug!(%name, "agent returned an empty password"),
            Err(e) => debug!(%name, error = %e, "agent lookup failed"),
        },
        Err(e) => debug!(location, error = %e, "unable to fingerprint location"),
    }

    ask().map(SecretString::new)
}

/// Ask twice through `ask` and insist on the same answer
pub fn get_new_password<F>(mut ask: F) -> anyhow::Result<SecretString>
where
    F: FnMut(&str) -> io::Result<String>,
{
    let first = SecretString::new(ask(ENTER_NEW_PASSWORD)?);
    let second = SecretString::new(ask(REENTER_PASSWORD)?);

    if first.expose_secret() != second.expose_secret() {
        bail!("Passwords not equal");
    }
    Ok(first)
}
