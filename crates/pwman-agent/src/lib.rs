//! pwman Agent - in-memory credential cache
//!
//! A long running local process keeps container passwords in memory so that
//! repeated operations on the same container do not prompt every time.
//! Clients talk to it over a local transport using a 2 byte length prefixed
//! JSON protocol, one request per connection.

pub mod cache;
pub mod client;
pub mod fingerprint;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use cache::{CredentialCache, PasswordStore};
pub use client::AgentClient;
pub use fingerprint::fingerprint;
pub use protocol::{Command, Request, Response};
pub use server::{Agent, ServeMode};
pub use shutdown::install_signal_handler;
pub use transport::{Endpoint, DEFAULT_TCP_PORT};

/// Errors raised by the agent, its client and the wire protocol
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("No password cached for '{0}'")]
    KeyNotFound(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Agent returned error {code}: {data}")]
    Rejected { code: i32, data: String },

    #[error("Credential cache lock poisoned")]
    CachePoisoned,

    #[error("Unable to determine current user")]
    UsernameUnavailable,

    #[error("Unable to determine home directory")]
    HomeDirUnavailable,
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_message_carries_data() {
        let err = AgentError::Rejected {
            code: protocol::RESULT_ERROR,
            data: "no such entry".to_string(),
        };
        assert_eq!(err.to_string(), "Agent returned error 1: no such entry");
    }
}
