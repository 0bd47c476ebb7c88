//! pwman Store - encrypted key/value containers
//!
//! A container is a flat map from entry names to free text, serialized as a
//! JSON list of `{Key, Text}` objects and sealed in an envelope. Backends
//! know where the sealed bytes live; [`Jots`] only knows the entries.

pub mod backend;
pub mod jots;

pub use backend::{backend_for, write_private, ContainerBackend, FileBackend};
pub use jots::{Jots, JotsEntry};

use pwman_crypto::CryptoError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Key '{0}' not found")]
    KeyNotFound(String),

    #[error("Key '{0}' already exists")]
    KeyExists(String),

    #[error("Unable to parse container contents: {0}")]
    Format(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Unable to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote container '{0}' is not supported")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
