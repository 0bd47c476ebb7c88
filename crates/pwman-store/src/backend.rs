//! Where sealed containers live

use std::io::Write;
use std::path::Path;

use pwman_crypto::{Codec, KdfId};
use tracing::debug;

use crate::jots::Jots;
use crate::{Result, StoreError};

const REMOTE_PREFIX: &str = "https://";

/// Load and save sealed containers at some kind of location
pub trait ContainerBackend {
    fn exists(&self, location: &str) -> Result<bool>;

    /// Fetch, decrypt and parse the container at `location`
    fn open(&self, location: &str, password: &str) -> Result<Jots>;

    /// Seal `jots` with the KDF it carries and store it at `location`
    fn close(&self, location: &str, password: &str, jots: &Jots) -> Result<()>;

    /// A new, empty container
    fn init(&self, kdf: KdfId) -> Jots {
        Jots::empty(kdf)
    }

    /// The sealed bytes as stored, without decrypting them
    fn raw_data(&self, location: &str) -> Result<Vec<u8>>;
}

/// Pick the backend for a location. Remote locations are recognised but
/// have no backend.
pub fn backend_for(location: &str, codec: Codec) -> Result<Box<dyn ContainerBackend>> {
    if location.starts_with(REMOTE_PREFIX) {
        return Err(StoreError::Unsupported(location.to_string()));
    }
    Ok(Box::new(FileBackend::new(codec)))
}

/// Containers stored as local files
pub struct FileBackend {
    codec: Codec,
}

impl FileBackend {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }
}

impl ContainerBackend for FileBackend {
    fn exists(&self, location: &str) -> Result<bool> {
        Path::new(location)
            .try_exists()
            .map_err(|e| StoreError::io(location, e))
    }

    fn open(&self, location: &str, password: &str) -> Result<Jots> {
        let sealed = self.raw_data(location)?;
        let (plaintext, kdf) = self.codec.decrypt(password.as_bytes(), &sealed)?;

        let jots = Jots::from_json(&plaintext, kdf)?;
        debug!(location, kdf = %kdf, entries = jots.len(), "container opened");
        Ok(jots)
    }

    fn close(&self, location: &str, password: &str, jots: &Jots) -> Result<()> {
        let plaintext = jots.to_json()?;
        let sealed = self.codec.encrypt(password.as_bytes(), &plaintext, jots.kdf())?;

        write_private(Path::new(location), &sealed)?;
        debug!(location, kdf = %jots.kdf(), entries = jots.len(), "container saved");
        Ok(())
    }

    fn raw_data(&self, location: &str) -> Result<Vec<u8>> {
        std::fs::read(location).map_err(|e| StoreError::io(location, e))
    }
}

/// Replace `path` with `data`, readable and writable by the owner only.
///
/// The data goes to a temporary file next to `path` first, so a failed write
/// never leaves a truncated file behind.
pub fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let display = path.display().to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(&display, e))?;
    tmp.write_all(data).map_err(|e| StoreError::io(&display, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(&display, e))?;

    tmp.persist(path).map_err(|e| StoreError::io(&display, e.error))?;
    Ok(())
}
