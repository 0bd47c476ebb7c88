//! Cache keys for container locations
//!
//! The agent only ever sees `PWMAN:<hex md5>` of the container's absolute
//! path (or its URL for remote containers), never the location itself.

use std::io;
use std::path::{Component, Path, PathBuf};

use md5::{Digest, Md5};

const FINGERPRINT_PREFIX: &str = "PWMAN:";
const REMOTE_PREFIX: &str = "https://";

pub fn is_remote(location: &str) -> bool {
    location.starts_with(REMOTE_PREFIX)
}

/// Absolute, lexically cleaned path for local locations, the literal URL for
/// remote ones
pub fn canonical_location(location: &str) -> io::Result<String> {
    if is_remote(location) {
        return Ok(location.to_string());
    }

    let absolute = std::path::absolute(Path::new(location))?;
    Ok(clean(&absolute).to_string_lossy().into_owned())
}

/// Drop `.` and resolve `..` against the preceding component without
/// touching the filesystem. `..` never climbs above the root.
fn clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(cleaned.components().next_back(), Some(Component::Normal(_))) {
                    cleaned.pop();
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

/// `"PWMAN:" + hex(MD5(canonical location))`
pub fn fingerprint(location: &str) -> io::Result<String> {
    let canonical = canonical_location(location)?;
    Ok(fingerprint_canonical(&canonical))
}

pub fn fingerprint_canonical(canonical: &str) -> String {
    let digest = Md5::digest(canonical.as_bytes());
    format!("{FINGERPRINT_PREFIX}{}", hex::encode(digest))
}
