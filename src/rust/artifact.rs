use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Leading bytes of every artifact.
pub const MAGIC: &[u8; 8] = b"TRIAGEMD";
/// Layout version of the envelope and payload encoding.
pub const FORMAT_VERSION: u16 = 1;
/// File name used when only a directory is configured.
pub const DEFAULT_ARTIFACT_NAME: &str = "classifier.bin";

const HEADER_LEN: usize = MAGIC.len() + 2 + 32;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),
    #[error("Not a classifier artifact")]
    BadMagic,
    #[error("Artifact is truncated ({0} bytes)")]
    Truncated(usize),
    #[error("Unsupported artifact format version {found}, expected {expected}")]
    UnsupportedVersion { expected: u16, found: u16 },
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("Artifact was built with {component} version {found}, this build uses {expected}")]
    IncompatibleComponent {
        component: &'static str,
        expected: u32,
        found: u32,
    },
}

/// Hex SHA-256 of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Wraps a payload as `magic | version (u16 LE) | sha256(payload) | payload`.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&Sha256::digest(payload));
    bytes.extend_from_slice(payload);
    bytes
}

/// Checks the envelope and returns the payload it carries.
pub fn decode(bytes: &[u8]) -> Result<&[u8], ArtifactError> {
    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err(ArtifactError::BadMagic);
    }
    if bytes.len() < HEADER_LEN {
        return Err(ArtifactError::Truncated(bytes.len()));
    }
    let version = u16::from_le_bytes([bytes[MAGIC.len()], bytes[MAGIC.len() + 1]]);
    if version != FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            expected: FORMAT_VERSION,
            found: version,
        });
    }
    let stored = &bytes[MAGIC.len() + 2..HEADER_LEN];
    let payload = &bytes[HEADER_LEN..];
    let actual = Sha256::digest(payload);
    if stored != actual.as_slice() {
        return Err(ArtifactError::HashMismatch {
            expected: hex(stored),
            actual: hex(&actual),
        });
    }
    Ok(payload)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Replaces `path` with `bytes` via a sibling temp file and a rename, so
/// readers see either the old artifact or the new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    log::debug!("Writing {} bytes to {:?}", bytes.len(), tmp_path);
    if let Err(e) = fs::write(&tmp_path, bytes).and_then(|()| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    log::info!("Artifact written to {:?} (sha256 {})", path, checksum(bytes));
    Ok(())
}

/// Reads an artifact file and returns its verified payload.
pub fn read_verified(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    log::info!("Reading artifact {:?}", path);
    let bytes = fs::read(path)?;
    let payload = decode(&bytes)?;
    Ok(payload.to_vec())
}

/// Returns the default artifact directory
pub fn default_dir() -> PathBuf {
    // 1. Check environment variable
    if let Ok(path) = env::var("TRIAGE_HOME") {
        return PathBuf::from(path).join("models");
    }

    // 2. Use platform-specific cache directory
    if let Some(cache_dir) = dirs::cache_dir() {
        return cache_dir.join("triage").join("models");
    }

    // 3. Fallback to user's home directory
    if let Some(home_dir) = dirs::home_dir() {
        return home_dir.join(".cache").join("triage").join("models");
    }

    // 4. Last resort
    env::temp_dir().join("triage").join("models")
}

/// Default location of the trained classifier.
pub fn default_artifact_path() -> PathBuf {
    default_dir().join(DEFAULT_ARTIFACT_NAME)
}
