//! Content-addressed local blob store.
//!
//! Uploaded files land under `<root>/blobs/<sha256>` and are referenced by a
//! `blob://<sha256>` URL. The registry never interprets blob contents; the
//! hash exists so document rows can be verified against the bytes on disk.

use crate::core::error::RegistryError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const BLOB_URL_SCHEME: &str = "blob://";

pub fn blobs_dir(root: &Path) -> PathBuf {
    root.join("blobs")
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Copy a local file into the blob directory and return `(url, size_bytes)`.
pub fn store_file(root: &Path, source: &Path) -> Result<(String, i64), RegistryError> {
    let bytes = fs::read(source).map_err(RegistryError::Io)?;
    let digest = hash_bytes(&bytes);
    let dir = blobs_dir(root);
    fs::create_dir_all(&dir).map_err(RegistryError::Io)?;
    let target = dir.join(&digest);
    if !target.exists() {
        fs::write(&target, &bytes).map_err(RegistryError::Io)?;
    }
    Ok((format!("{}{}", BLOB_URL_SCHEME, digest), bytes.len() as i64))
}

/// Re-hash a stored blob and compare against the URL it was filed under.
pub fn verify_blob(root: &Path, url: &str) -> Result<bool, RegistryError> {
    let Some(digest) = url.strip_prefix(BLOB_URL_SCHEME) else {
        // External URLs are opaque to the registry.
        return Ok(true);
    };
    let path = blobs_dir(root).join(digest);
    if !path.exists() {
        return Ok(false);
    }
    let bytes = fs::read(&path).map_err(RegistryError::Io)?;
    Ok(hash_bytes(&bytes) == digest)
}
