//! Content digests for change detection.
//!
//! A file is re-indexed only when the SHA-256 of its bytes differs from the
//! digest recorded on its [`IndexedFile`] row.

use sha2::{Digest, Sha256};

use crate::models::IndexedFile;

/// Lowercase hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// True when there is no record for the file, or its digest differs.
pub fn needs_reindex(existing: Option<&IndexedFile>, new_digest: &str) -> bool {
    match existing {
        Some(file) => file.content_digest != new_digest,
        None => true,
    }
}
