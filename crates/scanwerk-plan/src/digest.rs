// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plan fingerprints: SHA-256 of the project file bytes.

use std::path::Path;

use scanwerk_core::error::Result;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
///
/// Run reports carry the fingerprint of the plan they started from, and the
/// workflow compares fingerprints around interactive review.
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Fingerprint a file on disk.
pub fn fingerprint_file(path: impl AsRef<Path>) -> Result<String> {
    let bytes = std::fs::read(path.as_ref())?;
    Ok(fingerprint(&bytes))
}
