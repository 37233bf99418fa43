//! SHA-256 integrity gate for provisioned binaries.
//!
//! Files are hashed in fixed-size chunks so large binaries never have to be
//! held in memory.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// Compute SHA-256 of a file and return the digest as lowercase hex.
pub fn sha256_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Digest of a file did not match the pinned value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for ChecksumMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checksum mismatch: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for ChecksumMismatch {}

/// Outcome of [`verify_sha256`]: I/O failures are reported separately from a mismatch.
#[derive(Debug)]
pub enum VerifyOutcome {
    Match(String),
    Mismatch(ChecksumMismatch),
}

/// Hash `path` and compare against `expected` (hex, case-insensitive, surrounding whitespace ignored).
/// Returns the actual digest on match.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<VerifyOutcome> {
    let expected = expected.trim().to_ascii_lowercase();
    let actual = sha256_path(path)?;
    if actual == expected {
        tracing::debug!(path = %path.display(), "checksum ok");
        Ok(VerifyOutcome::Match(actual))
    } else {
        Ok(VerifyOutcome::Mismatch(ChecksumMismatch { expected, actual }))
    }
}
