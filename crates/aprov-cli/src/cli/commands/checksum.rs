//! `aprov checksum` – compute (and optionally check) SHA-256 of a file.

use anyhow::Result;
use aprov_core::checksum::{self, VerifyOutcome};
use std::path::Path;

pub fn run_checksum(path: &Path, expect: Option<&str>) -> Result<()> {
    match expect {
        None => {
            let digest = checksum::sha256_path(path)?;
            println!("{}  {}", digest, path.display());
        }
        Some(expected) => match checksum::verify_sha256(path, expected)? {
            VerifyOutcome::Match(digest) => println!("{}  {}: OK", digest, path.display()),
            VerifyOutcome::Mismatch(m) => anyhow::bail!("{}: {}", path.display(), m),
        },
    }
    Ok(())
}
