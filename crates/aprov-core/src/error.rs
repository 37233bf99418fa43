//! Failure taxonomy for a provisioning run.

use crate::arch::Arch;
use crate::elf::ElfError;
use std::io;
use thiserror::Error;

/// A failed provisioning step. Every variant names the ABI slot it happened in.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Remote fetch failed or the local source file is missing/unset.
    #[error("{arch}: source unavailable: {reason}")]
    SourceUnavailable { arch: Arch, reason: String },

    #[error("{arch}: checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        arch: Arch,
        expected: String,
        actual: String,
    },

    #[error("{arch}: invalid binary: {source}")]
    FormatInvalid {
        arch: Arch,
        #[source]
        source: ElfError,
    },

    /// The binary is a valid ELF file but targets another architecture.
    #[error("{slot}: architecture mismatch: binary targets {found}")]
    ArchMismatch { slot: Arch, found: Arch },

    #[error("{arch}: aborted")]
    Aborted { arch: Arch },

    #[error("{arch}: {context}: {source}")]
    Io {
        arch: Arch,
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    pub fn arch(&self) -> Arch {
        match self {
            ProvisionError::SourceUnavailable { arch, .. }
            | ProvisionError::ChecksumMismatch { arch, .. }
            | ProvisionError::FormatInvalid { arch, .. }
            | ProvisionError::Aborted { arch }
            | ProvisionError::Io { arch, .. } => *arch,
            ProvisionError::ArchMismatch { slot, .. } => *slot,
        }
    }

    pub(crate) fn io(arch: Arch, context: impl Into<String>, source: io::Error) -> Self {
        ProvisionError::Io {
            arch,
            context: context.into(),
            source,
        }
    }
}
