//! Supported target architectures and their per-ABI metadata.
//!
//! Every piece of ABI-specific data (directory name, ELF machine code,
//! pinned checksum) comes from a `match` on [`Arch`], so adding a variant
//! forces every table to be updated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// File name of the provisioned binary inside each ABI directory.
pub const DEFAULT_BINARY_NAME: &str = "libaapt2.so";

/// Target CPU architecture of a provisioned binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "armeabi-v7a")]
    Arm,
    #[serde(rename = "arm64-v8a")]
    Arm64,
    #[serde(rename = "x86_64")]
    X86_64,
}

impl Arch {
    /// All supported architectures, in the order they are provisioned.
    pub const ALL: [Arch; 3] = [Arch::Arm64, Arch::Arm, Arch::X86_64];

    /// Android ABI directory name (`arm64-v8a`, ...). Also used in download URLs.
    pub fn abi_name(self) -> &'static str {
        match self {
            Arch::Arm => "armeabi-v7a",
            Arch::Arm64 => "arm64-v8a",
            Arch::X86_64 => "x86_64",
        }
    }

    /// `e_machine` value an ELF binary for this architecture carries.
    pub fn elf_machine(self) -> u16 {
        match self {
            Arch::Arm => 0x28,
            Arch::Arm64 => 0xB7,
            Arch::X86_64 => 0x3E,
        }
    }

    /// SHA-256 of the published AAPT2 build for this architecture.
    pub fn default_sha256(self) -> &'static str {
        match self {
            Arch::Arm => "ba3413c680933dffd3c3d35da8d450c474ff5ccab95c4b9db28841c53b7a3cdf",
            Arch::Arm64 => "be2cea61814678f7a9e61bf818a6666e6097a7d67d6c19498a4d7aa690bc4151",
            Arch::X86_64 => "4861171c1efcffe41f4466937e6a392b243ffb014813b4e60f0b77bb46ab254d",
        }
    }

    pub fn from_abi_name(name: &str) -> Option<Arch> {
        match name.trim() {
            "armeabi-v7a" => Some(Arch::Arm),
            "arm64-v8a" => Some(Arch::Arm64),
            "x86_64" => Some(Arch::X86_64),
            _ => None,
        }
    }

    pub fn from_elf_machine(machine: u16) -> Option<Arch> {
        Arch::ALL.into_iter().find(|a| a.elf_machine() == machine)
    }

    /// Path of the binary relative to the output root: `<abi>/<binary_name>`.
    pub fn relative_path(self, binary_name: &str) -> PathBuf {
        PathBuf::from(self.abi_name()).join(binary_name)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.abi_name())
    }
}
