//! Minimal ELF header inspection.
//!
//! Only the identification bytes and `e_machine` are read; the rest of the
//! file is never touched.

use crate::arch::Arch;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// Byte offset of `e_machine` (same for ELF32 and ELF64).
pub const E_MACHINE_OFFSET: usize = 18;

/// Bytes needed to read through `e_machine`.
pub const HEADER_PREFIX_LEN: usize = E_MACHINE_OFFSET + 2;

#[derive(Debug, Error)]
pub enum ElfError {
    #[error("not an ELF file (magic {0:02x?})")]
    NotElf([u8; 4]),
    #[error("file too short for an ELF header ({0} bytes)")]
    Truncated(usize),
    #[error("unsupported ELF machine type 0x{0:x}")]
    UnsupportedMachine(u16),
    #[error("read ELF header: {0}")]
    Io(#[from] io::Error),
}

/// Parse the `e_machine` field out of an in-memory header prefix.
pub fn parse_machine(header: &[u8]) -> Result<u16, ElfError> {
    if header.len() < 4 {
        return Err(ElfError::Truncated(header.len()));
    }
    let magic = [header[0], header[1], header[2], header[3]];
    if magic != ELF_MAGIC {
        return Err(ElfError::NotElf(magic));
    }
    if header.len() < HEADER_PREFIX_LEN {
        return Err(ElfError::Truncated(header.len()));
    }
    Ok(u16::from_le_bytes([
        header[E_MACHINE_OFFSET],
        header[E_MACHINE_OFFSET + 1],
    ]))
}

/// Read the header prefix of `path` and return the raw `e_machine` value.
pub fn read_machine(path: &Path) -> Result<u16, ElfError> {
    let f = File::open(path)?;
    let mut header = Vec::with_capacity(HEADER_PREFIX_LEN);
    f.take(HEADER_PREFIX_LEN as u64).read_to_end(&mut header)?;
    parse_machine(&header)
}

/// Detect which supported architecture the ELF binary at `path` targets.
pub fn detect_arch(path: &Path) -> Result<Arch, ElfError> {
    let machine = read_machine(path)?;
    Arch::from_elf_machine(machine).ok_or(ElfError::UnsupportedMachine(machine))
}
