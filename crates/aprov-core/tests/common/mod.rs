#![allow(dead_code)]

pub mod release_server;

use aprov_core::arch::Arch;
use aprov_core::elf::{E_MACHINE_OFFSET, ELF_MAGIC};
use sha2::{Digest, Sha256};

/// A small ELF64 shared-object look-alike for `arch`. `seed` varies the payload.
pub fn fake_elf(arch: Arch, seed: u8) -> Vec<u8> {
    let mut b: Vec<u8> = (0..4096u32).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect();
    b[..4].copy_from_slice(&ELF_MAGIC);
    b[4] = 2; // ELFCLASS64
    b[5] = 1; // little endian
    b[6] = 1; // EV_CURRENT
    b[16..18].copy_from_slice(&3u16.to_le_bytes()); // ET_DYN
    b[E_MACHINE_OFFSET..E_MACHINE_OFFSET + 2].copy_from_slice(&arch.elf_machine().to_le_bytes());
    b
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
