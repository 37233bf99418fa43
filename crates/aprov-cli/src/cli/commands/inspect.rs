//! `aprov inspect` – report the ABI an ELF binary targets.

use anyhow::{Context, Result};
use aprov_core::arch::Arch;
use aprov_core::elf;
use std::path::Path;

pub fn run_inspect(path: &Path, expect: Option<Arch>) -> Result<()> {
    let arch = elf::detect_arch(path).with_context(|| format!("inspect {}", path.display()))?;
    println!(
        "{}: {} (e_machine 0x{:x})",
        path.display(),
        arch,
        arch.elf_machine()
    );
    if let Some(expected) = expect {
        if arch != expected {
            anyhow::bail!("{} targets {}, expected {}", path.display(), arch, expected);
        }
    }
    Ok(())
}
