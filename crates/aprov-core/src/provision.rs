//! Per-architecture provisioning pipeline.
//!
//! For every selected ABI: resolve the source, reset the ABI output
//! directory, fetch or copy into a `.part` staging file, run the checksum
//! and ELF gates, then rename into place. The final path only ever holds a
//! binary that passed every gate. The first failing ABI fails the run.

use crate::arch::Arch;
use crate::checksum::{self, VerifyOutcome};
use crate::config::{ProvisionConfig, SourceMode};
use crate::control::AbortToken;
use crate::elf;
use crate::error::ProvisionError;
use crate::fetch::{self, FetchError};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A binary that passed every gate and sits at its final path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedArtifact {
    pub arch: Arch,
    pub path: PathBuf,
    pub sha256: String,
}

enum Source {
    Remote(String),
    Local(PathBuf),
}

pub struct Provisioner {
    config: ProvisionConfig,
    abort: AbortToken,
}

impl Provisioner {
    /// The configuration (including the source mode) is fixed for the lifetime of the provisioner.
    pub fn new(config: ProvisionConfig, abort: AbortToken) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self { config, abort })
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Provision every selected ABI. Returns artifacts in canonical ABI order.
    pub fn run(&self) -> Result<Vec<ProvisionedArtifact>, ProvisionError> {
        let arches = self.config.selected_arches();
        tracing::info!(
            mode = ?self.config.mode,
            version = %self.config.version,
            output = %self.config.output_root.display(),
            "provisioning {} ABI(s)",
            arches.len()
        );
        let artifacts = if self.config.parallel && arches.len() > 1 {
            self.run_parallel(&arches)?
        } else {
            arches
                .iter()
                .map(|&arch| self.provision_arch(arch, &self.abort))
                .collect::<Result<Vec<_>, _>>()?
        };
        tracing::info!("provisioned {} binar(y/ies)", artifacts.len());
        Ok(artifacts)
    }

    /// One thread per ABI. A failure aborts the siblings through a child token
    /// so the caller's token is left as it was.
    fn run_parallel(&self, arches: &[Arch]) -> Result<Vec<ProvisionedArtifact>, ProvisionError> {
        let siblings = self.abort.child();
        let results: Vec<Result<ProvisionedArtifact, ProvisionError>> = std::thread::scope(|s| {
            let handles: Vec<_> = arches
                .iter()
                .map(|&arch| {
                    let token = siblings.clone();
                    s.spawn(move || {
                        let r = self.provision_arch(arch, &token);
                        if r.is_err() {
                            token.request_abort();
                        }
                        r
                    })
                })
                .collect();
            handles
                .into_iter()
                .zip(arches)
                .map(|(h, &arch)| {
                    h.join().unwrap_or_else(|_| {
                        Err(ProvisionError::io(
                            arch,
                            "worker thread",
                            io::Error::new(io::ErrorKind::Other, "panicked"),
                        ))
                    })
                })
                .collect()
        });

        let mut artifacts = Vec::with_capacity(results.len());
        let mut first_aborted = None;
        let mut first_failure = None;
        for r in results {
            match r {
                Ok(a) => artifacts.push(a),
                Err(e @ ProvisionError::Aborted { .. }) => {
                    first_aborted.get_or_insert(e);
                }
                Err(e) => {
                    first_failure.get_or_insert(e);
                }
            }
        }
        // Sibling aborts are a consequence of the real failure; report that one.
        match first_failure.or(first_aborted) {
            Some(e) => Err(e),
            None => Ok(artifacts),
        }
    }

    /// Run the full pipeline for a single ABI.
    pub fn provision_arch(
        &self,
        arch: Arch,
        abort: &AbortToken,
    ) -> Result<ProvisionedArtifact, ProvisionError> {
        check_abort(arch, abort)?;
        let source = self.resolve_source(arch)?;

        let final_path = self.config.final_path(arch);
        let dir = self.config.output_root.join(arch.abi_name());
        reset_dir(arch, &dir)?;

        let staging = dir.join(format!("{}.part", self.config.binary_name));
        let outcome = self
            .populate(arch, &source, &staging, abort)
            .and_then(|()| self.verify(arch, &staging))
            .and_then(|sha256| {
                check_abort(arch, abort)?;
                fs::rename(&staging, &final_path)
                    .map_err(|e| ProvisionError::io(arch, "move binary into place", e))?;
                Ok(sha256)
            });

        match outcome {
            Ok(sha256) => {
                tracing::info!(%arch, path = %final_path.display(), "binary verified and placed");
                Ok(ProvisionedArtifact {
                    arch,
                    path: final_path,
                    sha256,
                })
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&staging) {
                    if rm.kind() != io::ErrorKind::NotFound {
                        tracing::warn!("could not remove {}: {}", staging.display(), rm);
                    }
                }
                tracing::error!(%arch, "{}", e);
                Err(e)
            }
        }
    }

    fn resolve_source(&self, arch: Arch) -> Result<Source, ProvisionError> {
        match self.config.mode {
            SourceMode::Remote => self
                .config
                .download_url(arch)
                .map(Source::Remote)
                .map_err(|e| ProvisionError::SourceUnavailable {
                    arch,
                    reason: format!("{:#}", e),
                }),
            SourceMode::Local => {
                let path = self.config.local_source(arch).ok_or_else(|| {
                    ProvisionError::SourceUnavailable {
                        arch,
                        reason: "local mode is enabled but no binary path is configured".into(),
                    }
                })?;
                if !path.is_file() {
                    return Err(ProvisionError::SourceUnavailable {
                        arch,
                        reason: format!("{} does not exist or is not a file", path.display()),
                    });
                }
                // The ABI directory is cleared before copying; a source inside it would be lost.
                let abi_dir = self.config.output_root.join(arch.abi_name());
                if let (Ok(src), Ok(dir)) = (path.canonicalize(), abi_dir.canonicalize()) {
                    if src.starts_with(&dir) {
                        return Err(ProvisionError::SourceUnavailable {
                            arch,
                            reason: format!(
                                "{} is inside the output directory {}, which is cleared before copying",
                                path.display(),
                                abi_dir.display()
                            ),
                        });
                    }
                }
                Ok(Source::Local(path.to_path_buf()))
            }
        }
    }

    fn populate(
        &self,
        arch: Arch,
        source: &Source,
        staging: &Path,
        abort: &AbortToken,
    ) -> Result<(), ProvisionError> {
        match source {
            Source::Remote(url) => {
                tracing::info!(%arch, "downloading {}", url);
                fetch::fetch_to_path(url, staging, &self.config.fetch_options(), abort).map_err(
                    |e| match e {
                        FetchError::Aborted => ProvisionError::Aborted { arch },
                        other => ProvisionError::SourceUnavailable {
                            arch,
                            reason: format!("{}: {}", url, other),
                        },
                    },
                )?;
            }
            Source::Local(path) => {
                tracing::info!(%arch, "copying {} to {}", path.display(), staging.display());
                fs::copy(path, staging).map_err(|e| ProvisionError::SourceUnavailable {
                    arch,
                    reason: format!("copy {}: {}", path.display(), e),
                })?;
            }
        }
        check_abort(arch, abort)
    }

    /// Checksum gate (when enabled for the mode) then architecture gate.
    /// Returns the file's SHA-256.
    fn verify(&self, arch: Arch, path: &Path) -> Result<String, ProvisionError> {
        let sha256 = if self.checksum_required() {
            checked_sha256(arch, path, &self.config.expected_sha256(arch))?
        } else {
            checksum::sha256_path(path)
                .map_err(|e| ProvisionError::io(arch, "hash binary", into_io(e)))?
        };
        check_elf_arch(arch, path)?;
        Ok(sha256)
    }

    fn checksum_required(&self) -> bool {
        match self.config.mode {
            SourceMode::Remote => true,
            SourceMode::Local => self.config.verify_local_checksums,
        }
    }
}

/// Re-check an already provisioned output tree without fetching anything.
pub fn verify_tree(config: &ProvisionConfig) -> Result<Vec<ProvisionedArtifact>, ProvisionError> {
    let checksum_required = match config.mode {
        SourceMode::Remote => true,
        SourceMode::Local => config.verify_local_checksums,
    };
    config
        .selected_arches()
        .into_iter()
        .map(|arch| {
            let path = config.final_path(arch);
            if !path.is_file() {
                return Err(ProvisionError::SourceUnavailable {
                    arch,
                    reason: format!("{} is not provisioned", path.display()),
                });
            }
            let sha256 = if checksum_required {
                checked_sha256(arch, &path, &config.expected_sha256(arch))?
            } else {
                checksum::sha256_path(&path)
                    .map_err(|e| ProvisionError::io(arch, "hash binary", into_io(e)))?
            };
            check_elf_arch(arch, &path)?;
            Ok(ProvisionedArtifact { arch, path, sha256 })
        })
        .collect()
}

fn checked_sha256(arch: Arch, path: &Path, expected: &str) -> Result<String, ProvisionError> {
    match checksum::verify_sha256(path, expected)
        .map_err(|e| ProvisionError::io(arch, "hash binary", into_io(e)))?
    {
        VerifyOutcome::Match(actual) => Ok(actual),
        VerifyOutcome::Mismatch(m) => Err(ProvisionError::ChecksumMismatch {
            arch,
            expected: m.expected,
            actual: m.actual,
        }),
    }
}

fn check_elf_arch(slot: Arch, path: &Path) -> Result<(), ProvisionError> {
    let found =
        elf::detect_arch(path).map_err(|source| ProvisionError::FormatInvalid { arch: slot, source })?;
    if found != slot {
        return Err(ProvisionError::ArchMismatch { slot, found });
    }
    Ok(())
}

fn check_abort(arch: Arch, abort: &AbortToken) -> Result<(), ProvisionError> {
    abort.check().map_err(|_| ProvisionError::Aborted { arch })
}

/// Remove any previous output for the ABI and recreate the empty directory.
fn reset_dir(arch: Arch, dir: &Path) -> Result<(), ProvisionError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(ProvisionError::io(arch, format!("clear {}", dir.display()), e)),
    }
    fs::create_dir_all(dir)
        .map_err(|e| ProvisionError::io(arch, format!("create {}", dir.display()), e))
}

fn into_io(e: anyhow::Error) -> io::Error {
    e.downcast::<io::Error>()
        .unwrap_or_else(|e| io::Error::new(io::ErrorKind::Other, format!("{:#}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::{E_MACHINE_OFFSET, ELF_MAGIC};
    use std::collections::BTreeMap;

    fn fake_elf(arch: Arch, filler: u8) -> Vec<u8> {
        let mut b = vec![filler; 256];
        b[..4].copy_from_slice(&ELF_MAGIC);
        b[E_MACHINE_OFFSET..E_MACHINE_OFFSET + 2].copy_from_slice(&arch.elf_machine().to_le_bytes());
        b
    }

    fn local_config(root: &Path, files: &[(Arch, PathBuf)]) -> ProvisionConfig {
        let mut cfg = ProvisionConfig {
            output_root: root.join("out"),
            mode: SourceMode::Local,
            ..ProvisionConfig::default()
        };
        cfg.local.files = files
            .iter()
            .map(|(a, p)| (a.abi_name().to_string(), p.clone()))
            .collect::<BTreeMap<_, _>>();
        cfg
    }

    fn write_sources(root: &Path) -> Vec<(Arch, PathBuf)> {
        Arch::ALL
            .iter()
            .map(|&arch| {
                let p = root.join(format!("src-{}", arch.abi_name()));
                fs::write(&p, fake_elf(arch, arch.elf_machine() as u8)).unwrap();
                (arch, p)
            })
            .collect()
    }

    #[test]
    fn local_mode_places_every_arch() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = local_config(dir.path(), &write_sources(dir.path()));
        let p = Provisioner::new(cfg.clone(), AbortToken::new()).unwrap();
        let artifacts = p.run().unwrap();
        assert_eq!(artifacts.len(), 3);
        for a in &artifacts {
            assert_eq!(a.path, cfg.final_path(a.arch));
            assert_eq!(elf::detect_arch(&a.path).unwrap(), a.arch);
            assert_eq!(checksum::sha256_path(&a.path).unwrap(), a.sha256);
        }
    }

    #[test]
    fn stale_files_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = local_config(dir.path(), &write_sources(dir.path()));
        cfg.local.arches = vec![Arch::Arm];
        let stale = cfg.output_root.join("armeabi-v7a").join("old.so");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"old").unwrap();

        Provisioner::new(cfg.clone(), AbortToken::new()).unwrap().run().unwrap();
        assert!(!stale.exists());
        assert!(cfg.final_path(Arch::Arm).is_file());
    }

    #[test]
    fn unset_local_source_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = local_config(dir.path(), &[]);
        cfg.local.arches = vec![Arch::X86_64];
        let err = Provisioner::new(cfg, AbortToken::new()).unwrap().run().unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::SourceUnavailable { arch: Arch::X86_64, .. }
        ));
    }

    #[test]
    fn local_source_inside_output_dir_is_rejected_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let src = out.join("arm64-v8a").join("libaapt2.so");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        let body = fake_elf(Arch::Arm64, 7);
        fs::write(&src, &body).unwrap();

        let mut cfg = local_config(dir.path(), &[(Arch::Arm64, src.clone())]);
        cfg.local.arches = vec![Arch::Arm64];
        let err = Provisioner::new(cfg, AbortToken::new())
            .unwrap()
            .run()
            .unwrap_err();
        match err {
            ProvisionError::SourceUnavailable { arch, reason } => {
                assert_eq!(arch, Arch::Arm64);
                assert!(reason.contains("inside the output directory"), "reason: {}", reason);
            }
            other => panic!("expected SourceUnavailable, got {:?}", other),
        }
        assert_eq!(fs::read(&src).unwrap(), body);
    }

    #[test]
    fn local_checksum_gate_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = local_config(dir.path(), &write_sources(dir.path()));
        cfg.local.arches = vec![Arch::Arm64];

        // Pinned digest does not match the fake binary, but local mode skips it by default.
        Provisioner::new(cfg.clone(), AbortToken::new()).unwrap().run().unwrap();

        cfg.verify_local_checksums = true;
        let err = Provisioner::new(cfg.clone(), AbortToken::new())
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ChecksumMismatch { arch: Arch::Arm64, .. }));
        assert!(!cfg.final_path(Arch::Arm64).exists());
    }

    #[test]
    fn non_elf_local_binary_is_format_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("script.sh");
        fs::write(&src, b"#!/bin/sh\necho not a binary, just a script\n").unwrap();
        let mut cfg = local_config(dir.path(), &[(Arch::Arm, src)]);
        cfg.local.arches = vec![Arch::Arm];
        let err = Provisioner::new(cfg.clone(), AbortToken::new())
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::FormatInvalid {
                arch: Arch::Arm,
                source: elf::ElfError::NotElf(_)
            }
        ));
        let abi_dir = cfg.output_root.join("armeabi-v7a");
        assert_eq!(fs::read_dir(abi_dir).unwrap().count(), 0);
    }

    #[test]
    fn parallel_reports_real_failure_not_sibling_abort() {
        let dir = tempfile::tempdir().unwrap();
        let mut sources = write_sources(dir.path());
        // Put an ARM64 binary in the x86_64 slot.
        let wrong = dir.path().join("wrong.so");
        fs::write(&wrong, fake_elf(Arch::Arm64, 0)).unwrap();
        sources.retain(|(a, _)| *a != Arch::X86_64);
        sources.push((Arch::X86_64, wrong));

        let mut cfg = local_config(dir.path(), &sources);
        cfg.parallel = true;
        let abort = AbortToken::new();
        let err = Provisioner::new(cfg.clone(), abort.clone())
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::ArchMismatch {
                slot: Arch::X86_64,
                found: Arch::Arm64
            }
        ));
        assert!(!abort.is_aborted(), "caller token must not be tripped");
        assert!(!cfg.final_path(Arch::X86_64).exists());
    }

    #[test]
    fn verify_tree_checks_placed_binaries() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = local_config(dir.path(), &write_sources(dir.path()));
        Provisioner::new(cfg.clone(), AbortToken::new()).unwrap().run().unwrap();
        assert_eq!(verify_tree(&cfg).unwrap().len(), 3);

        fs::remove_file(cfg.final_path(Arch::Arm)).unwrap();
        assert!(matches!(
            verify_tree(&cfg).unwrap_err(),
            ProvisionError::SourceUnavailable { arch: Arch::Arm, .. }
        ));
    }
}
