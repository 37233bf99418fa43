//! CLI for the aprov binary provisioner.

mod commands;

use anyhow::Result;
use aprov_core::arch::Arch;
use aprov_core::config::{self, ProvisionConfig, SourceMode};
use aprov_core::local_props;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use commands::{run_checksum, run_inspect, run_provision, run_verify};

/// Top-level CLI for aprov.
#[derive(Debug, Parser)]
#[command(name = "aprov")]
#[command(about = "aprov: fetch, verify and place per-ABI native tool binaries", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/aprov/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log to stderr instead of the state log file.
    #[arg(long, global = true)]
    pub log_stderr: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download (or copy) and verify the binary for every ABI.
    Provision {
        /// Output root; binaries land at <DIR>/<abi>/<binary>.
        #[arg(long, short, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Release version to download (overrides `version` in the config).
        #[arg(long, value_name = "VERSION")]
        release: Option<String>,
        /// Use locally supplied binaries instead of downloading.
        #[arg(long)]
        local: bool,
        /// Properties file that can switch on local mode (default: ./fdroid.properties).
        #[arg(long, value_name = "PATH")]
        props: Option<PathBuf>,
        /// Provision ABIs concurrently.
        #[arg(long)]
        parallel: bool,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Re-check an existing output tree without fetching.
    Verify {
        #[arg(long, short, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Properties file that can switch on local mode (default: ./fdroid.properties).
        #[arg(long, value_name = "PATH")]
        props: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },

    /// Print the ABI an ELF binary targets.
    Inspect {
        /// Path to the binary.
        path: PathBuf,
        /// Fail unless the binary targets this ABI (e.g. arm64-v8a).
        #[arg(long, value_name = "ABI", value_parser = parse_abi)]
        expect: Option<Arch>,
    },

    /// Compute SHA-256 of a file.
    Checksum {
        /// Path to the file.
        path: PathBuf,
        /// Fail unless the digest equals this hex value.
        #[arg(long, value_name = "SHA256")]
        expect: Option<String>,
    },
}

fn parse_abi(s: &str) -> Result<Arch, String> {
    Arch::from_abi_name(s).ok_or_else(|| {
        let known: Vec<&str> = Arch::ALL.iter().map(|a| a.abi_name()).collect();
        format!("unknown ABI {:?} (expected one of {})", s, known.join(", "))
    })
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            CliCommand::Provision {
                output,
                release,
                local,
                props,
                parallel,
                json,
            } => {
                let mut cfg = load_config(self.config.as_deref(), props.as_deref())?;
                if let Some(output) = output {
                    cfg.output_root = output;
                }
                if let Some(release) = release {
                    cfg.version = release;
                }
                if local {
                    cfg.mode = SourceMode::Local;
                }
                cfg.parallel |= parallel;
                tracing::debug!("effective config: {:?}", cfg);
                run_provision(cfg, json).await?;
            }
            CliCommand::Verify {
                output,
                props,
                json,
            } => {
                let mut cfg = load_config(self.config.as_deref(), props.as_deref())?;
                if let Some(output) = output {
                    cfg.output_root = output;
                }
                run_verify(&cfg, json)?;
            }
            CliCommand::Inspect { path, expect } => run_inspect(&path, expect)?,
            CliCommand::Checksum { path, expect } => run_checksum(&path, expect.as_deref())?,
        }
        Ok(())
    }
}

/// Config file (explicit or XDG default) with the local-build properties overlay applied.
fn load_config(path: Option<&Path>, props: Option<&Path>) -> Result<ProvisionConfig> {
    let mut cfg = match path {
        Some(p) => config::load_from_path(p)?,
        None => config::load_or_init()?,
    };
    let props = props.unwrap_or(Path::new(local_props::PROPS_FILE_NAME));
    local_props::load_and_apply(&mut cfg, props)?;
    tracing::debug!("loaded config: {:?}", cfg);
    Ok(cfg)
}
