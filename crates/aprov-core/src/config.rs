use crate::arch::{Arch, DEFAULT_BINARY_NAME};
use crate::fetch::FetchOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_VERSION: &str = "34.0.4";
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://github.com/AndroidBuilderOfficial/platform-tools/releases/download/v{version}/aapt2-{arch}";

/// Where binaries come from for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Download from `url_template` and gate on pinned checksums.
    #[default]
    Remote,
    /// Copy pre-supplied files (reproducible / F-Droid style builds).
    Local,
}

/// Pre-supplied binaries for `SourceMode::Local`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalSources {
    /// ABIs to provision in local mode. Empty means all supported ABIs.
    #[serde(default)]
    pub arches: Vec<Arch>,
    /// ABI name (`arm64-v8a`, ...) -> path of the binary to copy.
    #[serde(default)]
    pub files: BTreeMap<String, PathBuf>,
}

/// Transfer limits (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub connect_timeout_secs: u64,
    pub total_timeout_secs: u64,
    /// Bytes per second under which a transfer counts as stalled.
    pub low_speed_limit: u32,
    pub low_speed_time_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let o = FetchOptions::default();
        Self {
            connect_timeout_secs: o.connect_timeout.as_secs(),
            total_timeout_secs: o.total_timeout.as_secs(),
            low_speed_limit: o.low_speed_limit,
            low_speed_time_secs: o.low_speed_time.as_secs(),
        }
    }
}

/// Provisioning configuration loaded from `~/.config/aprov/config.toml`.
/// Read once and handed to the orchestrator; nothing mutates it during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Release version substituted for `{version}` in `url_template`.
    pub version: String,
    /// Download URL with `{version}` and `{arch}` placeholders.
    pub url_template: String,
    /// Root of the output tree; binaries land at `<output_root>/<abi>/<binary_name>`.
    pub output_root: PathBuf,
    pub binary_name: String,
    #[serde(default)]
    pub mode: SourceMode,
    /// Per-ABI SHA-256 overrides; ABIs not listed use the pinned defaults.
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
    #[serde(default)]
    pub local: LocalSources,
    /// Also run the checksum gate on locally supplied binaries.
    #[serde(default)]
    pub verify_local_checksums: bool,
    /// Provision ABIs on separate threads.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub fetch: Option<FetchConfig>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            output_root: PathBuf::from("build/aapt2"),
            binary_name: DEFAULT_BINARY_NAME.to_string(),
            mode: SourceMode::Remote,
            checksums: BTreeMap::new(),
            local: LocalSources::default(),
            verify_local_checksums: false,
            parallel: false,
            fetch: None,
        }
    }
}

impl ProvisionConfig {
    /// Reject unknown ABI names and malformed values before any file is touched.
    pub fn validate(&self) -> Result<()> {
        for abi in self.checksums.keys().chain(self.local.files.keys()) {
            if Arch::from_abi_name(abi).is_none() {
                anyhow::bail!("unknown ABI {:?} in config", abi);
            }
        }
        for (abi, sum) in &self.checksums {
            let sum = sum.trim();
            if sum.len() != 64 || !sum.bytes().all(|b| b.is_ascii_hexdigit()) {
                anyhow::bail!("checksum for {} is not a SHA-256 hex digest", abi);
            }
        }
        if self.binary_name.is_empty() || self.binary_name.contains(['/', '\\']) {
            anyhow::bail!("binary_name must be a plain file name, got {:?}", self.binary_name);
        }
        if self.mode == SourceMode::Remote {
            for arch in Arch::ALL {
                self.download_url(arch)?;
            }
        }
        Ok(())
    }

    /// Expected SHA-256 for `arch` (override if configured, else the pinned value).
    pub fn expected_sha256(&self, arch: Arch) -> String {
        self.checksums
            .get(arch.abi_name())
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_else(|| arch.default_sha256().to_string())
    }

    /// Download URL for `arch`, with placeholders substituted.
    pub fn download_url(&self, arch: Arch) -> Result<String> {
        let composed = self
            .url_template
            .replace("{version}", &self.version)
            .replace("{arch}", arch.abi_name());
        url::Url::parse(&composed)
            .with_context(|| format!("invalid download URL for {}: {}", arch, composed))?;
        Ok(composed)
    }

    pub fn local_source(&self, arch: Arch) -> Option<&Path> {
        self.local.files.get(arch.abi_name()).map(PathBuf::as_path)
    }

    /// ABIs this run provisions. Remote mode always covers every supported ABI.
    pub fn selected_arches(&self) -> Vec<Arch> {
        match self.mode {
            SourceMode::Remote => Arch::ALL.to_vec(),
            SourceMode::Local if self.local.arches.is_empty() => Arch::ALL.to_vec(),
            SourceMode::Local => {
                let mut arches = self.local.arches.clone();
                arches.sort_by_key(|a| Arch::ALL.iter().position(|x| x == a));
                arches.dedup();
                arches
            }
        }
    }

    pub fn final_path(&self, arch: Arch) -> PathBuf {
        self.output_root.join(arch.relative_path(&self.binary_name))
    }

    pub fn fetch_options(&self) -> FetchOptions {
        let f = self.fetch.clone().unwrap_or_default();
        FetchOptions {
            connect_timeout: Duration::from_secs(f.connect_timeout_secs),
            total_timeout: Duration::from_secs(f.total_timeout_secs),
            low_speed_limit: f.low_speed_limit,
            low_speed_time: Duration::from_secs(f.low_speed_time_secs),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("aprov")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from an explicit path.
pub fn load_from_path(path: &Path) -> Result<ProvisionConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: ProvisionConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ProvisionConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ProvisionConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}
