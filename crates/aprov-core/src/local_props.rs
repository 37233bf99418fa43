//! Overlay from an F-Droid style `fdroid.properties` file.
//!
//! Reproducible builds drop a Java properties file next to the project that
//! switches provisioning to local mode and points at prebuilt binaries:
//!
//! ```text
//! ide.build.fdroid=true
//! ide.build.fdroid.arch=arm64-v8a
//! ide.build.fdroid.aapt2File.arm64-v8a=/path/to/aapt2
//! ```

use crate::arch::Arch;
use crate::config::{ProvisionConfig, SourceMode};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const PROPS_FILE_NAME: &str = "fdroid.properties";

pub const PROP_LOCAL_BUILD: &str = "ide.build.fdroid";
pub const PROP_LOCAL_ARCH: &str = "ide.build.fdroid.arch";
pub const PROP_BINARY_PREFIX: &str = "ide.build.fdroid.aapt2File.";

/// Parse Java properties text.
///
/// Keys end at the first unescaped `=`, `:` or whitespace. A line ending in an
/// odd number of backslashes continues on the next line, with the next line's
/// leading whitespace dropped. `#` and `!` start comment lines. Keys and values
/// are unescaped (`\t`, `\n`, `\r`, `\f`, `\uXXXX`; any other `\c` is `c`), so
/// Windows paths are written as `C\:\\tools\\aapt2`.
pub fn parse_properties(data: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in logical_lines(data) {
        let (key, value) = split_key_value(&line);
        out.insert(unescape(key), unescape(value));
    }
    out
}

/// Natural lines joined across continuations, with comments and blanks dropped.
fn logical_lines(data: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Option<String> = None;
    for raw in data.lines() {
        let part = raw.trim_start();
        let mut buf = match current.take() {
            Some(buf) => buf,
            None => {
                if part.is_empty() || part.starts_with('#') || part.starts_with('!') {
                    continue;
                }
                String::new()
            }
        };
        let trailing = part.len() - part.trim_end_matches('\\').len();
        if trailing % 2 == 1 {
            buf.push_str(&part[..part.len() - 1]);
            current = Some(buf);
        } else {
            buf.push_str(part);
            lines.push(buf);
        }
    }
    // A continuation on the last line just ends the entry.
    lines.extend(current);
    lines
}

/// Split a logical line into raw (still escaped) key and value.
fn split_key_value(line: &str) -> (&str, &str) {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'=' | b':' | b' ' | b'\t' | b'\x0c' => break,
            _ => i += 1,
        }
    }
    let key_end = i.min(bytes.len());
    let rest = line[key_end..].trim_start_matches([' ', '\t', '\x0c']);
    let rest = rest
        .strip_prefix(['=', ':'])
        .unwrap_or(rest)
        .trim_start_matches([' ', '\t', '\x0c']);
    (&line[..key_end], rest.trim_end())
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => {
                        out.push(decoded);
                        chars.nth(3);
                    }
                    _ => out.push('u'),
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Apply parsed properties to `cfg`. Returns true if local mode was switched on.
pub fn apply(cfg: &mut ProvisionConfig, props: &HashMap<String, String>) -> Result<bool> {
    let enabled = props
        .get(PROP_LOCAL_BUILD)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if !enabled {
        return Ok(false);
    }

    cfg.mode = SourceMode::Local;
    if let Some(abi) = props.get(PROP_LOCAL_ARCH).filter(|v| !v.is_empty()) {
        let arch = Arch::from_abi_name(abi)
            .with_context(|| format!("{}: unsupported ABI {:?}", PROP_LOCAL_ARCH, abi))?;
        cfg.local.arches = vec![arch];
    }
    for arch in Arch::ALL {
        let key = format!("{}{}", PROP_BINARY_PREFIX, arch.abi_name());
        if let Some(path) = props.get(&key).filter(|v| !v.is_empty()) {
            cfg.local
                .files
                .insert(arch.abi_name().to_string(), PathBuf::from(path));
        }
    }
    tracing::info!(arches = ?cfg.selected_arches(), "local binaries enabled via properties");
    Ok(true)
}

/// Read `path` if it exists and apply it. A missing file leaves `cfg` untouched.
pub fn load_and_apply(cfg: &mut ProvisionConfig, path: &Path) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    let data =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    apply(cfg, &parse_properties(&data))
}
