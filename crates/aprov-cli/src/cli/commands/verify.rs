//! `aprov verify` – re-run the integrity and ABI gates over an output tree.

use anyhow::Result;
use aprov_core::config::ProvisionConfig;
use aprov_core::provision;

pub fn run_verify(cfg: &ProvisionConfig, json: bool) -> Result<()> {
    let artifacts = provision::verify_tree(cfg)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
    } else {
        for a in &artifacts {
            println!("ok  {:<12} {}", a.arch, a.path.display());
        }
    }
    Ok(())
}
