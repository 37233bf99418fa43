//! `aprov provision` – run the provisioning pipeline.

use anyhow::{Context, Result};
use aprov_core::config::ProvisionConfig;
use aprov_core::control::AbortToken;
use aprov_core::provision::Provisioner;

/// Runs the blocking pipeline off the async runtime; Ctrl-C trips the abort token
/// so an in-flight download stops and nothing unverified is left in place.
pub async fn run_provision(cfg: ProvisionConfig, json: bool) -> Result<()> {
    let abort = AbortToken::new();
    let provisioner = Provisioner::new(cfg, abort.clone())?;

    let signal_abort = abort.clone();
    let signal_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, aborting");
            signal_abort.request_abort();
        }
    });

    let result = tokio::task::spawn_blocking(move || provisioner.run())
        .await
        .context("provisioning task panicked")?;
    signal_handle.abort();
    let artifacts = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
    } else {
        for a in &artifacts {
            println!("{}  {:<12} {}", a.sha256, a.arch, a.path.display());
        }
    }
    Ok(())
}
