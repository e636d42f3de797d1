//! Long-running bridge: start every controller, wait, stop.

use std::time::Duration;

use tracing::{info, warn};

use zen_core::ControllerRegistry;

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;

use super::util;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let loaded = util::load(global)?;
    let settings = loaded.settings()?;
    let configs = loaded.config.controller_configs();
    if configs.is_empty() {
        return Err(CliError::NoControllers {
            path: loaded.path_label(),
        });
    }

    let mut registry = ControllerRegistry::new(settings, util::publisher(args.publisher))?;
    let report = registry.start(configs);

    for rejected in &report.rejected {
        warn!(controller = %rejected.id, reason = %rejected.reason, "not started");
    }
    if report.started.is_empty() {
        return Err(CliError::ConfigCheckFailed {
            count: report.rejected.len(),
        });
    }
    // stdout may carry publications, so the summary goes to stderr.
    if !global.quiet {
        eprintln!(
            "bridging {} controller(s), {} rejected",
            report.started.len(),
            report.rejected.len()
        );
    }

    wait_for_exit(args.duration).await?;

    let stopped = registry.stop().await;
    info!(
        stopped = stopped.stopped.len(),
        aborted = stopped.aborted.len(),
        "bridge stopped"
    );
    Ok(())
}

async fn wait_for_exit(duration: Option<u64>) -> Result<(), CliError> {
    match duration {
        Some(secs) => {
            tokio::select! {
                res = tokio::signal::ctrl_c() => res?,
                () = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }
    info!("shutting down");
    Ok(())
}
