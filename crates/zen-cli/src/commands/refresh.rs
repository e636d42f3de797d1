//! Single refresh cycle per controller, published through the chosen sink.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use zen_core::{BridgeSettings, ControllerConfig, CycleReport, Publisher, RefreshOrchestrator};

use crate::cli::{GlobalOpts, RefreshArgs};
use crate::error::CliError;

use super::util;

pub async fn handle(args: RefreshArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let loaded = util::load(global)?;
    let settings = loaded.settings()?;
    let configs = util::select_controllers(&loaded, args.controller.as_deref())?;
    let publisher = util::publisher(args.publisher);

    let results = join_all(
        configs
            .into_iter()
            .map(|c| cycle(c, &settings, Arc::clone(&publisher))),
    )
    .await;

    let mut reports = Vec::new();
    let mut first_error = None;
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!(error = %e, "refresh failed");
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(err) = first_error {
        if reports.is_empty() {
            return Err(err);
        }
    }

    // Publications may own stdout; the summary goes to stderr.
    if !global.quiet {
        for report in &reports {
            eprintln!(
                "{}: published {} ({} stale, {} failed)",
                report.controller,
                report.published.len(),
                report.stale().count(),
                report.publish_failures
            );
        }
    }
    Ok(())
}

async fn cycle(
    config: ControllerConfig,
    settings: &BridgeSettings,
    publisher: Arc<dyn Publisher>,
) -> Result<CycleReport, CliError> {
    let controller = util::connect(config, settings).await?;
    let orchestrator = RefreshOrchestrator::new(controller.clone(), publisher, settings);
    let report = orchestrator.run_cycle(&CancellationToken::new()).await;
    controller.shutdown().await;

    report.ok_or_else(|| CliError::OperationFailed {
        message: format!("refresh of {} was cancelled", controller.id()),
    })
}
