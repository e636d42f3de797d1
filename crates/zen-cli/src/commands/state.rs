//! One-shot state query across the configured controllers.

use futures_util::future::join_all;
use serde::Serialize;
use tabled::Tabled;
use tracing::warn;

use zen_core::{BridgeSettings, ControllerConfig, ControllerId, CoreError, DeviceId, DeviceRecord};

use crate::cli::{GlobalOpts, StateArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct StateEntry {
    controller: ControllerId,
    #[serde(flatten)]
    record: DeviceRecord,
}

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Controller")]
    controller: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

pub async fn handle(args: StateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let loaded = util::load(global)?;
    let settings = loaded.settings()?;
    let configs = util::select_controllers(&loaded, args.controller.as_deref())?;
    let device = args.device.map(DeviceId::new);

    let results = join_all(configs.into_iter().map(|c| query(c, &settings, device))).await;

    let mut entries = Vec::new();
    let mut first_error = None;
    for result in results {
        match result {
            Ok(found) => entries.extend(found),
            Err(e) => {
                warn!(error = %e, "controller query failed");
                first_error.get_or_insert(e);
            }
        }
    }
    // Only fail outright when no controller answered.
    if let Some(err) = first_error {
        if entries.is_empty() {
            return Err(err);
        }
    }
    if let Some(id) = device {
        if entries.is_empty() {
            return Err(CoreError::DeviceNotFound { id: id.get() }.into());
        }
    }

    let color = output::should_color(global.color);
    let out = output::render_list(
        global.output,
        &entries,
        |e| StateRow {
            controller: e.controller.to_string(),
            device: e.record.id.to_string(),
            state: output::paint_state(e.record.state, color),
            updated: e.record.updated_at.format("%H:%M:%S%.3f").to_string(),
        },
        |e| format!("{} {} {}", e.controller, e.record.id, e.record.state),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn query(
    config: ControllerConfig,
    settings: &BridgeSettings,
    device: Option<DeviceId>,
) -> Result<Vec<StateEntry>, CliError> {
    let controller = util::connect(config, settings).await?;

    let sent = match device {
        Some(id) => controller.request_device_state(id).await,
        None => controller.refresh_all().await,
    };
    if let Err(e) = sent {
        controller.shutdown().await;
        return Err(e.into());
    }
    tokio::time::sleep(settings.settle_delay).await;

    let records = match device {
        Some(id) => controller.device_record(id).into_iter().collect(),
        None => controller.devices_snapshot(),
    };
    controller.shutdown().await;

    let id = controller.id().clone();
    Ok(records
        .into_iter()
        .map(|record| StateEntry {
            controller: id.clone(),
            record,
        })
        .collect())
}
