//! Switch or dim a single light.

use serde::Serialize;
use tracing::warn;

use zen_core::{ControllerId, DeviceId, DeviceRecord, DeviceState};

use crate::cli::{GlobalOpts, SetArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct SetOutcome {
    controller: ControllerId,
    device: DeviceId,
    requested: DeviceState,
    /// What the controller reported back within the settle delay.
    reported: Option<DeviceRecord>,
}

fn detail(outcome: &SetOutcome) -> String {
    let reported = outcome.reported.as_ref().map_or_else(
        || "-".to_owned(),
        |r| format!("{} at {}", r.state, r.updated_at.format("%H:%M:%S%.3f")),
    );
    [
        format!("Controller: {}", outcome.controller),
        format!("Device:     {}", outcome.device),
        format!("Requested:  {}", outcome.requested),
        format!("Reported:   {reported}"),
    ]
    .join("\n")
}

pub async fn handle(args: SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let requested: DeviceState = args.state.parse()?;
    let device = DeviceId::new(args.device);

    let loaded = util::load(global)?;
    let settings = loaded.settings()?;
    let mut configs = util::select_controllers(&loaded, Some(&args.controller))?;
    let Some(config) = configs.pop() else {
        return Err(CliError::NoControllers {
            path: loaded.path_label(),
        });
    };

    let controller = util::connect(config, &settings).await?;
    if let Err(e) = controller.request_set_state(device, requested).await {
        controller.shutdown().await;
        return Err(e.into());
    }

    let reported = if args.no_wait {
        None
    } else {
        tokio::time::sleep(settings.settle_delay).await;
        controller.device_record(device)
    };
    controller.shutdown().await;

    if !args.no_wait && reported.is_none() {
        warn!(%device, "no state report received within the settle delay");
    }

    let outcome = SetOutcome {
        controller: controller.id().clone(),
        device,
        requested,
        reported,
    };
    let out = output::render_single(global.output, &outcome, detail, |o| {
        o.reported
            .as_ref()
            .map_or_else(|| o.requested.to_string(), |r| r.state.to_string())
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
