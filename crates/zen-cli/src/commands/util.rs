//! Shared helpers for command handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use zen_config::Config;
use zen_core::{
    BridgeSettings, Controller, ControllerConfig, JsonLinesPublisher, Publisher, TracingPublisher,
};

use crate::cli::{GlobalOpts, PublisherKind};
use crate::error::CliError;

/// Effective configuration plus the file it came from.
pub struct Loaded {
    pub config: Config,
    pub path: Option<PathBuf>,
}

impl Loaded {
    pub fn path_label(&self) -> String {
        path_label(self.path.as_deref())
    }

    pub fn settings(&self) -> Result<BridgeSettings, CliError> {
        Ok(self.config.bridge_settings()?)
    }
}

fn path_label(path: Option<&Path>) -> String {
    path.map_or_else(
        || "(none, environment and defaults only)".into(),
        |p| p.display().to_string(),
    )
}

pub fn load(global: &GlobalOpts) -> Result<Loaded, CliError> {
    let config = zen_config::load_config(global.config.as_deref())?;
    let path = zen_config::resolve_config_path(global.config.as_deref());
    Ok(Loaded { config, path })
}

/// Controllers a one-shot command should talk to.
///
/// With a filter, exactly the matching entry (by id or host) and it must
/// be valid. Without one, every valid entry; invalid ones are skipped
/// with a warning.
pub fn select_controllers(
    loaded: &Loaded,
    filter: Option<&str>,
) -> Result<Vec<ControllerConfig>, CliError> {
    let configs = loaded.config.controller_configs();
    if configs.is_empty() {
        return Err(CliError::NoControllers {
            path: loaded.path_label(),
        });
    }

    if let Some(wanted) = filter {
        let config = configs
            .into_iter()
            .find(|c| c.id().as_str() == wanted || c.host == wanted)
            .ok_or_else(|| CliError::NotFound {
                resource_type: "controller".into(),
                identifier: wanted.into(),
                hint: "Run: zenbridge config check".into(),
            })?;
        config.validate()?;
        return Ok(vec![config]);
    }

    Ok(configs
        .into_iter()
        .filter(|c| match c.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(controller = %c.id(), error = %e, "skipping invalid controller entry");
                false
            }
        })
        .collect())
}

/// Build a controller and open its session.
pub async fn connect(
    config: ControllerConfig,
    settings: &BridgeSettings,
) -> Result<Controller, CliError> {
    let controller = Controller::new(config, settings.session.clone(), settings.inbound);
    controller.connect().await?;
    Ok(controller)
}

pub fn publisher(kind: PublisherKind) -> Arc<dyn Publisher> {
    match kind {
        PublisherKind::Log => Arc::new(TracingPublisher),
        PublisherKind::JsonLines => Arc::new(JsonLinesPublisher::stdout()),
    }
}
