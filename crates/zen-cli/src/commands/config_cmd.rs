//! Config subcommand handlers.

use serde::Serialize;
use tabled::Tabled;

use zen_config::{Config, EntryCheck};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Controller")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Debug, Serialize)]
struct PathInfo {
    path: Option<String>,
    exists: bool,
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = zen_config::resolve_config_path(global.config.as_deref())
                .or_else(zen_config::default_config_path);
            let info = PathInfo {
                exists: path.as_deref().is_some_and(std::path::Path::is_file),
                path: path.map(|p| p.display().to_string()),
            };
            let out = output::render_single(
                global.output,
                &info,
                |i| i.path.clone().unwrap_or_else(|| "(no config directory)".into()),
                |i| i.path.clone().unwrap_or_default(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let loaded = util::load(global)?;
            let out = output::render_single(
                global.output,
                &loaded.config,
                |c| c.to_yaml().unwrap_or_else(|e| e.to_string()),
                |c| c.to_yaml().unwrap_or_else(|e| e.to_string()),
            )?;
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Check => {
            let loaded = util::load(global)?;
            let checks = check(&loaded.config);
            let problems = checks.iter().filter(|c| c.error.is_some()).count();

            let out = output::render_list(
                global.output,
                &checks,
                |c| CheckRow {
                    index: c.index,
                    id: c.id.to_string(),
                    status: c.error.clone().unwrap_or_else(|| "ok".into()),
                },
                |c| format!("{} {}", c.id, c.error.as_deref().unwrap_or("ok")),
            )?;
            output::print_output(&out, global.quiet);

            if problems > 0 {
                return Err(CliError::ConfigCheckFailed { count: problems });
            }
            if loaded.config.controllers.is_empty() {
                return Err(CliError::NoControllers {
                    path: loaded.path_label(),
                });
            }
            Ok(())
        }
    }
}

/// Per-entry checks plus one synthetic entry for the global settings.
fn check(config: &Config) -> Vec<EntryCheck> {
    let mut checks = config.check_controllers();
    if let Err(e) = config.bridge_settings() {
        checks.push(EntryCheck {
            index: checks.len(),
            id: "(settings)".into(),
            error: Some(e.to_string()),
        });
    }
    checks
}
