//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod refresh;
pub mod run;
pub mod set;
pub mod state;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(args, global).await,
        Command::State(args) => state::handle(args, global).await,
        Command::Set(args) => set::handle(args, global).await,
        Command::Refresh(args) => refresh::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(_) => Err(CliError::OperationFailed {
            message: "completions are generated before dispatch".into(),
        }),
    }
}
