//! Command dispatch and handler modules.

mod cache;
mod resolve;

use miette::Result;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    tracing::debug!("dispatching {:?}", cli.command);
    match cli.command {
        Command::Resolve => resolve::exec(),
        Command::Cache { action } => cache::exec(action).await,
    }
}
