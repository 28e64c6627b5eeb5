//! Command-line interface module.

mod args;
pub mod compile;
pub mod document;
pub mod history;
mod prompt;
pub mod session;
pub mod sync;
pub mod watch;

pub use args::{
    BranchCommand, Cli, Commands, CompileArgs, HistoryCommand, OutputFormat, Prefer, SyncCommand,
    VersionCommand,
};

use anyhow::Result;

use session::Workspace;

/// Run one parsed command to completion.
pub async fn run(cli: &Cli) -> Result<()> {
    if let Commands::Init { force } = &cli.command {
        return document::init(*force);
    }

    let workspace = Workspace::open(cli)?;
    match &cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Compile { args } => compile::run(args, &workspace).await,
        Commands::Watch { args } => watch::run(args, &workspace).await,
        Commands::Export { output } => document::export(&workspace, output.as_deref()),
        Commands::Import { input } => document::import(&workspace, input),
        Commands::Version(command) => history::version(&workspace, command),
        Commands::Branch(command) => history::branch(&workspace, command),
        Commands::History(command) => history::history(&workspace, command),
        Commands::Sync(command) => sync::run(&workspace, command).await,
        Commands::Lint => document::lint(&workspace),
    }
}
