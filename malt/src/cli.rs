// malt/src/cli.rs
//! Defines the command-line argument structure using clap.
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use malt_common::config::Config;
use malt_common::error::Result;

// Module declarations
pub mod info;
pub mod install;
pub mod list;
pub mod uninstall;

use crate::cli::info::Info;
use crate::cli::install::InstallArgs;
use crate::cli::list::List;
use crate::cli::uninstall::Uninstall;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "malt", bin_name = "malt")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Install-prefix root, overriding MALT_PREFIX.
    #[arg(long, global = true)]
    pub prefix: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Install(InstallArgs),
    Info(Info),
    List(List),
    Uninstall(Uninstall),
}

impl Command {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Install(command) => command.run(config).await,
            Self::Info(command) => command.run(config).await,
            Self::List(command) => command.run(config).await,
            Self::Uninstall(command) => command.run(config).await,
        }
    }
}
