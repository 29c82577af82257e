use crate::commands;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "corral",
    about = "workspace-aware monorepo task runner",
    version,
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    #[command(flatten)]
    pub globals: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Select or deselect packages, e.g. "app-*", "foo...", "...^bar", "!baz"
    #[arg(short = 'F', long = "filter", global = true)]
    pub filter: Vec<String>,

    /// Run packages all at once, ignoring dependency order
    #[arg(long = "parallel", global = true, conflicts_with = "stream")]
    pub parallel: bool,

    /// Run packages in dependency order with bounded parallelism
    #[arg(long = "stream", global = true)]
    pub stream: bool,

    /// Packages in flight under --stream ("auto" or 1-100)
    #[arg(long = "concurrency", global = true)]
    pub concurrency: Option<String>,

    /// Minimum delay in milliseconds between package starts
    #[arg(long = "delay", global = true)]
    pub delay: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List project packages
    List(commands::list::ListArgs),
    /// Run a package.json script across selected packages
    Run(commands::run::RunArgs),
    /// Execute a command across selected packages
    Exec(commands::exec::ExecArgs),
}
