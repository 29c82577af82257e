use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let Cli { globals, command } = Cli::parse();

    match command {
        Command::List(args) => commands::list::run(args, &globals)?,
        Command::Run(args) => commands::run::run(args, &globals).await?,
        Command::Exec(args) => commands::exec::run(args, &globals).await?,
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}
