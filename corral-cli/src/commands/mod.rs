pub mod exec;
pub mod list;
pub mod run;

use crate::cli::GlobalArgs;
use anyhow::{Result, anyhow};
use corral_core::{CancelSignal, Concurrency, Discipline, PackageCollection, Workspace};
use std::env;

/// Discover the project around the working directory and apply the global
/// filter and scheduling options.
pub(crate) fn load_collection(globals: &GlobalArgs) -> Result<PackageCollection> {
    let cwd = env::current_dir()?;
    let workspace = Workspace::discover(&cwd)?;
    let mut collection = workspace.into_collection(&cwd);

    tracing::debug!(
        packages = collection.len(),
        package_manager = %collection.package_manager(),
        "discovered project"
    );

    collection.filter(&globals.filter);

    if globals.parallel {
        collection.set_discipline(Discipline::Parallel);
    } else if globals.stream {
        collection.set_discipline(Discipline::Streaming);
    }

    if let Some(value) = globals.concurrency.as_deref() {
        collection.set_concurrency(parse_concurrency(value)?);
    }

    if let Some(delay) = globals.delay {
        collection.set_delay_ms(delay);
    }

    Ok(collection)
}

fn parse_concurrency(value: &str) -> Result<Concurrency> {
    if value.eq_ignore_ascii_case("auto") {
        return Ok(Concurrency::Auto);
    }

    let limit: usize = value
        .parse()
        .map_err(|_| anyhow!("invalid --concurrency value: {value}"))?;

    Ok(Concurrency::Limit(limit))
}

/// A cancellation signal wired to Ctrl-C.
pub(crate) fn cancel_on_ctrl_c() -> CancelSignal {
    let signal = CancelSignal::new();
    let handle = signal.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    signal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_concurrency() {
        assert_eq!(parse_concurrency("auto").unwrap(), Concurrency::Auto);
        assert_eq!(parse_concurrency("4").unwrap(), Concurrency::Limit(4));
        assert!(parse_concurrency("lots").is_err());
    }
}
