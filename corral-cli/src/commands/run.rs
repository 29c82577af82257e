use super::{cancel_on_ctrl_c, load_collection};
use crate::cli::GlobalArgs;
use anyhow::Result;
use clap::Args;
use corral_core::{Discipline, run};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Script name, e.g. "test"
    pub script: String,

    /// Extra arguments passed to the script (use `--` to separate)
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}

pub async fn run(args: RunArgs, globals: &GlobalArgs) -> Result<()> {
    let collection = load_collection(globals)?;
    let capture = collection.discipline() != Discipline::Sequential;
    let context = run::RunContext::for_collection(&collection, capture);
    let signal = cancel_on_ctrl_c();

    let script = args.script.as_str();
    let script_args = args.args.as_slice();
    let context = &context;

    let completed = collection
        .for_each(
            |node, abort| {
                Box::pin(async move {
                    // Packages without the script are skipped, not failed.
                    if !node.is_selected || !run::has_script(node, script) {
                        return Ok(());
                    }

                    if let Err(error) = run::run_script(node, script, script_args, context).await
                    {
                        node.log.error(&error.to_string());
                        abort.abort();
                    }

                    Ok(())
                })
            },
            Some(signal),
        )
        .await?;

    if !completed {
        std::process::exit(1);
    }

    Ok(())
}
