use super::{cancel_on_ctrl_c, load_collection};
use crate::cli::GlobalArgs;
use anyhow::Result;
use clap::Args;
use corral_core::{Discipline, run};

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Command to execute
    pub command: String,

    /// Arguments passed to the command
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}

pub async fn run(args: ExecArgs, globals: &GlobalArgs) -> Result<()> {
    let collection = load_collection(globals)?;
    let capture = collection.discipline() != Discipline::Sequential;
    let context = run::RunContext::for_collection(&collection, capture);
    let signal = cancel_on_ctrl_c();

    let program = args.command.as_str();
    let program_args = args.args.as_slice();
    let context = &context;

    let completed = collection
        .for_each(
            |node, abort| {
                Box::pin(async move {
                    if !node.is_selected {
                        return Ok(());
                    }

                    if let Err(error) =
                        run::exec_command(node, program, program_args, context).await
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
