use super::load_collection;
use crate::cli::GlobalArgs;
use anyhow::Result;
use clap::Args;
use corral_core::logger::dim;
use serde_json::json;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// List all packages regardless of filtering
    #[arg(long = "all")]
    pub all: bool,

    /// Format output as JSON
    #[arg(long = "json")]
    pub json: bool,
}

pub fn run(args: ListArgs, globals: &GlobalArgs) -> Result<()> {
    let collection = load_collection(globals)?;

    if args.json {
        let entries: Vec<_> = collection
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, node)| args.all || node.is_selected)
            .map(|(index, node)| {
                let links = |edges: &[corral_core::Edge]| {
                    edges
                        .iter()
                        .map(|edge| {
                            json!({
                                "type": edge.kind.as_str(),
                                "key": edge.key,
                                "value": edge.value,
                                "name": collection.node(edge.target).name(),
                                "dir": collection.node(edge.target).dir,
                            })
                        })
                        .collect::<Vec<_>>()
                };

                json!({
                    "name": node.name(),
                    "version": node.manifest.version,
                    "private": node.manifest.private,
                    "isRoot": node.is_root,
                    "isSelected": node.is_selected,
                    "dir": node.dir,
                    "localDependencies": links(collection.local_dependencies(index)),
                    "localDependents": links(collection.local_dependents(index)),
                })
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for node in collection.nodes() {
            if args.all || node.is_selected {
                println!("{} {}", node.name(), dim(&node.dir.display().to_string()));
            }
        }
    }

    Ok(())
}
