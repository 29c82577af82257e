use crate::collection::PackageCollection;
use crate::graph::PackageNode;
use crate::{CorralError, Result};
use std::env;
use std::path::PathBuf;
use tokio::process::Command;

/// Extra environment and output routing shared by every process spawned
/// during one `for_each` pass.
#[derive(Debug, Default)]
pub struct RunContext {
    pub env: Vec<(String, String)>,
    /// The project root directory, whose `node_modules/.bin` also lands on
    /// PATH behind the package's own.
    pub root_dir: Option<PathBuf>,
    /// Route output through the package logger instead of inheriting the
    /// terminal, so parallel packages do not interleave.
    pub capture: bool,
}

impl RunContext {
    /// Context advertising the selected set to spawned processes.
    pub fn for_collection(collection: &PackageCollection, capture: bool) -> Self {
        let dirs: Vec<String> = collection
            .selected()
            .map(|node| node.dir.to_string_lossy().into_owned())
            .collect();
        let names: Vec<&str> = collection.selected().map(|node| node.name()).collect();

        RunContext {
            env: vec![
                (
                    "CORRAL_SELECTED_DIRS".to_string(),
                    serde_json::to_string(&dirs).unwrap_or_default(),
                ),
                (
                    "CORRAL_SELECTED_NAMES".to_string(),
                    serde_json::to_string(&names).unwrap_or_default(),
                ),
            ],
            root_dir: Some(collection.root().dir.clone()),
            capture,
        }
    }
}

pub fn has_script(node: &PackageNode, script: &str) -> bool {
    node.manifest.scripts.contains_key(script)
}

/// Run a manifest script in the package directory, with `pre<name>` and
/// `post<name>` hooks when they exist.
pub async fn run_script(
    node: &PackageNode,
    script: &str,
    args: &[String],
    context: &RunContext,
) -> Result<()> {
    if !has_script(node, script) {
        return Err(CorralError::ScriptMissing {
            name: script.to_string(),
        });
    }

    let pre_name = format!("pre{}", script);
    if has_script(node, &pre_name) {
        run_single_script(node, &pre_name, &[], context).await?;
    }

    run_single_script(node, script, args, context).await?;

    let post_name = format!("post{}", script);
    if has_script(node, &post_name) {
        run_single_script(node, &post_name, &[], context).await?;
    }

    Ok(())
}

async fn run_single_script(
    node: &PackageNode,
    script: &str,
    args: &[String],
    context: &RunContext,
) -> Result<()> {
    let base = node
        .manifest
        .scripts
        .get(script)
        .ok_or_else(|| CorralError::ScriptMissing {
            name: script.to_string(),
        })?;

    let mut command_text = base.clone();

    if !args.is_empty() {
        let extra = join_args(args);
        if !command_text.is_empty() {
            command_text.push(' ');
        }
        command_text.push_str(&extra);
    }

    node.log.info(&command_text);

    let mut command = make_command(&command_text);
    command.current_dir(&node.dir);
    command.env("PATH", build_path(node, context, script)?);

    for (key, value) in &context.env {
        command.env(key, value);
    }

    let status = wait_with_output(node, command, context, script).await?;

    if status.success() {
        Ok(())
    } else {
        Err(CorralError::ScriptFailed {
            name: script.to_string(),
            code: status.code().unwrap_or(1),
        })
    }
}

/// Run an arbitrary command in the package directory with the package's
/// `node_modules/.bin` prepended to PATH.
pub async fn exec_command(
    node: &PackageNode,
    program: &str,
    args: &[String],
    context: &RunContext,
) -> Result<()> {
    let mut command = Command::new(program);
    command.args(args);
    command.current_dir(&node.dir);
    command.env("PATH", build_path(node, context, program)?);

    for (key, value) in &context.env {
        command.env(key, value);
    }

    let status = wait_with_output(node, command, context, program).await?;

    if status.success() {
        Ok(())
    } else {
        Err(CorralError::CommandFailed {
            name: program.to_string(),
            code: status.code().unwrap_or(1),
        })
    }
}

async fn wait_with_output(
    node: &PackageNode,
    mut command: Command,
    context: &RunContext,
    name: &str,
) -> Result<std::process::ExitStatus> {
    if context.capture {
        let output = command.output().await.map_err(|error| CorralError::ScriptRun {
            name: name.to_string(),
            reason: error.to_string(),
        })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            node.log.info(line);
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            node.log.info(line);
        }

        Ok(output.status)
    } else {
        command.status().await.map_err(|error| CorralError::ScriptRun {
            name: name.to_string(),
            reason: error.to_string(),
        })
    }
}

fn join_args(args: &[String]) -> String {
    let mut result = String::new();
    let mut first = true;

    for arg in args {
        if !first {
            result.push(' ');
        }
        first = false;
        result.push_str(arg);
    }

    result
}

fn build_path(node: &PackageNode, context: &RunContext, name: &str) -> Result<std::ffi::OsString> {
    let mut parts = vec![node.dir.join("node_modules/.bin")];

    if let Some(root) = context.root_dir.as_ref().filter(|root| *root != &node.dir) {
        parts.push(root.join("node_modules/.bin"));
    }

    if let Some(existing) = env::var_os("PATH") {
        for path in env::split_paths(&existing) {
            parts.push(path);
        }
    }

    env::join_paths(parts).map_err(|error| CorralError::ScriptRun {
        name: name.to_string(),
        reason: error.to_string(),
    })
}

#[cfg(unix)]
fn make_command(script: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(script);
    command
}

#[cfg(windows)]
fn make_command(script: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(script);
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::PackageLogger;
    use crate::package::{Manifest, PackageManager};

    fn node(scripts: &str) -> PackageNode {
        let manifest: Manifest =
            serde_json::from_str(&format!(r#"{{ "name": "demo", "scripts": {} }}"#, scripts))
                .unwrap();

        PackageNode {
            dir: std::env::temp_dir(),
            manifest,
            package_manager: PackageManager::Npm,
            is_root: false,
            is_virtual: false,
            is_selected: true,
            log: PackageLogger::new(None),
        }
    }

    #[test]
    fn test_has_script() {
        let node = node(r#"{ "build": "true" }"#);
        assert!(has_script(&node, "build"));
        assert!(!has_script(&node, "test"));
    }

    #[test]
    fn test_join_args() {
        assert_eq!(join_args(&[]), "");
        assert_eq!(
            join_args(&["--watch".to_string(), "-v".to_string()]),
            "--watch -v"
        );
    }

    #[test]
    fn test_build_path_puts_package_bin_first() {
        let mut package = node("{}");
        package.dir = PathBuf::from("/repo/pkg");

        let context = RunContext {
            root_dir: Some(PathBuf::from("/repo")),
            ..RunContext::default()
        };

        let joined = build_path(&package, &context, "x").unwrap();
        let mut parts = env::split_paths(&joined);
        assert_eq!(parts.next().unwrap(), PathBuf::from("/repo/pkg/node_modules/.bin"));
        assert_eq!(parts.next().unwrap(), PathBuf::from("/repo/node_modules/.bin"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_script_success_and_failure() {
        let ok = node(r#"{ "noop": "true" }"#);
        let context = RunContext {
            capture: true,
            ..RunContext::default()
        };

        run_script(&ok, "noop", &[], &context).await.unwrap();

        let bad = node(r#"{ "nope": "false" }"#);
        let error = run_script(&bad, "nope", &[], &context).await.unwrap_err();
        assert!(matches!(error, CorralError::ScriptFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_script_hooks_run_in_order() {
        let hooked = node(
            r#"{
                "prebuild": "echo pre",
                "build": "echo main",
                "postbuild": "echo post"
            }"#,
        );
        let context = RunContext {
            capture: true,
            ..RunContext::default()
        };

        run_script(&hooked, "build", &[], &context).await.unwrap();
    }

    #[test]
    fn test_missing_script_is_an_error() {
        let empty = node("{}");
        let context = RunContext::default();

        let error = futures::executor::block_on(run_script(&empty, "build", &[], &context));
        assert!(matches!(
            error,
            Err(CorralError::ScriptMissing { .. })
        ));
    }
}
