use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorralError {
    #[error("Failed to read file {path:?}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },

    #[error("Failed to parse JSON in {path:?}: {source}")]
    ParseJson { path: PathBuf, source: serde_json::Error },

    #[error("Invalid workspace config in {path:?}: {reason}")]
    WorkspaceConfig { path: PathBuf, reason: String },

    #[error("Package manifest not found at {path:?}")]
    ManifestMissing { path: PathBuf },

    #[error("Script \"{name}\" not found")]
    ScriptMissing { name: String },

    #[error("Script \"{name}\" failed with exit code {code}")]
    ScriptFailed { name: String, code: i32 },

    #[error("Failed to run \"{name}\": {reason}")]
    ScriptRun { name: String, reason: String },

    #[error("Command \"{name}\" failed with exit code {code}")]
    CommandFailed { name: String, code: i32 },
}
