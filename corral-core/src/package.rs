use crate::{CorralError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The parsed contents of a package.json file. Dependency tables are
/// tolerant: a table that is not a JSON object is treated as empty, and
/// entries whose values are not strings are dropped.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub private: bool,
    pub package_manager: Option<String>,
    pub workspaces: Option<WorkspacesField>,
    #[serde(deserialize_with = "lenient_string_map")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient_string_map")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient_string_map")]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient_string_map")]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient_string_map")]
    pub scripts: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn lenient_string_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let mut map = BTreeMap::new();

    if let Some(Value::Object(entries)) = value {
        for (key, entry) in entries {
            if let Value::String(text) = entry {
                map.insert(key, text);
            }
        }
    }

    Ok(map)
}

/// The `workspaces` field of a package.json, either a bare pattern array or
/// the object form with a `packages` list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WorkspacesField {
    Patterns(Vec<String>),
    Config {
        #[serde(default)]
        packages: Vec<String>,
    },
}

impl WorkspacesField {
    pub fn patterns(&self) -> &[String] {
        match self {
            WorkspacesField::Patterns(patterns) => patterns,
            WorkspacesField::Config { packages } => packages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    YarnClassic,
    Other(String),
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageManager::Npm => write!(f, "npm"),
            PackageManager::Pnpm => write!(f, "pnpm"),
            PackageManager::Yarn => write!(f, "yarn"),
            PackageManager::YarnClassic => write!(f, "yarn@^1"),
            PackageManager::Other(name) => write!(f, "{}", name),
        }
    }
}

impl PackageManager {
    /// Resolve the package manager for a root directory. The corepack
    /// `packageManager` manifest field wins outright; otherwise lock files
    /// and tool config files are probed.
    pub fn detect(dir: &Path, manifest: &Manifest) -> Self {
        if let Some(spec) = manifest.package_manager.as_deref() {
            let (prefix, version) = match spec.split_once('@') {
                Some((prefix, version)) => (prefix, version),
                None => (spec, ""),
            };

            return match prefix {
                "pnpm" => PackageManager::Pnpm,
                "yarn" if version.starts_with("1.") => PackageManager::YarnClassic,
                "yarn" => PackageManager::Yarn,
                "npm" => PackageManager::Npm,
                other => PackageManager::Other(other.to_string()),
            };
        }

        if dir.join("pnpm-lock.yaml").is_file() {
            return PackageManager::Pnpm;
        }

        if dir.join("yarn.lock").is_file() {
            let classic = fs::read_to_string(dir.join("yarn.lock"))
                .map(|text| text.contains("# yarn lockfile v1"))
                .unwrap_or(false);

            return if classic {
                PackageManager::YarnClassic
            } else {
                PackageManager::Yarn
            };
        }

        if dir.join("package-lock.json").is_file() {
            return PackageManager::Npm;
        }

        if dir.join("pnpm-workspace.yaml").is_file() {
            return PackageManager::Pnpm;
        }

        if dir.join(".yarnrc").is_file() {
            return PackageManager::YarnClassic;
        }

        if dir.join(".yarnrc.yml").is_file()
            || dir.join(".yarn").exists()
            || dir.join(".pnp.cjs").is_file()
            || dir.join(".pnp.loader.mjs").is_file()
        {
            return PackageManager::Yarn;
        }

        if manifest.workspaces.is_some() {
            return PackageManager::YarnClassic;
        }

        PackageManager::Npm
    }
}

/// A discovered package directory, before it is wired into a collection.
#[derive(Debug, Clone)]
pub struct PackageRecord {
    /// The absolute path to the package directory.
    pub dir: PathBuf,
    /// The parsed contents of the package.json file.
    pub manifest: Manifest,
    /// The package manager used to install dependencies.
    pub package_manager: PackageManager,
    /// True if the directory is the root of a monorepo.
    pub is_monorepo_root: bool,
    /// True if no package.json file exists in the directory.
    pub is_virtual: bool,
}

impl PackageRecord {
    pub fn load(dir: PathBuf) -> Result<Self> {
        let path = dir.join("package.json");
        let data = fs::read_to_string(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CorralError::ManifestMissing { path: path.clone() }
            } else {
                CorralError::ReadFile {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        let manifest: Manifest =
            serde_json::from_str(&data).map_err(|source| CorralError::ParseJson { path, source })?;

        Ok(PackageRecord {
            dir,
            manifest,
            package_manager: PackageManager::Npm,
            is_monorepo_root: false,
            is_virtual: false,
        })
    }

    /// A stand-in record for a directory with no package.json file.
    pub fn virtual_package(dir: PathBuf) -> Self {
        PackageRecord {
            dir,
            manifest: Manifest::default(),
            package_manager: PackageManager::Npm,
            is_monorepo_root: false,
            is_virtual: true,
        }
    }

    pub fn name(&self) -> &str {
        self.manifest.name.as_deref().unwrap_or("")
    }
}
