use crate::collection::PackageCollection;
use crate::package::{PackageManager, PackageRecord};
use crate::{CorralError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Member patterns read from a pnpm-workspace.yaml file.
#[derive(Debug, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub packages: Vec<String>,
}

impl WorkspaceConfig {
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = root.join("pnpm-workspace.yaml");
        if !path.is_file() {
            return Ok(None);
        }

        let data = fs::read_to_string(&path).map_err(|source| CorralError::ReadFile {
            path: path.clone(),
            source,
        })?;

        let config: Self =
            serde_yaml::from_str(&data).map_err(|err| CorralError::WorkspaceConfig {
                path: path.clone(),
                reason: err.to_string(),
            })?;

        Ok(Some(config))
    }
}

/// The discovered project: a root record plus zero or more member records,
/// ready to be wired into a [`PackageCollection`].
#[derive(Debug)]
pub struct Workspace {
    pub root: PackageRecord,
    pub members: Vec<PackageRecord>,
    pub package_manager: PackageManager,
}

impl Workspace {
    /// Walk up from `start` looking for a workspace root (a directory with
    /// a `workspaces` manifest field or a pnpm-workspace.yaml). Falls back
    /// to the nearest plain package, then to a virtual package at `start`.
    pub fn discover(start: &Path) -> Result<Self> {
        let mut current = Some(start);

        while let Some(dir) = current {
            if let Some(workspace) = try_load_workspace(dir)? {
                return Ok(workspace);
            }

            current = dir.parent();
        }

        let mut current = Some(start);

        while let Some(dir) = current {
            if dir.join("package.json").is_file() {
                let mut root = PackageRecord::load(dir.to_path_buf())?;
                root.package_manager = PackageManager::detect(dir, &root.manifest);
                let package_manager = root.package_manager.clone();

                return Ok(Workspace {
                    root,
                    members: Vec::new(),
                    package_manager,
                });
            }

            current = dir.parent();
        }

        Ok(Workspace {
            root: PackageRecord::virtual_package(start.to_path_buf()),
            members: Vec::new(),
            package_manager: PackageManager::Npm,
        })
    }

    pub fn member_by_name(&self, name: &str) -> Option<&PackageRecord> {
        self.members.iter().find(|member| member.name() == name)
    }

    /// Wire the discovered records into a collection, with the start
    /// package chosen from `start_dir`.
    pub fn into_collection(self, start_dir: &Path) -> PackageCollection {
        PackageCollection::new(self.root, self.members, start_dir)
    }
}

fn try_load_workspace(dir: &Path) -> Result<Option<Workspace>> {
    let manifest_path = dir.join("package.json");

    let mut root = if manifest_path.is_file() {
        PackageRecord::load(dir.to_path_buf())?
    } else if dir.join("pnpm-workspace.yaml").is_file() {
        PackageRecord::virtual_package(dir.to_path_buf())
    } else {
        return Ok(None);
    };

    let mut patterns: Vec<String> = Vec::new();

    if let Some(config) = WorkspaceConfig::load(dir)? {
        patterns.extend(config.packages);
    }

    if let Some(workspaces) = root.manifest.workspaces.as_ref() {
        for pattern in workspaces.patterns() {
            if !patterns.contains(pattern) {
                patterns.push(pattern.clone());
            }
        }
    }

    if patterns.is_empty() {
        return Ok(None);
    }

    let package_manager = PackageManager::detect(dir, &root.manifest);

    root.is_monorepo_root = true;
    root.package_manager = package_manager.clone();

    let members = load_members(dir, &patterns, &package_manager)?;

    Ok(Some(Workspace {
        root,
        members,
        package_manager,
    }))
}

fn load_members(
    root: &Path,
    patterns: &[String],
    package_manager: &PackageManager,
) -> Result<Vec<PackageRecord>> {
    let mut members = Vec::new();
    let mut seen: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let pattern_path = root.join(pattern);
        let pattern_str = pattern_path.to_string_lossy().to_string();

        for entry in glob::glob(&pattern_str).map_err(|err| CorralError::WorkspaceConfig {
            path: root.to_path_buf(),
            reason: err.to_string(),
        })? {
            let path = entry.map_err(|err| CorralError::WorkspaceConfig {
                path: root.to_path_buf(),
                reason: err.to_string(),
            })?;

            if !path.is_dir() || path == root || seen.contains(&path) {
                continue;
            }

            if path.join("package.json").is_file() {
                let mut member = PackageRecord::load(path.clone())?;
                member.package_manager = package_manager.clone();
                seen.push(path);
                members.push(member);
            }
        }
    }

    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("corral_test_{}_{}", name, timestamp))
    }

    #[test]
    fn test_workspaces_array() {
        let dir = temp_dir("workspaces_array");
        fs::create_dir_all(dir.join("packages/foo")).unwrap();

        fs::write(
            dir.join("package.json"),
            r#"{ "name": "my-monorepo", "workspaces": ["packages/*"] }"#,
        )
        .unwrap();
        fs::write(
            dir.join("packages/foo/package.json"),
            r#"{ "name": "foo", "version": "1.0.0" }"#,
        )
        .unwrap();

        let workspace = Workspace::discover(&dir).unwrap();

        assert!(workspace.root.is_monorepo_root);
        assert_eq!(workspace.members.len(), 1);
        assert_eq!(workspace.members[0].name(), "foo");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_workspaces_object_form() {
        let dir = temp_dir("workspaces_object");
        fs::create_dir_all(dir.join("apps/bar")).unwrap();

        fs::write(
            dir.join("package.json"),
            r#"{ "name": "my-monorepo", "workspaces": { "packages": ["apps/*"] } }"#,
        )
        .unwrap();
        fs::write(
            dir.join("apps/bar/package.json"),
            r#"{ "name": "bar", "version": "2.0.0" }"#,
        )
        .unwrap();

        let workspace = Workspace::discover(&dir).unwrap();

        assert_eq!(workspace.members.len(), 1);
        assert_eq!(workspace.members[0].name(), "bar");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_pnpm_workspace_yaml() {
        let dir = temp_dir("pnpm_yaml");
        fs::create_dir_all(dir.join("packages/a")).unwrap();

        fs::write(dir.join("pnpm-workspace.yaml"), "packages:\n  - \"packages/*\"\n").unwrap();
        fs::write(
            dir.join("package.json"),
            r#"{ "name": "my-monorepo" }"#,
        )
        .unwrap();
        fs::write(dir.join("packages/a/package.json"), r#"{ "name": "pkg-a" }"#).unwrap();

        let workspace = Workspace::discover(&dir).unwrap();

        assert_eq!(workspace.package_manager, PackageManager::Pnpm);
        assert_eq!(workspace.members.len(), 1);
        assert_eq!(workspace.members[0].name(), "pkg-a");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_combined_patterns_deduplicated() {
        let dir = temp_dir("combined_patterns");
        fs::create_dir_all(dir.join("packages/a")).unwrap();
        fs::create_dir_all(dir.join("apps/b")).unwrap();

        fs::write(dir.join("pnpm-workspace.yaml"), "packages:\n  - \"packages/*\"\n").unwrap();
        fs::write(
            dir.join("package.json"),
            r#"{ "name": "my-monorepo", "workspaces": ["apps/*", "packages/*"] }"#,
        )
        .unwrap();
        fs::write(dir.join("packages/a/package.json"), r#"{ "name": "pkg-a" }"#).unwrap();
        fs::write(dir.join("apps/b/package.json"), r#"{ "name": "app-b" }"#).unwrap();

        let workspace = Workspace::discover(&dir).unwrap();

        assert_eq!(workspace.members.len(), 2);

        let names: Vec<&str> = workspace.members.iter().map(|m| m.name()).collect();
        assert!(names.contains(&"pkg-a"));
        assert!(names.contains(&"app-b"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_discovery_walks_up_from_member() {
        let dir = temp_dir("walk_up");
        fs::create_dir_all(dir.join("packages/foo/src")).unwrap();

        fs::write(
            dir.join("package.json"),
            r#"{ "name": "my-monorepo", "workspaces": ["packages/*"] }"#,
        )
        .unwrap();
        fs::write(dir.join("packages/foo/package.json"), r#"{ "name": "foo" }"#).unwrap();

        let workspace = Workspace::discover(&dir.join("packages/foo/src")).unwrap();
        assert!(workspace.root.is_monorepo_root);
        assert_eq!(workspace.root.dir, dir);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_single_package_fallback() {
        let dir = temp_dir("single_package");
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(dir.join("package.json"), r#"{ "name": "solo" }"#).unwrap();

        let workspace = Workspace::discover(&dir.join("src")).unwrap();

        assert!(!workspace.root.is_monorepo_root);
        assert!(workspace.members.is_empty());
        assert_eq!(workspace.root.name(), "solo");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_virtual_fallback_without_any_manifest() {
        let dir = temp_dir("virtual_fallback");
        fs::create_dir_all(&dir).unwrap();

        // Walk-up may escape the fixture on machines with a package.json in
        // a parent of the temp dir, so only probe the fixture itself.
        let workspace = try_load_workspace(&dir).unwrap();
        assert!(workspace.is_none());

        let record = PackageRecord::virtual_package(dir.clone());
        assert!(record.is_virtual);
        assert_eq!(record.name(), "");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_into_collection() {
        let dir = temp_dir("into_collection");
        fs::create_dir_all(dir.join("packages/lib")).unwrap();
        fs::create_dir_all(dir.join("packages/app")).unwrap();

        fs::write(
            dir.join("package.json"),
            r#"{ "name": "root", "workspaces": ["packages/*"] }"#,
        )
        .unwrap();
        fs::write(dir.join("packages/lib/package.json"), r#"{ "name": "lib" }"#).unwrap();
        fs::write(
            dir.join("packages/app/package.json"),
            r#"{ "name": "app", "dependencies": { "lib": "workspace:*" } }"#,
        )
        .unwrap();

        let start = dir.join("packages/app");
        let collection = Workspace::discover(&dir).unwrap().into_collection(&start);

        assert_eq!(collection.len(), 3);
        assert_eq!(collection.start().name(), "app");

        let lib = collection
            .nodes()
            .iter()
            .position(|node| node.name() == "lib")
            .unwrap();
        let app = collection
            .nodes()
            .iter()
            .position(|node| node.name() == "app")
            .unwrap();
        assert!(lib < app);

        fs::remove_dir_all(&dir).unwrap();
    }
}
