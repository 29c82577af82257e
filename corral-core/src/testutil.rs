use crate::package::{PackageManager, PackageRecord};
use std::path::PathBuf;

pub(crate) fn record(dir: &str, manifest: &str) -> PackageRecord {
    PackageRecord {
        dir: PathBuf::from(dir),
        manifest: serde_json::from_str(manifest).unwrap(),
        package_manager: PackageManager::Npm,
        is_monorepo_root: false,
        is_virtual: false,
    }
}
