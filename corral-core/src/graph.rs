use crate::logger::PackageLogger;
use crate::package::{Manifest, PackageManager, PackageRecord};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Dependencies,
    DevDependencies,
    PeerDependencies,
    OptionalDependencies,
}

pub const DEPENDENCY_KINDS: [DependencyKind; 4] = [
    DependencyKind::Dependencies,
    DependencyKind::DevDependencies,
    DependencyKind::PeerDependencies,
    DependencyKind::OptionalDependencies,
];

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Dependencies => "dependencies",
            DependencyKind::DevDependencies => "devDependencies",
            DependencyKind::PeerDependencies => "peerDependencies",
            DependencyKind::OptionalDependencies => "optionalDependencies",
        }
    }

    fn table<'a>(&self, manifest: &'a Manifest) -> &'a BTreeMap<String, String> {
        match self {
            DependencyKind::Dependencies => &manifest.dependencies,
            DependencyKind::DevDependencies => &manifest.dev_dependencies,
            DependencyKind::PeerDependencies => &manifest.peer_dependencies,
            DependencyKind::OptionalDependencies => &manifest.optional_dependencies,
        }
    }
}

/// A local dependency link between two packages in the same collection.
/// `target` is the index of the other end in the collection's ordered array.
#[derive(Debug, Clone)]
pub struct Edge {
    pub kind: DependencyKind,
    pub key: String,
    pub value: String,
    pub target: usize,
}

/// A package wired into a collection, decorated with selection state and a
/// per-package log sink.
#[derive(Debug)]
pub struct PackageNode {
    /// The absolute path to the package directory.
    pub dir: PathBuf,
    /// The parsed contents of the package.json file.
    pub manifest: Manifest,
    /// The package manager used to install dependencies.
    pub package_manager: PackageManager,
    /// True if this is the project root package.
    pub is_root: bool,
    /// True if the package has no package.json file.
    pub is_virtual: bool,
    /// Mutable flag toggled by filter expressions.
    pub is_selected: bool,
    pub log: PackageLogger,
}

impl PackageNode {
    pub fn name(&self) -> &str {
        self.manifest.name.as_deref().unwrap_or("")
    }
}

#[derive(Debug)]
pub(crate) struct BuiltGraph {
    pub root: usize,
    pub nodes: Vec<PackageNode>,
    pub dependencies: Vec<Vec<Edge>>,
    pub dependents: Vec<Vec<Edge>>,
}

/// Wire records into nodes, discover local dependency edges by manifest
/// name, and order the result dependency-first.
pub(crate) fn build_graph(root: PackageRecord, members: Vec<PackageRecord>) -> BuiltGraph {
    let single_package = members.is_empty();
    let mut tags = HashSet::new();
    let mut nodes: Vec<PackageNode> = members
        .into_iter()
        .map(|record| {
            let name = record.name().to_string();
            let short = name
                .strip_prefix('@')
                .and_then(|rest| rest.split_once('/'))
                .map(|(_, short)| short.to_string())
                .unwrap_or_else(|| name.clone());
            let tag = if tags.contains(&short) { name } else { short };
            tags.insert(tag.clone());

            PackageNode {
                dir: record.dir,
                manifest: record.manifest,
                package_manager: record.package_manager,
                is_root: false,
                is_virtual: record.is_virtual,
                is_selected: true,
                log: PackageLogger::new(Some(tag)),
            }
        })
        .collect();

    let root_index = nodes.len();
    nodes.push(PackageNode {
        dir: root.dir,
        manifest: root.manifest,
        package_manager: root.package_manager,
        is_root: true,
        is_virtual: root.is_virtual,
        // The root only participates by default in single-package projects.
        is_selected: single_package,
        log: PackageLogger::new(None),
    });

    let count = nodes.len();
    let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();

    for (index, node) in nodes.iter().enumerate() {
        let name = node.name();
        if !name.is_empty() {
            by_name.entry(name).or_default().push(index);
        }
    }

    let mut dependencies: Vec<Vec<Edge>> = vec![Vec::new(); count];
    let mut dependents: Vec<Vec<Edge>> = vec![Vec::new(); count];

    for dependent in 0..count {
        for kind in DEPENDENCY_KINDS {
            for (key, value) in kind.table(&nodes[dependent].manifest) {
                let id = alias_target(value).unwrap_or(key.as_str());

                // Every node sharing the target name gets an edge.
                for &target in by_name.get(id).map(Vec::as_slice).unwrap_or_default() {
                    dependencies[dependent].push(Edge {
                        kind,
                        key: key.clone(),
                        value: value.clone(),
                        target,
                    });
                    dependents[target].push(Edge {
                        kind,
                        key: key.clone(),
                        value: value.clone(),
                        target: dependent,
                    });
                }
            }
        }
    }

    // Depth-first post-order: dependencies come out ahead of their
    // dependents; the visited set keeps cycles from recursing forever.
    let mut visited = vec![false; count];
    let mut order = Vec::with_capacity(count);

    for index in 0..count {
        visit(index, &dependencies, &mut visited, &mut order);
    }

    let mut position = vec![0usize; count];
    for (new_index, &old_index) in order.iter().enumerate() {
        position[old_index] = new_index;
    }

    let nodes = permute(nodes, &position);
    let dependencies = permute(remap(dependencies, &position), &position);
    let dependents = permute(remap(dependents, &position), &position);

    BuiltGraph {
        root: position[root_index],
        nodes,
        dependencies,
        dependents,
    }
}

fn visit(index: usize, dependencies: &[Vec<Edge>], visited: &mut [bool], order: &mut Vec<usize>) {
    if visited[index] {
        return;
    }

    visited[index] = true;

    for edge in &dependencies[index] {
        visit(edge.target, dependencies, visited, order);
    }

    order.push(index);
}

fn permute<T>(items: Vec<T>, position: &[usize]) -> Vec<T> {
    let mut keyed: Vec<(usize, T)> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| (position[index], item))
        .collect();
    keyed.sort_by_key(|(new_index, _)| *new_index);
    keyed.into_iter().map(|(_, item)| item).collect()
}

fn remap(mut edges: Vec<Vec<Edge>>, position: &[usize]) -> Vec<Vec<Edge>> {
    for list in edges.iter_mut() {
        for edge in list.iter_mut() {
            edge.target = position[edge.target];
        }
    }
    edges
}

/// Extract the aliased package name from an `npm:` or `workspace:` protocol
/// value, e.g. `npm:foo@^1.0.0` resolves to `foo` and `workspace:@s/lib@*`
/// to `@s/lib`. Returns None when the value carries no usable alias, in
/// which case the declared key identifies the dependency.
pub(crate) fn alias_target(value: &str) -> Option<&str> {
    let rest = strip_prefix_ignore_case(value, "npm:")
        .or_else(|| strip_prefix_ignore_case(value, "workspace:"))?;

    let (name_start, name) = match rest.strip_prefix('@') {
        Some(after) => {
            let slash = after.find('/')?;
            let scope = &after[..slash];
            if scope.is_empty() || scope.chars().any(|c| c == '@' || c.is_whitespace()) {
                return None;
            }
            (slash + 2, &rest[slash + 2..])
        }
        None => (0, rest),
    };

    let first = name.chars().next()?;
    if !(first.is_ascii_alphabetic() || first == '_' || first == '.') {
        return None;
    }

    let end = name
        .find(|c: char| c == '@' || c.is_whitespace())
        .unwrap_or(name.len());

    Some(&rest[..name_start + end])
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.is_char_boundary(prefix.len()) && text[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}
