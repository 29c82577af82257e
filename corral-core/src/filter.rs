use crate::graph::{Edge, PackageNode};

/// One parsed selection expression.
///
/// Grammar: `"!"? ("..." "^"?)? pattern ("^"? "...")?` where the pattern is
/// a shell glob matched against package names. A leading `...` closure pulls
/// in transitive dependents, a trailing one transitive dependencies, and `^`
/// next to a closure leaves the seed package itself untouched.
#[derive(Debug)]
pub(crate) struct FilterExpr {
    negate: bool,
    dependents: bool,
    exclusive_dependents: bool,
    dependencies: bool,
    exclusive_dependencies: bool,
    pattern: glob::Pattern,
}

impl FilterExpr {
    /// Returns None for blank patterns and invalid globs; those expressions
    /// are ignored without touching selection state.
    pub(crate) fn parse(expression: &str) -> Option<Self> {
        let mut rest = expression;

        let negate = match rest.strip_prefix('!') {
            Some(after) => {
                rest = after;
                true
            }
            None => false,
        };

        let mut dependents = false;
        let mut exclusive_dependents = false;

        if let Some(after) = rest.strip_prefix("...") {
            rest = after;
            dependents = true;
            if let Some(after) = rest.strip_prefix('^') {
                rest = after;
                exclusive_dependents = true;
            }
        }

        let mut dependencies = false;
        let mut exclusive_dependencies = false;

        if let Some(before) = rest.strip_suffix("...") {
            rest = before;
            dependencies = true;
            if let Some(before) = rest.strip_suffix('^') {
                rest = before;
                exclusive_dependencies = true;
            }
        }

        if rest.is_empty() {
            return None;
        }

        let pattern = glob::Pattern::new(rest).ok()?;

        Some(FilterExpr {
            negate,
            dependents,
            exclusive_dependents,
            dependencies,
            exclusive_dependencies,
            pattern,
        })
    }

    // With both closures present the seed is only spared when both carry a
    // caret; with one closure its own caret decides.
    fn exclusive(&self) -> bool {
        if self.dependents && self.dependencies {
            self.exclusive_dependents && self.exclusive_dependencies
        } else {
            self.exclusive_dependents || self.exclusive_dependencies
        }
    }
}

/// Apply expressions left to right, each one cumulatively mutating the
/// per-node selected flag.
pub(crate) fn apply<I, S>(
    nodes: &mut [PackageNode],
    dependencies: &[Vec<Edge>],
    dependents: &[Vec<Edge>],
    expressions: I,
) where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for expression in expressions {
        let Some(expr) = FilterExpr::parse(expression.as_ref()) else {
            continue;
        };

        let selected = !expr.negate;
        let seeds: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| expr.pattern.matches(node.name()))
            .map(|(index, _)| index)
            .collect();

        for seed in seeds {
            if !expr.exclusive() {
                nodes[seed].is_selected = selected;
            }

            if expr.dependencies {
                walk(seed, dependencies, nodes, selected);
            }

            if expr.dependents {
                walk(seed, dependents, nodes, selected);
            }
        }
    }
}

fn walk(seed: usize, edges: &[Vec<Edge>], nodes: &mut [PackageNode], selected: bool) {
    let mut visited = vec![false; nodes.len()];
    visited[seed] = true;

    let mut stack: Vec<usize> = edges[seed].iter().map(|edge| edge.target).collect();

    while let Some(index) = stack.pop() {
        if visited[index] {
            continue;
        }

        visited[index] = true;
        nodes[index].is_selected = selected;
        stack.extend(edges[index].iter().map(|edge| edge.target));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BuiltGraph, build_graph};
    use crate::testutil::record;

    // root depends on nothing; app -> lib -> base.
    fn chain() -> BuiltGraph {
        build_graph(
            record("/p", r#"{ "name": "root" }"#),
            vec![
                record("/p/app", r#"{ "name": "app", "dependencies": { "lib": "*" } }"#),
                record("/p/lib", r#"{ "name": "lib", "dependencies": { "base": "*" } }"#),
                record("/p/base", r#"{ "name": "base" }"#),
            ],
        )
    }

    fn run(graph: &mut BuiltGraph, expressions: &[&str]) {
        apply(
            &mut graph.nodes,
            &graph.dependencies,
            &graph.dependents,
            expressions.iter().copied(),
        );
    }

    fn selected(graph: &BuiltGraph, name: &str) -> bool {
        graph
            .nodes
            .iter()
            .find(|node| node.name() == name)
            .unwrap()
            .is_selected
    }

    #[test]
    fn test_negation_touches_only_the_match() {
        let mut graph = chain();
        run(&mut graph, &["!app"]);

        assert!(!selected(&graph, "app"));
        assert!(selected(&graph, "lib"));
        assert!(selected(&graph, "base"));
    }

    #[test]
    fn test_glob_pattern_matches_many() {
        let mut graph = build_graph(
            record("/p", r#"{ "name": "root" }"#),
            vec![
                record("/p/app-web", r#"{ "name": "app-web" }"#),
                record("/p/app-api", r#"{ "name": "app-api" }"#),
                record("/p/lib", r#"{ "name": "lib" }"#),
            ],
        );
        run(&mut graph, &["!*", "app-*"]);

        assert!(selected(&graph, "app-web"));
        assert!(selected(&graph, "app-api"));
        assert!(!selected(&graph, "lib"));
    }

    #[test]
    fn test_dependencies_closure() {
        let mut graph = chain();
        run(&mut graph, &["!*", "app..."]);

        assert!(selected(&graph, "app"));
        assert!(selected(&graph, "lib"));
        assert!(selected(&graph, "base"));
        assert!(!selected(&graph, "root"));
    }

    #[test]
    fn test_exclusive_dependencies_leaves_seed_unchanged() {
        let mut graph = chain();
        run(&mut graph, &["!*", "app^..."]);

        // The seed keeps whatever state it already had.
        assert!(!selected(&graph, "app"));
        assert!(selected(&graph, "lib"));
        assert!(selected(&graph, "base"));
    }

    #[test]
    fn test_dependents_closure() {
        let mut graph = chain();
        run(&mut graph, &["!*", "...base"]);

        assert!(selected(&graph, "base"));
        assert!(selected(&graph, "lib"));
        assert!(selected(&graph, "app"));
        assert!(!selected(&graph, "root"));
    }

    #[test]
    fn test_exclusive_dependents() {
        let mut graph = chain();
        run(&mut graph, &["!*", "...^base"]);

        assert!(!selected(&graph, "base"));
        assert!(selected(&graph, "lib"));
        assert!(selected(&graph, "app"));
    }

    #[test]
    fn test_both_closures_exclusive_needs_both_carets() {
        let expr = FilterExpr::parse("...^lib^...").unwrap();
        assert!(expr.exclusive());

        let expr = FilterExpr::parse("...lib^...").unwrap();
        assert!(!expr.exclusive());

        let expr = FilterExpr::parse("...^lib...").unwrap();
        assert!(!expr.exclusive());
    }

    #[test]
    fn test_idempotent_reapplication() {
        let mut graph = chain();
        run(&mut graph, &["!*", "app..."]);
        let first: Vec<bool> = graph.nodes.iter().map(|n| n.is_selected).collect();

        run(&mut graph, &["app..."]);
        let second: Vec<bool> = graph.nodes.iter().map(|n| n.is_selected).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_blank_and_invalid_expressions_are_ignored() {
        let mut graph = chain();
        let before: Vec<bool> = graph.nodes.iter().map(|n| n.is_selected).collect();

        run(&mut graph, &["", "...", "^...", "[", "!"]);
        let after: Vec<bool> = graph.nodes.iter().map(|n| n.is_selected).collect();

        assert_eq!(before, after);
    }

    #[test]
    fn test_closure_walk_survives_cycles() {
        let mut graph = build_graph(
            record("/p", r#"{ "name": "root" }"#),
            vec![
                record("/p/a", r#"{ "name": "a", "dependencies": { "b": "*" } }"#),
                record("/p/b", r#"{ "name": "b", "dependencies": { "a": "*" } }"#),
            ],
        );
        run(&mut graph, &["!*", "a..."]);

        assert!(selected(&graph, "a"));
        assert!(selected(&graph, "b"));
    }
}
