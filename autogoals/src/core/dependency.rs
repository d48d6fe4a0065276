//! Dependency graph built from the declared goal list.
//!
//! The graph is derived on every run and never persisted. Iteration always
//! follows declaration order so the produced ordering is reproducible.

use std::collections::{HashMap, HashSet};

use crate::error::DependencyError;
use crate::goal::Goal;

/// Adjacency view over a goal list: goal id -> ids it depends on.
#[derive(Debug, Clone)]
pub struct DependencyGraph<'a> {
    /// Goal ids in declaration order.
    ids: Vec<&'a str>,
    edges: HashMap<&'a str, &'a [String]>,
}

impl<'a> DependencyGraph<'a> {
    /// Build the graph, rejecting references to undeclared goals.
    pub fn build(goals: &'a [Goal]) -> Result<Self, DependencyError> {
        let edges: HashMap<&str, &[String]> = goals
            .iter()
            .map(|goal| (goal.id.as_str(), goal.dependencies.as_slice()))
            .collect();

        for goal in goals {
            if let Some(unknown) = goal
                .dependencies
                .iter()
                .find(|dep| !edges.contains_key(dep.as_str()))
            {
                return Err(DependencyError::UnknownDependency {
                    goal: goal.id.clone(),
                    dependency: unknown.clone(),
                });
            }
        }

        Ok(Self {
            ids: goals.iter().map(|goal| goal.id.as_str()).collect(),
            edges,
        })
    }

    pub fn dependencies(&self, id: &str) -> &'a [String] {
        self.edges.get(id).copied().unwrap_or_default()
    }

    /// Goals that list `id` directly, in declaration order.
    pub fn dependents(&self, id: &str) -> Vec<&'a str> {
        self.ids
            .iter()
            .copied()
            .filter(|candidate| self.dependencies(candidate).iter().any(|dep| dep == id))
            .collect()
    }

    /// Depth-first topological sort: every dependency precedes its dependents.
    ///
    /// A back edge to a goal still on the DFS stack is a cycle; the error path
    /// lists the ids from the first repeated goal around to itself.
    pub fn topological_order(&self) -> Result<Vec<String>, DependencyError> {
        let mut walk = Walk {
            graph: self,
            visiting: HashSet::new(),
            visited: HashSet::new(),
            path: Vec::new(),
            order: Vec::with_capacity(self.ids.len()),
        };
        for id in &self.ids {
            walk.visit(id)?;
        }
        Ok(walk.order)
    }
}

struct Walk<'g, 'a> {
    graph: &'g DependencyGraph<'a>,
    visiting: HashSet<&'a str>,
    visited: HashSet<&'a str>,
    path: Vec<&'a str>,
    order: Vec<String>,
}

impl<'a> Walk<'_, 'a> {
    fn visit(&mut self, id: &'a str) -> Result<(), DependencyError> {
        if self.visited.contains(id) {
            return Ok(());
        }
        if self.visiting.contains(id) {
            let start = self
                .path
                .iter()
                .position(|entry| *entry == id)
                .unwrap_or(0);
            let mut cycle: Vec<String> = self.path[start..]
                .iter()
                .map(|entry| entry.to_string())
                .collect();
            cycle.push(id.to_string());
            return Err(DependencyError::CircularDependency { path: cycle });
        }

        self.visiting.insert(id);
        self.path.push(id);
        for dep in self.graph.dependencies(id) {
            self.visit(dep.as_str())?;
        }
        self.path.pop();
        self.visiting.remove(id);
        self.visited.insert(id);
        self.order.push(id.to_string());
        Ok(())
    }
}

/// Validate references and cycles, returning the execution order.
pub fn validate_dependencies(goals: &[Goal]) -> Result<Vec<String>, DependencyError> {
    DependencyGraph::build(goals)?.topological_order()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::goal;

    fn position(order: &[String], id: &str) -> usize {
        order
            .iter()
            .position(|entry| entry == id)
            .unwrap_or_else(|| panic!("{id} missing from {order:?}"))
    }

    fn assert_dependencies_first(goals: &[Goal], order: &[String]) {
        assert_eq!(order.len(), goals.len());
        for goal in goals {
            for dep in &goal.dependencies {
                assert!(
                    position(order, dep) < position(order, &goal.id),
                    "{dep} must precede {} in {order:?}",
                    goal.id
                );
            }
        }
    }

    /// Edges of the declared graph, used to check reported cycles are real.
    fn has_edge(goals: &[Goal], from: &str, to: &str) -> bool {
        goals
            .iter()
            .any(|goal| goal.id == from && goal.dependencies.iter().any(|dep| dep == to))
    }

    #[test]
    fn empty_input_yields_empty_order() {
        assert!(validate_dependencies(&[]).expect("order").is_empty());
    }

    #[test]
    fn independent_goals_keep_declaration_order() {
        let goals = vec![goal("c", &[]), goal("a", &[]), goal("b", &[])];
        let order = validate_dependencies(&goals).expect("order");
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn dependencies_precede_dependents() {
        let goals = vec![
            goal("deploy", &["build", "test"]),
            goal("test", &["build"]),
            goal("build", &["setup"]),
            goal("setup", &[]),
            goal("docs", &["setup"]),
        ];
        let order = validate_dependencies(&goals).expect("order");
        assert_dependencies_first(&goals, &order);
        assert_eq!(order, vec!["setup", "build", "test", "deploy", "docs"]);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let goals = vec![
            goal("a", &[]),
            goal("b", &["a"]),
            goal("c", &["a"]),
            goal("d", &["b", "c"]),
        ];
        let order = validate_dependencies(&goals).expect("order");
        assert_dependencies_first(&goals, &order);
    }

    #[test]
    fn identical_input_gives_identical_order() {
        let goals = vec![
            goal("x", &["y", "z"]),
            goal("z", &[]),
            goal("y", &["z"]),
        ];
        let first = validate_dependencies(&goals).expect("first");
        let second = validate_dependencies(&goals).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_dependency_names_goal_and_id() {
        let goals = vec![goal("a", &[]), goal("b", &["a", "ghost"])];
        let err = validate_dependencies(&goals).expect_err("unknown");
        assert_eq!(
            err,
            DependencyError::UnknownDependency {
                goal: "b".to_string(),
                dependency: "ghost".to_string(),
            }
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let goals = vec![goal("a", &["a"])];
        let err = validate_dependencies(&goals).expect_err("cycle");
        assert_eq!(
            err,
            DependencyError::CircularDependency {
                path: vec!["a".to_string(), "a".to_string()],
            }
        );
    }

    #[test]
    fn reported_cycle_is_a_real_cycle() {
        // setup <- a <- b <- c <- a
        let goals = vec![
            goal("setup", &[]),
            goal("a", &["setup", "c"]),
            goal("b", &["a"]),
            goal("c", &["b"]),
        ];
        let err = validate_dependencies(&goals).expect_err("cycle");
        let DependencyError::CircularDependency { path } = err else {
            panic!("expected cycle error, got {err:?}");
        };
        assert_eq!(path, vec!["a", "c", "b", "a"]);
        assert_eq!(path.first(), path.last());
        for pair in path.windows(2) {
            assert!(
                has_edge(&goals, &pair[0], &pair[1]),
                "{} -> {} is not an edge",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn dependents_lists_direct_dependents_in_order() {
        let goals = vec![goal("a", &[]), goal("c", &["a"]), goal("b", &["a", "c"])];
        let graph = DependencyGraph::build(&goals).expect("graph");
        assert_eq!(graph.dependents("a"), vec!["c", "b"]);
        assert!(graph.dependents("b").is_empty());
    }
}
