// malt-common/src/dependency/resolver.rs
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::{MaltError, Result};
use crate::model::formula::Formula;
use crate::registry::Formulary;

/// Three-color DFS marking. An in-progress node reached again means the
/// dependency graph has a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

pub struct DependencyResolver<'a> {
    formulary: &'a Formulary,
    marks: HashMap<String, Mark>,
    // Current DFS path, used to report the offending cycle.
    stack: Vec<String>,
    order: Vec<Arc<Formula>>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(formulary: &'a Formulary) -> Self {
        Self {
            formulary,
            marks: HashMap::new(),
            stack: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Post-order installation sequence for `root`: every formula appears
    /// exactly once, strictly after all of its dependencies.
    pub fn resolve_order(mut self, root: &str) -> Result<Vec<Arc<Formula>>> {
        debug!("Starting dependency resolution for target: {root}");
        self.visit(root)?;
        debug!(
            "Resolved install order for '{}': {:?}",
            root,
            self.order.iter().map(|f| f.name()).collect::<Vec<_>>()
        );
        Ok(self.order)
    }

    fn visit(&mut self, name: &str) -> Result<()> {
        match self.marks.get(name) {
            Some(Mark::Done) => {
                debug!("'{name}' already resolved, skipping");
                return Ok(());
            }
            Some(Mark::InProgress) => {
                let cycle = self.cycle_path(name);
                error!(
                    "Dependency cycle detected: {}",
                    cycle.join(" -> ")
                );
                return Err(MaltError::Cycle(cycle));
            }
            None => {}
        }

        let formula = self.formulary.lookup(name)?;
        self.marks.insert(name.to_string(), Mark::InProgress);
        self.stack.push(name.to_string());

        for dep_name in &formula.dependencies {
            debug!("Resolving edge: '{}' depends on '{}'", name, dep_name);
            self.visit(dep_name)?;
        }

        self.stack.pop();
        self.marks.insert(name.to_string(), Mark::Done);
        self.order.push(formula);
        Ok(())
    }

    /// Slice the DFS stack from the first occurrence of the repeated node
    /// and close the loop, e.g. a -> b -> a.
    fn cycle_path(&self, repeated: &str) -> Vec<String> {
        let start = self
            .stack
            .iter()
            .position(|n| n == repeated)
            .unwrap_or(0);
        let mut path: Vec<String> = self.stack[start..].to_vec();
        path.push(repeated.to_string());
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::formula::InstallStep;

    fn formula(name: &str, deps: &[&str]) -> Formula {
        Formula {
            name: name.to_string(),
            description: None,
            homepage: None,
            source_url: format!("https://example.org/{name}.tar.gz"),
            content_hash: "deadbeef".to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            install: vec![InstallStep::RunBuildTool {
                tool: "make".to_string(),
                args: vec!["install".to_string()],
            }],
            test: None,
        }
    }

    fn formulary(formulas: Vec<Formula>) -> Formulary {
        let mut formulary = Formulary::new();
        for f in formulas {
            formulary.insert(f).unwrap();
        }
        formulary
    }

    fn order_names(formulary: &Formulary, root: &str) -> Result<Vec<String>> {
        DependencyResolver::new(formulary)
            .resolve_order(root)
            .map(|fs| fs.iter().map(|f| f.name().to_string()).collect())
    }

    #[test]
    fn dependency_precedes_dependent() {
        let formulary = formulary(vec![formula("a", &["b"]), formula("b", &[])]);
        assert_eq!(order_names(&formulary, "a").unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn diamond_emits_each_name_once() {
        let formulary = formulary(vec![
            formula("a", &["b", "c"]),
            formula("b", &["d"]),
            formula("c", &["d"]),
            formula("d", &[]),
        ]);
        let order = order_names(&formulary, "a").unwrap();
        assert_eq!(order.len(), 4);
        let idx = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(idx("d") < idx("b"));
        assert!(idx("d") < idx("c"));
        assert!(idx("b") < idx("a"));
        assert!(idx("c") < idx("a"));
    }

    #[test]
    fn two_node_cycle_fails_with_path() {
        let formulary = formulary(vec![formula("a", &["b"]), formula("b", &["a"])]);
        match order_names(&formulary, "a") {
            Err(MaltError::Cycle(path)) => {
                assert_eq!(path, vec!["a", "b", "a"]);
            }
            other => panic!("expected CycleError, got {other:?}"),
        }
    }

    #[test]
    fn self_cycle_fails() {
        let formulary = formulary(vec![formula("a", &["a"])]);
        assert!(matches!(
            order_names(&formulary, "a"),
            Err(MaltError::Cycle(_))
        ));
    }

    #[test]
    fn missing_dependency_is_not_found() {
        let formulary = formulary(vec![formula("a", &["ghost"])]);
        match order_names(&formulary, "a") {
            Err(MaltError::NotFound(name)) => assert_eq!(name, "ghost"),
            other => panic!("expected NotFoundError, got {other:?}"),
        }
    }
}
