//! Dependency graph over element instances.
//!
//! Structural tree edges (a parent needs its children's parsed values) are
//! merged with requirement edges (a dependent needs its candidates'
//! values), then the union is reversed so that a topological sort yields
//! producers before consumers. Pass-input requirements contribute no edges;
//! they resolve from the caller's mapping, not from other instances.

use crate::context::Context;
use crate::element::Registry;
use crate::requirements::RequirementSource;
use indexmap::IndexSet;
use keystone_core::{CompileError, CompileResult};
use std::collections::BTreeSet;

/// Directed dependency graph over arena indices.
pub struct DependencyGraph {
    /// `dependencies[i]`: instances `i` needs evaluated first
    dependencies: Vec<IndexSet<usize>>,
    /// Reverse edges: instances waiting on `i`
    dependents: Vec<IndexSet<usize>>,
}

impl DependencyGraph {
    /// Build the graph for a parse tree.
    ///
    /// # Errors
    ///
    /// Returns a schema-API error if an instance's element type is missing
    /// from the registry.
    pub fn build(context: &Context, registry: &Registry) -> CompileResult<Self> {
        let n = context.len();
        let mut graph = Self {
            dependencies: vec![IndexSet::new(); n],
            dependents: vec![IndexSet::new(); n],
        };

        for node in context.nodes() {
            // Structural edges: a parent's default parse reads its children.
            for &child in &node.children {
                graph.add_edge(node.index, child);
            }

            // Requirement edges: one per accepted candidate per spec.
            let ty = registry.get(node.tag)?;
            for group in &ty.requires {
                let RequirementSource::Element(tag) = group.source else {
                    continue;
                };
                for spec in &group.specs {
                    // A predicate that accepts its own instance (a
                    // self-referential derived_from) keeps the self-edge so
                    // the cycle check catches it; value resolution never
                    // reads from self.
                    for &candidate in context.instances(tag) {
                        match &spec.predicate {
                            Some(predicate) => {
                                if !predicate(context, node.index, candidate) {
                                    continue;
                                }
                            }
                            None => {
                                if candidate == node.index {
                                    continue;
                                }
                            }
                        }
                        graph.add_edge(node.index, candidate);
                    }
                }
            }
        }

        Ok(graph)
    }

    fn add_edge(&mut self, dependent: usize, dependency: usize) {
        self.dependencies[dependent].insert(dependency);
        self.dependents[dependency].insert(dependent);
    }

    /// Instances `index` depends on.
    #[must_use]
    pub fn dependencies(&self, index: usize) -> &IndexSet<usize> {
        &self.dependencies[index]
    }

    /// Full topological order of the reversed graph: producers first, ties
    /// broken by discovery order.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::DependencyCycle`] naming the participating
    /// instances, in order, with the closing repeat.
    pub fn evaluation_order(&self, context: &Context) -> CompileResult<Vec<usize>> {
        let n = self.dependencies.len();
        let mut pending: Vec<usize> = self.dependencies.iter().map(IndexSet::len).collect();
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(&index) = ready.iter().next() {
            ready.remove(&index);
            order.push(index);
            for &dependent in &self.dependents[index] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < n {
            let names = self.extract_cycle(context, &pending);
            return Err(CompileError::DependencyCycle { names });
        }

        Ok(order)
    }

    /// Walk the unprocessed subgraph until a node repeats; every remaining
    /// node still has a remaining dependency, so the walk must close.
    fn extract_cycle(&self, context: &Context, pending: &[usize]) -> Vec<String> {
        let remaining: IndexSet<usize> =
            (0..pending.len()).filter(|&i| pending[i] > 0).collect();
        let Some(&start) = remaining.iter().min() else {
            return Vec::new();
        };

        let mut path: Vec<usize> = Vec::new();
        let mut current = start;
        let cycle: Vec<usize> = loop {
            if let Some(position) = path.iter().position(|&i| i == current) {
                break path[position..].to_vec();
            }
            path.push(current);
            current = *self.dependencies[current]
                .iter()
                .find(|i| remaining.contains(*i))
                .unwrap_or(&current);
        };

        // Canonical rotation: start the report at the smallest index.
        let pivot = cycle
            .iter()
            .enumerate()
            .min_by_key(|&(_, &i)| i)
            .map_or(0, |(p, _)| p);
        let mut names: Vec<String> = cycle[pivot..]
            .iter()
            .chain(cycle[..pivot].iter())
            .map(|&i| context.node(i).name.clone())
            .collect();
        if let Some(first) = names.first().cloned() {
            names.push(first);
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementTag, ElementType};
    use crate::requirements::{RequirementGroup, RequirementSpec};
    use crate::schema::{DictField, ScalarKind, Schema};
    use serde_json::json;

    const ROOT: ElementTag = ElementTag("root");
    const LEFT: ElementTag = ElementTag("left");
    const RIGHT: ElementTag = ElementTag("right");

    fn registry(right_requires_left: bool) -> Registry {
        let mut registry = Registry::new();
        registry
            .define(ElementType::new(
                ROOT,
                Schema::dict([DictField::new("left", LEFT), DictField::new("right", RIGHT)]),
            ))
            .unwrap();
        registry
            .define(ElementType::new(LEFT, Schema::Scalar(ScalarKind::Any)))
            .unwrap();
        let mut right = ElementType::new(RIGHT, Schema::Scalar(ScalarKind::Any));
        if right_requires_left {
            right = right.requires(RequirementGroup::on_element(
                LEFT,
                vec![RequirementSpec::parsed("left_value")],
            ));
        }
        registry.define(right).unwrap();
        registry.validate().unwrap();
        registry
    }

    #[test]
    fn test_children_precede_parent() {
        let registry = registry(false);
        let context =
            Context::build(&registry, ROOT, json!({"left": 1, "right": 2})).unwrap();
        let graph = DependencyGraph::build(&context, &registry).unwrap();
        let order = graph.evaluation_order(&context).unwrap();

        let pos = |i: usize| order.iter().position(|&x| x == i).unwrap();
        // root is index 0; both children evaluate before it
        assert!(pos(1) < pos(0));
        assert!(pos(2) < pos(0));
    }

    #[test]
    fn test_requirement_edge_orders_producer_first() {
        let registry = registry(true);
        let context =
            Context::build(&registry, ROOT, json!({"left": 1, "right": 2})).unwrap();
        let graph = DependencyGraph::build(&context, &registry).unwrap();
        let order = graph.evaluation_order(&context).unwrap();

        let left = context.instances(LEFT)[0];
        let right = context.instances(RIGHT)[0];
        let pos = |i: usize| order.iter().position(|&x| x == i).unwrap();
        assert!(pos(left) < pos(right));
        assert!(graph.dependencies(right).contains(&left));
    }

    #[test]
    fn test_ties_break_by_discovery_order() {
        let registry = registry(false);
        let context =
            Context::build(&registry, ROOT, json!({"left": 1, "right": 2})).unwrap();
        let graph = DependencyGraph::build(&context, &registry).unwrap();
        let order = graph.evaluation_order(&context).unwrap();
        // both leaves are ready at once; discovery order wins
        assert_eq!(order, vec![1, 2, 0]);
    }
}
