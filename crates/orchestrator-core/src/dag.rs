// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Dependency-graph analysis over a workflow's steps: cycle rejection and
//! topological layering. The resolver calls [`validate_acyclic`] before a
//! workflow is accepted; the executor calls [`execution_layers`] as the
//! dependency-driven refinement of `buildStepExecutionGroups` permitted
//! alongside explicit `parallel_group` numbers.

use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::error::{OrchestratorError, Result};
use crate::workflow::Step;

fn build_graph(steps: &[Step]) -> (DiGraph<String, ()>, HashMap<String, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut indices = HashMap::new();
    for step in steps {
        let idx = graph.add_node(step.name.clone());
        indices.insert(step.name.clone(), idx);
    }
    for step in steps {
        let to = indices[&step.name];
        for dep in &step.depends_on {
            if let Some(&from) = indices.get(dep) {
                graph.add_edge(from, to, ());
            }
        }
    }
    (graph, indices)
}

/// Rejects a `depends_on` graph that contains a cycle. Assumes
/// `Workflow::validate` already ran, so every `depends_on` entry names a
/// real step.
pub fn validate_acyclic(steps: &[Step]) -> Result<()> {
    let (graph, _) = build_graph(steps);
    if toposort(&graph, None).is_ok() {
        return Ok(());
    }
    let offending = kosaraju_scc(&graph)
        .into_iter()
        .find(|component| component.len() > 1)
        .and_then(|component| component.first().map(|idx| graph[*idx].clone()))
        .unwrap_or_else(|| "<unknown>".to_string());
    Err(OrchestratorError::DependencyCycle { step: offending })
}

/// Groups step names into dependency layers: layer 0 has no dependencies,
/// layer N depends only on steps in layers `< N`. Steps within a layer have
/// no ordering constraint between them from the dependency graph alone;
/// `parallel_group` and `parallel` still gate whether they may actually run
/// concurrently.
pub fn execution_layers(steps: &[Step]) -> Result<Vec<Vec<String>>> {
    let (graph, indices) = build_graph(steps);
    let order = toposort(&graph, None).map_err(|cycle| OrchestratorError::DependencyCycle {
        step: graph[cycle.node_id()].clone(),
    })?;

    let mut layer_of: HashMap<NodeIndex, usize> = HashMap::new();
    for idx in &order {
        let layer = graph
            .neighbors_directed(*idx, petgraph::Direction::Incoming)
            .map(|pred| layer_of.get(&pred).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        layer_of.insert(*idx, layer);
    }

    let max_layer = layer_of.values().copied().max().unwrap_or(0);
    let mut layers: Vec<Vec<String>> = vec![Vec::new(); max_layer + 1];
    for step in steps {
        let idx = indices[&step.name];
        layers[layer_of[&idx]].push(step.name.clone());
    }
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn step(name: &str, depends_on: &[&str]) -> Step {
        Step {
            name: name.to_string(),
            step_type: "noop".to_string(),
            config: Map::new(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            parallel: false,
            parallel_group: 0,
            when: None,
            if_condition: None,
            unless: None,
            env: Map::new(),
            set_variables: Map::new(),
            output_file: None,
            outputs: vec![],
            resource: None,
            timeout: None,
        }
    }

    #[test]
    fn accepts_acyclic_graph() {
        let steps = vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])];
        assert!(validate_acyclic(&steps).is_ok());
    }

    #[test]
    fn rejects_cycle() {
        let steps = vec![step("a", &["b"]), step("b", &["a"])];
        assert!(matches!(
            validate_acyclic(&steps),
            Err(OrchestratorError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn layers_respect_diamond_dependency() {
        // a -> b, a -> c, b -> d, c -> d
        let steps = vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ];
        let layers = execution_layers(&steps).unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0], vec!["a".to_string()]);
        let mut layer1 = layers[1].clone();
        layer1.sort();
        assert_eq!(layer1, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(layers[2], vec!["d".to_string()]);
    }

    #[test]
    fn independent_steps_share_layer_zero() {
        let steps = vec![step("a", &[]), step("b", &[])];
        let layers = execution_layers(&steps).unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].len(), 2);
    }
}
