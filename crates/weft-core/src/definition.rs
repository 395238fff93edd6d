//! Workflow definitions: directed acyclic graphs of nodes and edges.
//!
//! A definition is immutable once saved; every edit produces a new version.
//! [`WorkflowDefinition::validate`] enforces the structural invariants the
//! executor relies on: unique ids, resolvable edge endpoints, and acyclicity.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::types::{EdgeId, NodeId};

/// What the executor does when a node fails after exhausting its retries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "handler")]
pub enum OnErrorPolicy {
    /// Fail the whole execution. This is the default.
    #[default]
    Stop,
    /// Downstream edges receive `null`; the execution continues.
    Continue,
    /// Route to a designated handler node instead of the regular targets.
    Catch(NodeId),
}

/// One node of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Editor-chosen id, unique within the definition.
    pub id: NodeId,
    /// Action kind resolved through the action registry at run time.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Canvas position. Carried verbatim for the editor; ignored by the executor.
    #[serde(default)]
    pub position: (f64, f64),
    /// Typed configuration blob. Template expressions are interpolated per step.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Failure policy for this node.
    #[serde(default)]
    pub on_error: OnErrorPolicy,
}

/// A directed edge between two nodes, optionally tagged with ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Editor-chosen id, unique within the definition.
    pub id: EdgeId,
    /// Producing node.
    pub source: NodeId,
    /// Consuming node.
    pub target: NodeId,
    /// Output port on the source (control nodes select among these).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    /// Input port on the target, naming the slot the value lands in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<String>,
}

/// A workflow definition: a DAG of [`Node`]s connected by [`Edge`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// All nodes of the graph.
    pub nodes: Vec<Node>,
    /// All edges of the graph.
    pub edges: Vec<Edge>,
}

/// Structural violations detected by [`WorkflowDefinition::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    /// Two nodes share the same id.
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// Two edges share the same id.
    #[error("duplicate edge id: {0}")]
    DuplicateEdge(EdgeId),

    /// An edge references a node that does not exist.
    #[error("edge {edge} references unknown node {node}")]
    DanglingEdge {
        /// The offending edge.
        edge: EdgeId,
        /// The endpoint that could not be resolved.
        node: NodeId,
    },

    /// The graph contains a cycle.
    #[error("definition contains a cycle through {0}")]
    Cycle(NodeId),

    /// The definition has no nodes.
    #[error("definition has no nodes")]
    Empty,
}

impl WorkflowDefinition {
    /// Build a definition from parts.
    #[must_use]
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Edges entering `id`.
    pub fn incoming(&self, id: &NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| &e.target == id)
    }

    /// Edges leaving `id`.
    pub fn outgoing(&self, id: &NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| &e.source == id)
    }

    /// Validate the structural invariants: node/edge id uniqueness, edge
    /// endpoints resolving to existing nodes, and acyclicity (Kahn's
    /// algorithm).
    ///
    /// # Errors
    ///
    /// Returns the first [`DefinitionError`] encountered.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.nodes.is_empty() {
            return Err(DefinitionError::Empty);
        }

        let mut node_ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !node_ids.insert(&node.id) {
                return Err(DefinitionError::DuplicateNode(node.id.clone()));
            }
        }

        let mut edge_ids = HashSet::with_capacity(self.edges.len());
        for edge in &self.edges {
            if !edge_ids.insert(&edge.id) {
                return Err(DefinitionError::DuplicateEdge(edge.id.clone()));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !node_ids.contains(endpoint) {
                    return Err(DefinitionError::DanglingEdge {
                        edge: edge.id.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
        }

        // Kahn's algorithm: repeatedly peel zero-in-degree nodes. Anything
        // left over sits on a cycle.
        let mut in_degree: HashMap<&NodeId, usize> =
            self.nodes.iter().map(|n| (&n.id, 0)).collect();
        for edge in &self.edges {
            if let Some(d) = in_degree.get_mut(&edge.target) {
                *d += 1;
            }
        }

        let mut queue: VecDeque<&NodeId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            for edge in self.outgoing(id) {
                if let Some(d) = in_degree.get_mut(&edge.target) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(&edge.target);
                    }
                }
            }
        }

        if visited != self.nodes.len() {
            let on_cycle = in_degree
                .into_iter()
                .find(|(_, d)| *d > 0)
                .map(|(id, _)| id.clone())
                .unwrap_or_else(|| self.nodes[0].id.clone());
            return Err(DefinitionError::Cycle(on_cycle));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node {
            id: NodeId::new(id),
            node_type: "transform".to_owned(),
            position: (0.0, 0.0),
            config: serde_json::Value::Null,
            on_error: OnErrorPolicy::Stop,
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> Edge {
        Edge {
            id: EdgeId::new(id),
            source: NodeId::new(source),
            target: NodeId::new(target),
            source_port: None,
            target_port: None,
        }
    }

    #[test]
    fn linear_chain_is_valid() {
        let def = WorkflowDefinition::new(
            vec![node("a"), node("b"), node("c")],
            vec![edge("e1", "a", "b"), edge("e2", "b", "c")],
        );
        assert!(def.validate().is_ok());
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let def = WorkflowDefinition::new(vec![node("a"), node("a")], vec![]);
        assert_eq!(
            def.validate(),
            Err(DefinitionError::DuplicateNode(NodeId::new("a")))
        );
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let def = WorkflowDefinition::new(vec![node("a")], vec![edge("e1", "a", "ghost")]);
        assert!(matches!(
            def.validate(),
            Err(DefinitionError::DanglingEdge { .. })
        ));
    }

    #[test]
    fn cycle_is_rejected() {
        let def = WorkflowDefinition::new(
            vec![node("a"), node("b")],
            vec![edge("e1", "a", "b"), edge("e2", "b", "a")],
        );
        assert!(matches!(def.validate(), Err(DefinitionError::Cycle(_))));
    }

    #[test]
    fn empty_definition_is_rejected() {
        assert_eq!(
            WorkflowDefinition::default().validate(),
            Err(DefinitionError::Empty)
        );
    }

    #[test]
    fn on_error_defaults_to_stop() {
        let json = serde_json::json!({
            "id": "n1",
            "type": "http",
        });
        let node: Node = serde_json::from_value(json).unwrap();
        assert_eq!(node.on_error, OnErrorPolicy::Stop);
    }
}
