//! The in-memory execution graph.
//!
//! Built once per run from a validated definition; gives the scheduler
//! constant-time access to a node's incoming and outgoing edges.

use std::collections::{BTreeMap, HashMap};

use weft_core::{Edge, Node, NodeId, WorkflowDefinition, WorkflowResult};

/// Adjacency view of one definition version.
#[derive(Debug)]
pub struct ExecutionGraph {
    nodes: BTreeMap<NodeId, Node>,
    incoming: HashMap<NodeId, Vec<Edge>>,
    outgoing: HashMap<NodeId, Vec<Edge>>,
}

impl ExecutionGraph {
    /// Validate the definition and build the adjacency maps.
    ///
    /// # Errors
    ///
    /// [`weft_core::WorkflowError::InvalidDefinition`] for structural
    /// violations (duplicate ids, dangling edges, cycles).
    pub fn build(definition: &WorkflowDefinition) -> WorkflowResult<Self> {
        definition.validate()?;

        let nodes: BTreeMap<NodeId, Node> = definition
            .nodes
            .iter()
            .map(|n| (n.id.clone(), n.clone()))
            .collect();
        let mut incoming: HashMap<NodeId, Vec<Edge>> =
            nodes.keys().map(|id| (id.clone(), Vec::new())).collect();
        let mut outgoing: HashMap<NodeId, Vec<Edge>> =
            nodes.keys().map(|id| (id.clone(), Vec::new())).collect();
        for edge in &definition.edges {
            if let Some(list) = incoming.get_mut(&edge.target) {
                list.push(edge.clone());
            }
            if let Some(list) = outgoing.get_mut(&edge.source) {
                list.push(edge.clone());
            }
        }

        Ok(Self {
            nodes,
            incoming,
            outgoing,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes. Never true for a built graph.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Incoming edges of a node, in definition order.
    #[must_use]
    pub fn incoming(&self, id: &NodeId) -> &[Edge] {
        self.incoming.get(id).map_or(&[], Vec::as_slice)
    }

    /// Outgoing edges of a node, in definition order.
    #[must_use]
    pub fn outgoing(&self, id: &NodeId) -> &[Edge] {
        self.outgoing.get(id).map_or(&[], Vec::as_slice)
    }

    /// Zero-in-degree nodes: the trigger frontier, in id order.
    pub fn roots(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes
            .keys()
            .filter(|id| self.incoming(id).is_empty())
    }

    /// Zero-out-degree nodes: the sinks whose outputs form the execution
    /// output, in id order.
    pub fn sinks(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes
            .keys()
            .filter(|id| self.outgoing(id).is_empty())
    }
}
