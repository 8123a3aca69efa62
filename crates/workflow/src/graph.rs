//! # Graph
//!
//! A graph of nodes joined by optionally conditional edges. A graph is built
//! with `add_node` / `add_edge` / `set_entry_point` / `set_exit_point`, then
//! frozen by [`Graph::compile`]. Execution lives in [`crate::engine`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use itertools::Itertools;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use tracing::debug;

use crate::edge::{Condition, Edge};
use crate::error::{GraphError, Result};
use crate::node::{NodeHandler, NodeId, NodeMetadata};
use crate::schema::StateSchema;

/// A registered node.
#[derive(Clone)]
pub struct NodeEntry {
    pub handler: Arc<dyn NodeHandler>,
    pub metadata: NodeMetadata,
    /// The opaque descriptor this node was built from, if it came from a
    /// graph definition.
    pub descriptor: Option<serde_json::Value>,
}

impl std::fmt::Debug for NodeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeEntry")
            .field("metadata", &self.metadata)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Lookup tables built once by `compile`.
#[derive(Debug)]
struct Compiled {
    /// Outgoing edge indices per node, in insertion order.
    outgoing: HashMap<NodeId, Vec<usize>>,
    topology: DiGraph<NodeId, usize>,
    index: HashMap<NodeId, NodeIndex>,
}

/// A workflow graph.
///
/// Cloning is cheap: handlers and compiled tables are shared.
#[derive(Debug, Clone)]
pub struct Graph {
    id: String,
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, NodeEntry>,
    edges: Vec<Edge>,
    entry: Option<NodeId>,
    exits: BTreeSet<NodeId>,
    schema: Option<StateSchema>,
    compiled: Option<Arc<Compiled>>,
}

impl Graph {
    /// Create an empty graph.
    ///
    /// # Examples
    ///
    /// ```
    /// use braid_workflow::Graph;
    ///
    /// let graph = Graph::new("reasoning");
    /// assert_eq!(graph.node_count(), 0);
    /// assert!(!graph.is_compiled());
    /// ```
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            order: Vec::new(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            entry: None,
            exits: BTreeSet::new(),
            schema: None,
            compiled: None,
        }
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.compiled.is_some() {
            return Err(GraphError::already_compiled(&self.id));
        }
        Ok(())
    }

    fn ensure_node(&self, id: &str) -> Result<()> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(GraphError::unknown_node(id))
        }
    }

    /// Add a node.
    ///
    /// # Errors
    ///
    /// * `GraphError::DuplicateNode` if `id` is already present
    /// * `GraphError::AlreadyCompiled` after `compile`
    pub fn add_node(
        &mut self,
        id: impl Into<NodeId>,
        handler: Arc<dyn NodeHandler>,
        metadata: NodeMetadata,
    ) -> Result<()> {
        self.insert_node(
            id.into(),
            NodeEntry {
                handler,
                metadata,
                descriptor: None,
            },
        )
    }

    pub(crate) fn insert_node(&mut self, id: NodeId, entry: NodeEntry) -> Result<()> {
        self.ensure_mutable()?;
        if self.nodes.contains_key(&id) {
            return Err(GraphError::duplicate_node(id));
        }
        self.order.push(id.clone());
        self.nodes.insert(id, entry);
        Ok(())
    }

    /// Add an edge. `None` makes it unconditional.
    ///
    /// # Errors
    ///
    /// * `GraphError::UnknownNode` if either end is absent
    /// * `GraphError::AlreadyCompiled` after `compile`
    pub fn add_edge(
        &mut self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        condition: Option<Condition>,
    ) -> Result<()> {
        self.ensure_mutable()?;
        let source = source.into();
        let target = target.into();
        self.ensure_node(&source)?;
        self.ensure_node(&target)?;
        self.edges.push(Edge {
            source,
            target,
            condition,
        });
        Ok(())
    }

    /// Set where every run starts.
    ///
    /// # Errors
    ///
    /// Fails on an unknown node or after `compile`.
    pub fn set_entry_point(&mut self, id: impl Into<NodeId>) -> Result<()> {
        self.ensure_mutable()?;
        let id = id.into();
        self.ensure_node(&id)?;
        self.entry = Some(id);
        Ok(())
    }

    /// Mark a node as an exit point. A graph may have several.
    ///
    /// # Errors
    ///
    /// Fails on an unknown node or after `compile`.
    pub fn set_exit_point(&mut self, id: impl Into<NodeId>) -> Result<()> {
        self.ensure_mutable()?;
        let id = id.into();
        self.ensure_node(&id)?;
        self.exits.insert(id);
        Ok(())
    }

    /// Attach an advisory state schema.
    ///
    /// # Errors
    ///
    /// Fails after `compile`.
    pub fn define_state_schema(&mut self, schema: StateSchema) -> Result<()> {
        self.ensure_mutable()?;
        self.schema = Some(schema);
        Ok(())
    }

    /// Validate structure and freeze the graph.
    ///
    /// Nodes unreachable from the entry point are permitted. Compiling an
    /// already compiled graph is a no-op.
    ///
    /// # Errors
    ///
    /// * `GraphError::Empty` when there are no nodes
    /// * `GraphError::MissingEntryPoint` when no entry point was set
    /// * `GraphError::UnknownNode` when an edge or exit names a missing node
    pub fn compile(&mut self) -> Result<()> {
        if self.compiled.is_some() {
            return Ok(());
        }
        if self.nodes.is_empty() {
            return Err(GraphError::Empty(self.id.clone()));
        }
        let Some(entry) = &self.entry else {
            return Err(GraphError::MissingEntryPoint(self.id.clone()));
        };
        self.ensure_node(entry)?;
        for exit in &self.exits {
            self.ensure_node(exit)?;
        }

        let mut topology = DiGraph::with_capacity(self.order.len(), self.edges.len());
        let index: HashMap<NodeId, NodeIndex> = self
            .order
            .iter()
            .map(|id| (id.clone(), topology.add_node(id.clone())))
            .collect();

        let mut outgoing: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (i, edge) in self.edges.iter().enumerate() {
            let (Some(&from), Some(&to)) = (index.get(&edge.source), index.get(&edge.target))
            else {
                return Err(GraphError::unknown_node(format!(
                    "{} -> {}",
                    edge.source, edge.target
                )));
            };
            topology.add_edge(from, to, i);
            outgoing.entry(edge.source.clone()).or_default().push(i);
        }

        debug!(
            graph_id = %self.id,
            nodes = self.order.len(),
            edges = self.edges.len(),
            "Graph compiled"
        );

        self.compiled = Some(Arc::new(Compiled {
            outgoing,
            topology,
            index,
        }));
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    #[must_use]
    pub fn entry_point(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    #[must_use]
    pub fn exit_points(&self) -> &BTreeSet<NodeId> {
        &self.exits
    }

    #[must_use]
    pub fn is_exit_point(&self, id: &str) -> bool {
        self.exits.contains(id)
    }

    #[must_use]
    pub fn state_schema(&self) -> Option<&StateSchema> {
        self.schema.as_ref()
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeEntry> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// All edges in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outgoing edges of `id`, in insertion order.
    pub fn outgoing(&self, id: &str) -> Vec<&Edge> {
        match &self.compiled {
            Some(compiled) => compiled
                .outgoing
                .get(id)
                .map(|indices| indices.iter().filter_map(|&i| self.edges.get(i)).collect())
                .unwrap_or_default(),
            None => self.edges.iter().filter(|e| e.source == id).collect(),
        }
    }

    /// Build the petgraph view, reusing the compiled one when available.
    fn with_topology<T>(
        &self,
        f: impl FnOnce(&DiGraph<NodeId, usize>, &HashMap<NodeId, NodeIndex>) -> T,
    ) -> T {
        if let Some(compiled) = &self.compiled {
            return f(&compiled.topology, &compiled.index);
        }
        let mut topology = DiGraph::new();
        let index: HashMap<NodeId, NodeIndex> = self
            .order
            .iter()
            .map(|id| (id.clone(), topology.add_node(id.clone())))
            .collect();
        for (i, edge) in self.edges.iter().enumerate() {
            if let (Some(&from), Some(&to)) = (index.get(&edge.source), index.get(&edge.target)) {
                topology.add_edge(from, to, i);
            }
        }
        f(&topology, &index)
    }

    /// Nodes no path from the entry point reaches, in insertion order.
    ///
    /// Without an entry point every node is unreachable.
    #[must_use]
    pub fn unreachable_nodes(&self) -> Vec<NodeId> {
        self.with_topology(|topology, index| {
            let mut seen = BTreeSet::new();
            if let Some(start) = self.entry.as_ref().and_then(|e| index.get(e)) {
                let mut dfs = Dfs::new(topology, *start);
                while let Some(nx) = dfs.next(topology) {
                    seen.insert(nx);
                }
            }
            self.order
                .iter()
                .filter(|id| index.get(*id).is_none_or(|nx| !seen.contains(nx)))
                .cloned()
                .collect()
        })
    }

    /// Whether any cycle exists, e.g. `detect -> process -> update -> detect`.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        self.with_topology(|topology, _| is_cyclic_directed(topology))
    }

    /// Render as Graphviz DOT.
    ///
    /// The entry node is drawn bold, exit nodes as double circles, and
    /// conditional edges carry their condition name as a label.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let nodes = self.order.iter().map(|id| {
            let attrs = [
                (self.entry.as_deref() == Some(id.as_str())).then_some("style=bold"),
                self.exits.contains(id).then_some("shape=doublecircle"),
            ]
            .into_iter()
            .flatten()
            .join(", ");
            if attrs.is_empty() {
                format!("    \"{}\";", escape(id))
            } else {
                format!("    \"{}\" [{attrs}];", escape(id))
            }
        });
        let edges = self.edges.iter().map(|edge| match &edge.condition {
            Some(c) => format!(
                "    \"{}\" -> \"{}\" [label=\"{}\"];",
                escape(&edge.source),
                escape(&edge.target),
                escape(c.name())
            ),
            None => format!(
                "    \"{}\" -> \"{}\";",
                escape(&edge.source),
                escape(&edge.target)
            ),
        });

        let body = nodes.chain(edges).map(|line| line + "\n").collect::<String>();
        format!("digraph \"{}\" {{\n{body}}}\n", escape(&self.id))
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::node::NoOpNode;

    fn noop() -> Arc<dyn NodeHandler> {
        Arc::new(NoOpNode)
    }

    fn linear(ids: &[&str]) -> Graph {
        let mut graph = Graph::new("g");
        for id in ids {
            graph.add_node(*id, noop(), NodeMetadata::default()).unwrap();
        }
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1], None).unwrap();
        }
        graph.set_entry_point(ids[0]).unwrap();
        graph
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = Graph::new("g");
        graph.add_node("a", noop(), NodeMetadata::default()).unwrap();
        let err = graph
            .add_node("a", noop(), NodeMetadata::default())
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode("a".into()));
    }

    #[test]
    fn test_edge_to_missing_node_rejected() {
        let mut graph = linear(&["a"]);
        let err = graph.add_edge("a", "ghost", None).unwrap_err();
        assert_eq!(err, GraphError::UnknownNode("ghost".into()));
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_entry_and_exit_must_exist() {
        let mut graph = linear(&["a"]);
        assert!(graph.set_entry_point("ghost").is_err());
        assert!(graph.set_exit_point("ghost").is_err());
    }

    #[test]
    fn test_compile_requires_entry_point() {
        let mut graph = Graph::new("g");
        graph.add_node("a", noop(), NodeMetadata::default()).unwrap();
        assert_eq!(
            graph.compile().unwrap_err(),
            GraphError::MissingEntryPoint("g".into())
        );
        assert!(!graph.is_compiled());
    }

    #[test]
    fn test_compile_rejects_empty_graph() {
        let mut graph = Graph::new("g");
        assert_eq!(graph.compile().unwrap_err(), GraphError::Empty("g".into()));
    }

    #[test]
    fn test_compiled_graph_is_immutable() {
        let mut graph = linear(&["a", "b"]);
        graph.compile().unwrap();
        graph.compile().unwrap();

        let expected = GraphError::AlreadyCompiled("g".into());
        assert_eq!(
            graph.add_node("c", noop(), NodeMetadata::default()).unwrap_err(),
            expected
        );
        assert_eq!(graph.add_edge("b", "a", None).unwrap_err(), expected);
        assert_eq!(graph.set_entry_point("b").unwrap_err(), expected);
        assert_eq!(graph.set_exit_point("b").unwrap_err(), expected);
        assert_eq!(
            graph.define_state_schema(StateSchema::new()).unwrap_err(),
            expected
        );
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_unreachable_nodes_are_permitted() {
        let mut graph = linear(&["a", "b"]);
        graph
            .add_node("island", noop(), NodeMetadata::default())
            .unwrap();
        graph.compile().unwrap();
        assert_eq!(graph.unreachable_nodes(), vec!["island".to_string()]);
    }

    #[test]
    fn test_outgoing_preserves_insertion_order() {
        let mut graph = linear(&["a", "b", "c"]);
        graph.add_edge("a", "c", None).unwrap();
        let before: Vec<String> = graph.outgoing("a").iter().map(|e| e.target.clone()).collect();
        graph.compile().unwrap();
        let after: Vec<String> = graph.outgoing("a").iter().map(|e| e.target.clone()).collect();
        assert_eq!(before, vec!["b", "c"]);
        assert_eq!(before, after);
    }

    #[test]
    fn test_has_cycles() {
        let mut graph = linear(&["detect", "process", "update"]);
        assert!(!graph.has_cycles());
        graph.add_edge("update", "detect", None).unwrap();
        assert!(graph.has_cycles());
        graph.compile().unwrap();
        assert!(graph.has_cycles());
    }

    #[test]
    fn test_to_dot_marks_entry_exit_and_conditions() {
        let mut graph = linear(&["start", "end"]);
        graph
            .add_edge("end", "start", Some(Condition::truthy("again")))
            .unwrap();
        graph.set_exit_point("end").unwrap();

        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph \"g\" {"));
        assert!(dot.contains("\"start\" [style=bold];"));
        assert!(dot.contains("\"end\" [shape=doublecircle];"));
        assert!(dot.contains("\"start\" -> \"end\";"));
        assert!(dot.contains("\"end\" -> \"start\" [label=\"if:again\"];"));
        assert!(dot.ends_with("}\n"));
        assert_eq!(dot.lines().count(), 6);
    }
}
