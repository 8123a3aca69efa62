//! Graph definition interchange.
//!
//! Tooling describes graphs as data:
//!
//! ```yaml
//! entry_point: detect
//! exit_points: [done]
//! nodes:
//!   detect: { handler: increment, key: rounds }
//!   process: noop
//!   done: { handler: set, values: { finished: true } }
//! edges:
//!   - { source: detect, target: process }
//!   - { source: process, target: done, condition: "if:ready" }
//!   - { source: process, target: detect, condition: default }
//! state_schema:
//!   rounds: integer
//! ```
//!
//! Node descriptors are opaque here; a [`NodeRegistry`] turns each into a
//! handler. Condition names are resolved through a [`ConditionRegistry`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::edge::DEFAULT_CONDITION;
use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeEntry};
use crate::node::{NodeId, NodeMetadata};
use crate::registry::{ConditionRegistry, NodeRegistry};
use crate::schema::StateSchema;

/// One edge in a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub source: NodeId,
    pub target: NodeId,
    /// Condition name; absent, empty or `"default"` is unconditional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// A graph described as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub entry_point: NodeId,
    #[serde(default)]
    pub exit_points: Vec<NodeId>,
    /// Node id to opaque descriptor, in declaration order.
    pub nodes: Map<String, Value>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    #[serde(default, skip_serializing_if = "StateSchema::is_empty")]
    pub state_schema: StateSchema,
}

impl GraphDefinition {
    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::InvalidDefinition` on malformed input.
    pub fn from_json(text: &str) -> Result<Self> {
        braid_core::config::parse(text, braid_core::config::Format::Json)
            .map_err(|e| GraphError::InvalidDefinition(e.to_string()))
    }

    /// Parse a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::InvalidDefinition` on malformed input.
    pub fn from_yaml(text: &str) -> Result<Self> {
        braid_core::config::parse(text, braid_core::config::Format::Yaml)
            .map_err(|e| GraphError::InvalidDefinition(e.to_string()))
    }

    /// Load a definition file; the format follows the extension.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::InvalidDefinition` when the file cannot be read
    /// or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        braid_core::config::load(path).map_err(|e| GraphError::InvalidDefinition(e.to_string()))
    }

    /// Build and compile a graph.
    ///
    /// # Errors
    ///
    /// Any structural error, plus `UnknownHandler` / `UnknownCondition` /
    /// `InvalidDescriptor` for names the registries cannot resolve.
    pub fn build(
        &self,
        graph_id: impl Into<String>,
        nodes: &NodeRegistry,
        conditions: &ConditionRegistry,
    ) -> Result<Graph> {
        let mut graph = Graph::new(graph_id);
        self.populate(&mut graph, nodes, conditions)?;
        graph.compile()?;
        debug!(
            graph_id = %graph.id(),
            nodes = graph.node_count(),
            edges = graph.edges().len(),
            "Built graph from definition"
        );
        Ok(graph)
    }

    /// Add this definition's nodes, edges, entry/exit points and schema to
    /// an existing uncompiled graph.
    ///
    /// # Errors
    ///
    /// Same as [`GraphDefinition::build`], plus `AlreadyCompiled`.
    pub fn populate(
        &self,
        graph: &mut Graph,
        nodes: &NodeRegistry,
        conditions: &ConditionRegistry,
    ) -> Result<()> {
        for (id, descriptor) in &self.nodes {
            let handler = nodes.resolve(id, descriptor)?;
            let metadata = descriptor
                .get("description")
                .and_then(Value::as_str)
                .map(NodeMetadata::described)
                .unwrap_or_default();
            graph.insert_node(
                id.clone(),
                NodeEntry {
                    handler,
                    metadata,
                    descriptor: Some(descriptor.clone()),
                },
            )?;
        }
        for edge in &self.edges {
            let condition = match edge.condition.as_deref() {
                Some(name) => conditions.resolve(name)?,
                None => None,
            };
            graph.add_edge(edge.source.clone(), edge.target.clone(), condition)?;
        }
        graph.set_entry_point(self.entry_point.clone())?;
        for exit in &self.exit_points {
            graph.set_exit_point(exit.clone())?;
        }
        if !self.state_schema.is_empty() {
            graph.define_state_schema(self.state_schema.clone())?;
        }
        Ok(())
    }

    /// Describe an existing graph.
    ///
    /// Nodes added in code carry no descriptor and are exported by id, so a
    /// registry must hold a handler under that id to rebuild them.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::MissingEntryPoint` when the graph has none.
    pub fn from_graph(graph: &Graph) -> Result<Self> {
        let entry_point = graph
            .entry_point()
            .ok_or_else(|| GraphError::MissingEntryPoint(graph.id().to_string()))?
            .to_string();

        let nodes = graph
            .node_ids()
            .map(|id| {
                let descriptor = graph
                    .node(id)
                    .and_then(|n| n.descriptor.clone())
                    .unwrap_or_else(|| Value::String(id.to_string()));
                (id.to_string(), descriptor)
            })
            .collect();

        let edges = graph
            .edges()
            .iter()
            .map(|e| EdgeDefinition {
                source: e.source.clone(),
                target: e.target.clone(),
                condition: match e.condition_name() {
                    DEFAULT_CONDITION => None,
                    name => Some(name.to_string()),
                },
            })
            .collect();

        Ok(Self {
            entry_point,
            exit_points: graph.exit_points().iter().cloned().collect(),
            nodes,
            edges,
            state_schema: graph.state_schema().cloned().unwrap_or_default(),
        })
    }

    /// Serialize as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::InvalidDefinition` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| GraphError::InvalidDefinition(e.to_string()))
    }

    /// Serialize as YAML.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::InvalidDefinition` if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| GraphError::InvalidDefinition(e.to_string()))
    }
}
