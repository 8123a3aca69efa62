//! Graph engine for reasoning workflows.
//!
//! A [`Graph`] is a set of nodes joined by optionally conditional edges. It
//! may contain cycles; callers bound a run with an iteration cap. Key
//! features:
//!
//! - **Conditional routing**: after a node runs, the first eligible outgoing
//!   edge in insertion order is followed.
//! - **Owned state**: every run threads its own [`State`] through the nodes,
//!   so concurrent runs of one graph never see each other.
//! - **Immutable once compiled**: `compile` validates structure and freezes
//!   the graph.
//! - **Interchange**: graphs can be described as JSON/YAML
//!   ([`GraphDefinition`]) and built through handler/condition registries.
//!
//! # Example
//!
//! ```
//! use braid_workflow::{
//!     ExecutionContext, Graph, NodeMetadata, State, StateUpdate, node_fn,
//! };
//!
//! # tokio_test_block(async {
//! let mut graph = Graph::new("count");
//! graph
//!     .add_node(
//!         "tick",
//!         node_fn(|s| {
//!             let n = s.get_as::<i64>("n")?.unwrap_or(0);
//!             Ok(StateUpdate::Merge(State::new().with("n", n + 1)))
//!         }),
//!         NodeMetadata::default(),
//!     )
//!     .unwrap();
//! graph.add_edge("tick", "tick", None).unwrap();
//! graph.set_entry_point("tick").unwrap();
//! graph.compile().unwrap();
//!
//! let ctx = ExecutionContext::new().with_max_iterations(3);
//! let report = graph.execute(State::new(), &ctx).await.unwrap();
//! assert!(report.outcome.is_iteration_limit());
//! assert_eq!(report.state.get_as::<i64>("n").unwrap(), Some(4));
//! # });
//! # fn tokio_test_block<F: std::future::Future<Output = ()>>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread()
//! #         .enable_all()
//! #         .build()
//! #         .unwrap()
//! #         .block_on(f)
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod definition;
pub mod edge;
pub mod engine;
pub mod error;
pub mod graph;
pub mod node;
pub mod registry;
pub mod schema;

pub use braid_core::State;
pub use definition::{EdgeDefinition, GraphDefinition};
pub use edge::{Condition, DEFAULT_CONDITION, Edge, select_edge};
pub use engine::{DEFAULT_MAX_ITERATIONS, ExecutionContext, ExecutionReport, RunOutcome};
pub use error::{ExecutionError, GraphError, Result};
pub use graph::{Graph, NodeEntry};
pub use node::{
    AsyncFnNode, FnNode, NoOpNode, NodeContext, NodeError, NodeHandler, NodeId, NodeMetadata,
    RunId, StateUpdate, async_node_fn, node_fn,
};
pub use registry::{ConditionRegistry, NodeFactory, NodeRegistry, handler_name};
pub use schema::{FieldType, SchemaViolation, StateSchema};
