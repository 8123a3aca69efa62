//! Graph execution.
//!
//! A run starts at the entry node and repeatedly runs the current node,
//! applies its update, and follows the first eligible outgoing edge. A run
//! ends when:
//!
//! - the current node is an exit point ([`RunOutcome::Completed`])
//! - no outgoing edge is eligible ([`RunOutcome::Halted`])
//! - the transition count reaches the caller's cap ([`RunOutcome::IterationLimit`])
//! - a node fails, the deadline expires, or the run is cancelled
//!   ([`ExecutionError`])
//!
//! Every run owns its [`State`]; concurrent runs of one graph share nothing
//! but the immutable graph.

use std::time::Duration;

use braid_core::State;
use itertools::Itertools;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::edge::select_edge;
use crate::error::{ExecutionError, GraphError};
use crate::graph::Graph;
use crate::node::{NodeContext, NodeId, RunId};

/// Iteration cap used when a caller does not pick one.
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

/// Per-run execution parameters.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: RunId,
    /// Maximum number of transitions before the run stops.
    pub max_iterations: usize,
    /// Wall-clock budget for the whole run.
    pub timeout: Option<Duration>,
    /// Checked at every node boundary.
    pub cancel: CancellationToken,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            run_id: RunId::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl ExecutionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// How a run that did not fail came to an end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The run reached an exit point.
    Completed { exit_node: NodeId },
    /// No outgoing edge of `node` was eligible.
    Halted { node: NodeId },
    /// The transition cap was reached; `node` was the last node run.
    IterationLimit { node: NodeId, limit: usize },
}

impl RunOutcome {
    /// Whether the run was stopped by the iteration cap.
    #[must_use]
    pub const fn is_iteration_limit(&self) -> bool {
        matches!(self, Self::IterationLimit { .. })
    }

    /// The node the run stopped at.
    #[must_use]
    pub fn last_node(&self) -> &str {
        match self {
            Self::Completed { exit_node: node }
            | Self::Halted { node }
            | Self::IterationLimit { node, .. } => node,
        }
    }
}

/// Result of a run that did not fail.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub run_id: RunId,
    pub graph_id: String,
    pub outcome: RunOutcome,
    /// Final state of the run.
    pub state: State,
    /// Number of transitions taken.
    pub steps: usize,
    /// Every node run, in order.
    pub path: Vec<NodeId>,
    #[serde(with = "braid_core::duration::millis")]
    pub elapsed: Duration,
}

impl Graph {
    /// Run the graph from its entry point.
    ///
    /// The node in flight is abandoned when the deadline passes; cancellation
    /// is observed only between nodes.
    ///
    /// # Errors
    ///
    /// * `ExecutionError::Structural` if the graph is not compiled
    /// * `ExecutionError::NodeFailed` when a node returns an error
    /// * `ExecutionError::Timeout` when the deadline expires
    /// * `ExecutionError::Cancelled` when `ctx.cancel` fires
    pub async fn execute(
        &self,
        initial: State,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionReport, ExecutionError> {
        if !self.is_compiled() {
            return Err(GraphError::NotCompiled(self.id().to_string()).into());
        }
        let Some(entry) = self.entry_point() else {
            return Err(GraphError::MissingEntryPoint(self.id().to_string()).into());
        };

        let started = Instant::now();
        let budget = ctx.timeout.map(|t| (started + t, t));
        let mut state = initial;
        let mut current: NodeId = entry.to_string();
        let mut steps = 0usize;
        let mut path = Vec::new();

        info!(
            graph_id = %self.id(),
            run_id = %ctx.run_id,
            entry = %current,
            max_iterations = ctx.max_iterations,
            "Starting graph run"
        );

        loop {
            if ctx.cancel.is_cancelled() {
                warn!(
                    graph_id = %self.id(),
                    run_id = %ctx.run_id,
                    node = %current,
                    "Run cancelled"
                );
                return Err(ExecutionError::Cancelled { node: current });
            }
            if let Some((deadline, timeout)) = budget {
                if Instant::now() >= deadline {
                    return Err(ExecutionError::Timeout {
                        node: current,
                        timeout,
                    });
                }
            }

            let Some(node) = self.node(&current) else {
                return Err(GraphError::unknown_node(current).into());
            };

            let node_ctx = NodeContext {
                run_id: ctx.run_id,
                graph_id: self.id().to_string(),
                node_id: current.clone(),
                step: steps,
                cancel: ctx.cancel.clone(),
            };

            debug!(
                graph_id = %self.id(),
                run_id = %ctx.run_id,
                node = %current,
                step = steps,
                "Running node"
            );

            let result = match budget {
                Some((deadline, timeout)) => {
                    match tokio::time::timeout_at(deadline, node.handler.run(&state, &node_ctx))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            return Err(ExecutionError::Timeout {
                                node: current,
                                timeout,
                            });
                        }
                    }
                }
                None => node.handler.run(&state, &node_ctx).await,
            };

            let update = result.map_err(|source| ExecutionError::NodeFailed {
                node: current.clone(),
                step: steps,
                source,
            })?;
            state = update.apply(state);
            path.push(current.clone());

            let outcome = if self.is_exit_point(&current) {
                Some(RunOutcome::Completed {
                    exit_node: current.clone(),
                })
            } else {
                match select_edge(self.outgoing(&current), &state) {
                    None => Some(RunOutcome::Halted {
                        node: current.clone(),
                    }),
                    Some(_) if steps >= ctx.max_iterations => Some(RunOutcome::IterationLimit {
                        node: current.clone(),
                        limit: ctx.max_iterations,
                    }),
                    Some(edge) => {
                        debug!(
                            graph_id = %self.id(),
                            from = %edge.source,
                            to = %edge.target,
                            condition = edge.condition_name(),
                            "Following edge"
                        );
                        steps += 1;
                        current = edge.target.clone();
                        None
                    }
                }
            };

            if let Some(outcome) = outcome {
                let elapsed = started.elapsed();
                info!(
                    graph_id = %self.id(),
                    run_id = %ctx.run_id,
                    outcome = ?outcome,
                    steps,
                    path = %path.iter().join(" -> "),
                    "Graph run finished"
                );
                return Ok(ExecutionReport {
                    run_id: ctx.run_id,
                    graph_id: self.id().to_string(),
                    outcome,
                    state,
                    steps,
                    path,
                    elapsed,
                });
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::edge::Condition;
    use crate::node::{NodeError, NodeMetadata, StateUpdate, async_node_fn, node_fn};

    fn counter(key: &'static str) -> Arc<dyn crate::node::NodeHandler> {
        node_fn(move |state| {
            let n = state.get_as::<i64>(key)?.unwrap_or(0);
            Ok(StateUpdate::Merge(State::new().with(key, n + 1)))
        })
    }

    #[tokio::test]
    async fn test_execute_requires_compile() {
        let mut graph = Graph::new("g");
        graph
            .add_node("a", counter("a"), NodeMetadata::default())
            .unwrap();
        graph.set_entry_point("a").unwrap();

        let err = graph
            .execute(State::new(), &ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Structural(GraphError::NotCompiled(_))
        ));
    }

    #[tokio::test]
    async fn test_runs_to_exit_point() {
        let mut graph = Graph::new("g");
        for id in ["a", "b", "c"] {
            graph.add_node(id, counter(id), NodeMetadata::default()).unwrap();
        }
        graph.add_edge("a", "b", None).unwrap();
        graph.add_edge("b", "c", None).unwrap();
        graph.add_edge("c", "a", None).unwrap();
        graph.set_entry_point("a").unwrap();
        graph.set_exit_point("c").unwrap();
        graph.compile().unwrap();

        let report = graph
            .execute(State::new(), &ExecutionContext::new())
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::Completed {
                exit_node: "c".into()
            }
        );
        assert_eq!(report.steps, 2);
        assert_eq!(report.path, vec!["a", "b", "c"]);
        assert_eq!(report.state.get_as::<i64>("c").unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_halts_when_no_edge_is_eligible() {
        let mut graph = Graph::new("g");
        graph.add_node("a", counter("a"), NodeMetadata::default()).unwrap();
        graph.add_node("b", counter("b"), NodeMetadata::default()).unwrap();
        graph
            .add_edge("a", "b", Some(Condition::truthy("go")))
            .unwrap();
        graph.set_entry_point("a").unwrap();
        graph.compile().unwrap();

        let report = graph
            .execute(State::new(), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::Halted { node: "a".into() });
        assert_eq!(report.steps, 0);
    }

    #[tokio::test]
    async fn test_conditional_branch_is_taken_over_default() {
        let mut graph = Graph::new("g");
        for id in ["check", "yes", "no"] {
            graph.add_node(id, counter(id), NodeMetadata::default()).unwrap();
        }
        graph
            .add_edge("check", "yes", Some(Condition::truthy("flag")))
            .unwrap();
        graph.add_edge("check", "no", None).unwrap();
        graph.set_entry_point("check").unwrap();
        graph.compile().unwrap();

        let flagged = graph
            .execute(State::new().with("flag", true), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(flagged.path, vec!["check", "yes"]);

        let plain = graph
            .execute(State::new(), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(plain.path, vec!["check", "no"]);
    }

    #[tokio::test]
    async fn test_node_error_aborts_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut graph = Graph::new("g");
        graph
            .add_node(
                "boom",
                node_fn(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err(NodeError::failed("kaput"))
                }),
                NodeMetadata::default(),
            )
            .unwrap();
        graph.set_entry_point("boom").unwrap();
        graph.compile().unwrap();

        let err = graph
            .execute(State::new(), &ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NodeFailed { ref node, .. } if node == "boom"));
        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_is_a_timeout() {
        let mut graph = Graph::new("g");
        graph
            .add_node(
                "slow",
                async_node_fn(|_, _| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok::<_, NodeError>(StateUpdate::Unchanged)
                }),
                NodeMetadata::default(),
            )
            .unwrap();
        graph.set_entry_point("slow").unwrap();
        graph.compile().unwrap();

        let ctx = ExecutionContext::new().with_timeout(Duration::from_secs(1));
        let err = graph.execute(State::new(), &ctx).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_cancel_stops_at_next_node_boundary() {
        let cancel = CancellationToken::new();
        let trip = cancel.clone();
        let mut graph = Graph::new("g");
        graph
            .add_node(
                "first",
                node_fn(move |_| {
                    trip.cancel();
                    Ok(StateUpdate::Merge(State::new().with("first", true)))
                }),
                NodeMetadata::default(),
            )
            .unwrap();
        graph
            .add_node("second", counter("second"), NodeMetadata::default())
            .unwrap();
        graph.add_edge("first", "second", None).unwrap();
        graph.set_entry_point("first").unwrap();
        graph.compile().unwrap();

        let ctx = ExecutionContext::new().with_cancel(cancel);
        let err = graph.execute(State::new(), &ctx).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Cancelled { ref node } if node == "second"));
        assert!(!err.is_retryable());
    }
}
