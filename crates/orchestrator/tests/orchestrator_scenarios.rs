//! Orchestrator scenarios.
//!
//! - A failing workflow is attempted `retry_count + 1` times, then errors;
//!   a timed-out one is not retried
//! - Hitting the iteration cap counts as a completed run
//! - Matching context starts every matching auto-triggered workflow
//!   exactly once, under the same retry policy
//! - Registry operations respect the running state

#![allow(clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use braid_events::{EventBus, EventPattern, InMemoryStateStore, StateStore, TracingSink, types};
use braid_workflow::{
    Graph, GraphError, NodeError, NodeMetadata, RunOutcome, State, StateUpdate, async_node_fn,
    node_fn,
};
use orchestrator::{
    ContextUpdate, Orchestrator, OrchestratorConfig, OrchestratorError, TriggerCondition,
    WorkflowConfig, WorkflowId, WorkflowStatus,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Test helper: Unwrap a Result or panic with context
fn unwrap_result<T, E: std::fmt::Display>(result: std::result::Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{}: {}", context, e),
    }
}

/// A single-node graph whose node records the trigger it was started with.
fn recording_graph(id: &str, calls: Arc<AtomicUsize>, pause: Duration) -> Graph {
    let mut graph = Graph::new(id);
    unwrap_result(
        graph.add_node(
            "record",
            async_node_fn(move |state: State, _ctx| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(pause).await;
                    let content = state
                        .get("context")
                        .and_then(|c| c.get("content"))
                        .cloned()
                        .unwrap_or_default();
                    Ok(StateUpdate::Merge(State::new().with("seen", content)))
                }
            }),
            NodeMetadata::default(),
        ),
        "add node",
    );
    unwrap_result(graph.set_entry_point("record"), "entry");
    unwrap_result(graph.set_exit_point("record"), "exit");
    graph
}

async fn wait_for_status(orchestrator: &Orchestrator, id: WorkflowId, status: WorkflowStatus) {
    for _ in 0..1000 {
        if let Ok(snapshot) = orchestrator.get_workflow(id).await {
            if snapshot.status == status {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("workflow {id} never reached {status}");
}

// ============================================================================
// Retry policy
// ============================================================================

#[tokio::test(start_paused = true)]
async fn given_always_failing_node_when_executed_then_attempted_retry_count_plus_one_times() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let mut graph = Graph::new("flaky");
    unwrap_result(
        graph.add_node(
            "fail",
            node_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::failed("boom"))
            }),
            NodeMetadata::default(),
        ),
        "add node",
    );
    unwrap_result(graph.set_entry_point("fail"), "entry");

    let orchestrator = Orchestrator::default();
    let id = unwrap_result(
        orchestrator
            .create_workflow_with_graph(
                "flaky",
                "always fails",
                WorkflowConfig::default().with_retries(3, Duration::from_secs(2)),
                graph,
            )
            .await,
        "create",
    );

    let started = tokio::time::Instant::now();
    let result = orchestrator.execute_workflow(id, State::new()).await;

    assert!(
        matches!(
            result,
            Err(OrchestratorError::ExecutionFailed { attempts: 4, .. })
        ),
        "got {result:?}"
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    // Three pauses of retry_delay between four attempts.
    assert!(started.elapsed() >= Duration::from_secs(6));

    let snapshot = unwrap_result(orchestrator.get_workflow(id).await, "get");
    assert_eq!(snapshot.status, WorkflowStatus::Error);
    assert!(snapshot.last_error.is_some());
    assert_eq!(snapshot.runs.len(), 1);
    assert_eq!(snapshot.runs[0].attempts, 4);
    assert_eq!(orchestrator.stats().await.runs_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn given_slow_node_when_deadline_passes_then_timeout_is_reported_without_retry() {
    let mut graph = Graph::new("slow");
    unwrap_result(
        graph.add_node(
            "nap",
            async_node_fn(|_state: State, _ctx| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(StateUpdate::Unchanged)
            }),
            NodeMetadata::default(),
        ),
        "add node",
    );
    unwrap_result(graph.set_entry_point("nap"), "entry");

    let orchestrator = Orchestrator::default();
    let config = WorkflowConfig::default()
        .with_timeout(Duration::from_secs(1))
        .with_retries(1, Duration::from_millis(100));
    let id = unwrap_result(
        orchestrator
            .create_workflow_with_graph("slow", "", config, graph)
            .await,
        "create",
    );

    let err = orchestrator
        .execute_workflow(id, State::new())
        .await
        .err();
    let Some(err) = err else {
        panic!("slow workflow should time out");
    };
    assert!(
        matches!(err, OrchestratorError::ExecutionFailed { attempts: 1, .. }),
        "got {err:?}"
    );
    assert!(err.execution_error().is_some_and(|e| e.is_timeout()));

    let snapshot = unwrap_result(orchestrator.get_workflow(id).await, "get");
    assert_eq!(snapshot.status, WorkflowStatus::Error);
    assert_eq!(snapshot.runs[0].attempts, 1);
}

#[tokio::test]
async fn given_endless_loop_when_iteration_cap_hit_then_run_completes() {
    let mut graph = Graph::new("loop");
    unwrap_result(
        graph.add_node(
            "tick",
            node_fn(|state| {
                let n = state.get_as::<i64>("n")?.unwrap_or(0);
                Ok(StateUpdate::Merge(State::new().with("n", n + 1)))
            }),
            NodeMetadata::default(),
        ),
        "add node",
    );
    unwrap_result(graph.add_edge("tick", "tick", None), "edge");
    unwrap_result(graph.set_entry_point("tick"), "entry");

    let store = Arc::new(InMemoryStateStore::new());
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(TracingSink),
        store.clone(),
    );
    let id = unwrap_result(
        orchestrator
            .create_workflow_with_graph(
                "loop",
                "",
                WorkflowConfig::default().with_max_iterations(4),
                graph,
            )
            .await,
        "create",
    );

    let report = unwrap_result(orchestrator.execute_workflow(id, State::new()).await, "run");
    assert!(matches!(
        report.outcome,
        RunOutcome::IterationLimit { limit: 4, .. }
    ));
    assert_eq!(report.state.get_as::<i64>("n").ok().flatten(), Some(5));

    let snapshot = unwrap_result(orchestrator.get_workflow(id).await, "get");
    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(snapshot.runs[0].attempts, 1);

    let saved = unwrap_result(store.get(&format!("workflow:{id}")).await, "store");
    assert_eq!(saved.map(|s| s.get("n").cloned()), Some(Some(json!(5))));

    // A completed workflow may run again.
    unwrap_result(orchestrator.execute_workflow(id, State::new()).await, "rerun");
    let snapshot = unwrap_result(orchestrator.get_workflow(id).await, "get");
    assert_eq!(snapshot.runs.len(), 2);
}

#[tokio::test]
async fn given_graph_without_entry_when_executed_then_workflow_is_marked_error() {
    let orchestrator = Orchestrator::default();
    let id = unwrap_result(
        orchestrator
            .create_workflow("empty", "", WorkflowConfig::default())
            .await,
        "create",
    );

    let result = orchestrator.execute_workflow(id, State::new()).await;
    assert!(matches!(
        result,
        Err(OrchestratorError::Graph(GraphError::Empty(_)))
    ));
    let snapshot = unwrap_result(orchestrator.get_workflow(id).await, "get");
    assert_eq!(snapshot.status, WorkflowStatus::Error);
}

// ============================================================================
// Context-triggered execution
// ============================================================================

#[tokio::test]
async fn given_matching_context_when_monitoring_then_workflow_runs_with_context() {
    let orchestrator = Orchestrator::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let config = WorkflowConfig::default()
        .auto_triggered()
        .with_trigger(TriggerCondition::keyword("deploy").with_priority(5));
    let id = unwrap_result(
        orchestrator
            .create_workflow_with_graph(
                "deployer",
                "",
                config,
                recording_graph("deployer", calls.clone(), Duration::ZERO),
            )
            .await,
        "create",
    );

    unwrap_result(
        orchestrator.start_monitoring(CancellationToken::new()).await,
        "start monitoring",
    );
    unwrap_result(
        orchestrator
            .update_context(ContextUpdate::new("chat", "please DEPLOY the api"))
            .await,
        "update",
    );
    wait_for_status(&orchestrator, id, WorkflowStatus::Completed).await;

    let snapshot = unwrap_result(orchestrator.get_workflow(id).await, "get");
    assert_eq!(snapshot.runs.len(), 1);
    assert_eq!(snapshot.runs[0].trigger.as_deref(), Some("deploy"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    orchestrator.stop_monitoring().await;
    let stats = orchestrator.stats().await;
    assert_eq!(stats.triggers_fired, 1);
    assert_eq!(stats.runs_completed, 1);
}

#[tokio::test]
async fn given_running_workflow_when_context_matches_again_then_it_is_not_restarted() {
    let orchestrator = Orchestrator::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let config = WorkflowConfig::default()
        .auto_triggered()
        .with_trigger(TriggerCondition::context_type("alert"));
    let id = unwrap_result(
        orchestrator
            .create_workflow_with_graph(
                "responder",
                "",
                config,
                recording_graph("responder", calls.clone(), Duration::from_millis(300)),
            )
            .await,
        "create",
    );

    unwrap_result(
        orchestrator.start_monitoring(CancellationToken::new()).await,
        "start monitoring",
    );
    for content in ["first", "second", "third"] {
        unwrap_result(
            orchestrator
                .update_context(ContextUpdate::new("alert", content))
                .await,
            "update",
        );
    }
    wait_for_status(&orchestrator, id, WorkflowStatus::Running).await;
    assert!(matches!(
        orchestrator.remove_workflow(id).await,
        Err(OrchestratorError::AlreadyRunning(_))
    ));
    wait_for_status(&orchestrator, id, WorkflowStatus::Completed).await;
    orchestrator.stop_monitoring().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = orchestrator.stats().await;
    assert_eq!(stats.updates_received, 3);
    assert_eq!(stats.triggers_fired, 1);
    assert_eq!(
        orchestrator.latest_context().await.map(|c| c.content),
        Some("third".to_string())
    );
}

#[tokio::test]
async fn given_manual_workflow_when_context_matches_then_it_is_ignored() {
    let orchestrator = Orchestrator::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let config = WorkflowConfig::default().with_trigger(TriggerCondition::context_type("*"));
    let id = unwrap_result(
        orchestrator
            .create_workflow_with_graph(
                "manual",
                "",
                config,
                recording_graph("manual", calls.clone(), Duration::ZERO),
            )
            .await,
        "create",
    );

    unwrap_result(
        orchestrator.start_monitoring(CancellationToken::new()).await,
        "start monitoring",
    );
    unwrap_result(
        orchestrator
            .update_context(ContextUpdate::new("anything", "at all"))
            .await,
        "update",
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.stop_monitoring().await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let snapshot = unwrap_result(orchestrator.get_workflow(id).await, "get");
    assert_eq!(snapshot.status, WorkflowStatus::Created);
}

#[tokio::test]
async fn given_low_confidence_context_when_below_threshold_then_no_trigger() {
    let orchestrator = Orchestrator::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let config = WorkflowConfig::default()
        .auto_triggered()
        .with_trigger(TriggerCondition::context_pattern("^incident-\\d+$").with_threshold(0.8));
    let id = unwrap_result(
        orchestrator
            .create_workflow_with_graph(
                "incident",
                "",
                config,
                recording_graph("incident", calls.clone(), Duration::ZERO),
            )
            .await,
        "create",
    );

    unwrap_result(
        orchestrator.start_monitoring(CancellationToken::new()).await,
        "start monitoring",
    );
    unwrap_result(
        orchestrator
            .update_context(ContextUpdate::new("incident-7", "").with_confidence(0.5))
            .await,
        "update",
    );
    unwrap_result(
        orchestrator
            .update_context(ContextUpdate::new("incident-8", "").with_confidence(0.9))
            .await,
        "update",
    );
    wait_for_status(&orchestrator, id, WorkflowStatus::Completed).await;
    orchestrator.stop_monitoring().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn given_auto_triggered_failing_workflow_when_context_matches_then_retries_end_in_error() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let mut graph = Graph::new("responder");
    unwrap_result(
        graph.add_node(
            "page",
            node_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::failed("pager unreachable"))
            }),
            NodeMetadata::default(),
        ),
        "add node",
    );
    unwrap_result(graph.set_entry_point("page"), "entry");

    let bus = Arc::new(EventBus::new());
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        bus.clone(),
        Arc::new(InMemoryStateStore::new()),
    );
    let config = WorkflowConfig::default()
        .auto_triggered()
        .with_trigger(TriggerCondition::keyword("incident"))
        .with_retries(2, Duration::from_secs(2));
    let id = unwrap_result(
        orchestrator
            .create_workflow_with_graph("responder", "", config, graph)
            .await,
        "create",
    );

    unwrap_result(
        orchestrator.start_monitoring(CancellationToken::new()).await,
        "start monitoring",
    );
    let started = tokio::time::Instant::now();
    unwrap_result(
        orchestrator
            .update_context(ContextUpdate::new("chat", "incident on the api"))
            .await,
        "update",
    );
    wait_for_status(&orchestrator, id, WorkflowStatus::Error).await;
    assert!(started.elapsed() >= Duration::from_secs(4));

    let snapshot = unwrap_result(orchestrator.get_workflow(id).await, "get");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(snapshot.last_error.is_some());
    assert_eq!(snapshot.runs.len(), 1);
    assert_eq!(snapshot.runs[0].trigger.as_deref(), Some("incident"));
    assert_eq!(snapshot.runs[0].attempts, 3);
    assert!(snapshot.runs[0].error.is_some());

    let retries = bus
        .history(&EventPattern::ByType(types::WORKFLOW_RETRYING.to_string()))
        .await;
    assert_eq!(retries.len(), 2);

    orchestrator.stop_monitoring().await;
    let stats = orchestrator.stats().await;
    assert_eq!(stats.triggers_fired, 1);
    assert_eq!(stats.runs_failed, 1);
    assert_eq!(stats.runs_completed, 0);
}

#[tokio::test(start_paused = true)]
async fn given_two_auto_triggered_workflows_when_one_update_matches_both_then_both_run() {
    let store = Arc::new(InMemoryStateStore::new());
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(TracingSink),
        store.clone(),
    );
    let alert_calls = Arc::new(AtomicUsize::new(0));
    let disk_calls = Arc::new(AtomicUsize::new(0));
    let on_alert = unwrap_result(
        orchestrator
            .create_workflow_with_graph(
                "on-alert",
                "",
                WorkflowConfig::default()
                    .auto_triggered()
                    .with_trigger(TriggerCondition::context_type("alert")),
                recording_graph("on-alert", alert_calls.clone(), Duration::from_millis(200)),
            )
            .await,
        "create on-alert",
    );
    let on_disk = unwrap_result(
        orchestrator
            .create_workflow_with_graph(
                "on-disk",
                "",
                WorkflowConfig::default()
                    .auto_triggered()
                    .with_trigger(TriggerCondition::keyword("disk")),
                recording_graph("on-disk", disk_calls.clone(), Duration::from_millis(200)),
            )
            .await,
        "create on-disk",
    );

    unwrap_result(
        orchestrator.start_monitoring(CancellationToken::new()).await,
        "start monitoring",
    );
    unwrap_result(
        orchestrator
            .update_context(ContextUpdate::new("alert", "disk full on db-1"))
            .await,
        "update",
    );
    wait_for_status(&orchestrator, on_alert, WorkflowStatus::Completed).await;
    wait_for_status(&orchestrator, on_disk, WorkflowStatus::Completed).await;
    orchestrator.stop_monitoring().await;

    assert_eq!(alert_calls.load(Ordering::SeqCst), 1);
    assert_eq!(disk_calls.load(Ordering::SeqCst), 1);
    for (id, trigger) in [(on_alert, "alert"), (on_disk, "disk")] {
        let snapshot = unwrap_result(orchestrator.get_workflow(id).await, "get");
        assert_eq!(snapshot.runs.len(), 1);
        assert_eq!(snapshot.runs[0].trigger.as_deref(), Some(trigger));

        let saved = unwrap_result(store.get(&format!("workflow:{id}")).await, "store");
        assert_eq!(
            saved.and_then(|s| s.get("seen").cloned()),
            Some(json!("disk full on db-1"))
        );
    }
    assert_eq!(orchestrator.stats().await.triggers_fired, 2);
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn given_workflows_when_listing_finding_and_removing_then_registry_is_consistent() {
    let orchestrator = Orchestrator::default();
    let first = unwrap_result(
        orchestrator
            .create_workflow("first", "one", WorkflowConfig::default())
            .await,
        "create",
    );
    let second = unwrap_result(
        orchestrator
            .create_workflow("second", "two", WorkflowConfig::default())
            .await,
        "create",
    );

    let names: Vec<String> = orchestrator
        .list_workflows()
        .await
        .into_iter()
        .map(|w| w.name)
        .collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_eq!(orchestrator.find_workflow("second").await, Some(second));

    unwrap_result(
        orchestrator
            .update_graph(first, |graph| {
                graph.add_node(
                    "noop",
                    node_fn(|_| Ok(StateUpdate::Unchanged)),
                    NodeMetadata::default(),
                )?;
                graph.set_entry_point("noop")
            })
            .await,
        "update graph",
    );
    unwrap_result(orchestrator.execute_workflow(first, State::new()).await, "run");

    // Compiled graphs are frozen.
    let frozen = orchestrator
        .update_graph(first, |graph| graph.set_exit_point("noop"))
        .await;
    assert!(matches!(
        frozen,
        Err(OrchestratorError::Graph(GraphError::AlreadyCompiled(_)))
    ));

    let removed = unwrap_result(orchestrator.remove_workflow(first).await, "remove");
    assert_eq!(removed.name, "first");
    assert!(matches!(
        orchestrator.get_workflow(first).await,
        Err(OrchestratorError::WorkflowNotFound(_))
    ));
    assert!(matches!(
        orchestrator.execute_workflow(first, State::new()).await,
        Err(OrchestratorError::WorkflowNotFound(_))
    ));
    assert_eq!(orchestrator.list_workflows().await.len(), 1);
}

#[tokio::test]
async fn given_invalid_trigger_when_creating_then_workflow_is_rejected() {
    let orchestrator = Orchestrator::default();
    let config = WorkflowConfig::default()
        .auto_triggered()
        .with_trigger(TriggerCondition::keyword("x").with_threshold(1.5));
    let result = orchestrator.create_workflow("bad", "", config).await;
    assert!(matches!(
        result,
        Err(OrchestratorError::InvalidTrigger { .. })
    ));
    assert!(orchestrator.list_workflows().await.is_empty());
}
