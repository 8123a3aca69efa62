//! The orchestrator and its context monitor.
//!
//! Context updates enter through [`Orchestrator::update_context`] into a
//! bounded buffer. One background loop drains the buffer in arrival order,
//! evaluates every auto-triggered workflow's conditions, and starts the
//! matching runs as concurrent tasks. A workflow is claimed as `running`
//! by the loop before its task is spawned, so a second update arriving
//! while it runs does not start it again.
//!
//! Every run is attempted once plus `retry_count` retries. Only node
//! failures are retried; a deadline expiry fails the run at once, and an
//! iteration-limit halt is a successful run.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use braid_core::State;
use braid_events::{Event, EventSink, InMemoryStateStore, StateStore, TracingSink, types};
use braid_workflow::{ExecutionContext, ExecutionError, ExecutionReport, Graph, GraphError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{OrchestratorError, Result};
use crate::trigger::{ContextUpdate, TriggerCondition, best_match};
use crate::workflow::{
    RunSummary, Workflow, WorkflowConfig, WorkflowId, WorkflowSnapshot, WorkflowStatus,
};

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Capacity of the pending context update buffer.
    pub context_buffer: usize,
    /// Persist each successful run's final state through the state store.
    pub checkpoint_state: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            context_buffer: 256,
            checkpoint_state: true,
        }
    }
}

/// Monitor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub updates_received: u64,
    pub triggers_fired: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub monitoring: bool,
}

#[derive(Debug, Default)]
struct Counters {
    updates_received: AtomicU64,
    triggers_fired: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// A workflow claimed for one execution.
struct Claim {
    id: WorkflowId,
    graph: Graph,
    config: WorkflowConfig,
    trigger: Option<TriggerCondition>,
}

struct MonitorTask {
    cancel: CancellationToken,
    task: JoinHandle<mpsc::Receiver<ContextUpdate>>,
}

struct Inner {
    config: OrchestratorConfig,
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
    events: Arc<dyn EventSink>,
    store: Arc<dyn StateStore>,
    context_tx: mpsc::Sender<ContextUpdate>,
    context_rx: Mutex<Option<mpsc::Receiver<ContextUpdate>>>,
    latest_context: RwLock<Option<ContextUpdate>>,
    monitor: Mutex<Option<MonitorTask>>,
    counters: Counters,
}

/// Owns workflows and runs them on demand or when context triggers them.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(
            OrchestratorConfig::default(),
            Arc::new(TracingSink),
            Arc::new(InMemoryStateStore::new()),
        )
    }
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        events: Arc<dyn EventSink>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let (context_tx, context_rx) = mpsc::channel(config.context_buffer.max(1));
        Self {
            inner: Arc::new(Inner {
                config,
                workflows: RwLock::new(HashMap::new()),
                events,
                store,
                context_tx,
                context_rx: Mutex::new(Some(context_rx)),
                latest_context: RwLock::new(None),
                monitor: Mutex::new(None),
                counters: Counters::default(),
            }),
        }
    }

    async fn emit(&self, event: Event) {
        let event_type = event.event_type.clone();
        if let Err(e) = self.inner.events.emit(event).await {
            warn!(event_type = %event_type, error = %e, "Failed to emit event");
        }
    }

    // ------------------------------------------------------------------
    // Workflow registry
    // ------------------------------------------------------------------

    /// Create a workflow around a fresh, empty graph.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidTrigger`] for a bad condition.
    pub async fn create_workflow(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        config: WorkflowConfig,
    ) -> Result<WorkflowId> {
        let id = WorkflowId::new();
        let graph = Graph::new(id.to_string());
        self.insert_workflow(id, name.into(), description.into(), graph, config)
            .await
    }

    /// Create a workflow around a prepared graph.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidTrigger`] for a bad condition.
    pub async fn create_workflow_with_graph(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        config: WorkflowConfig,
        graph: Graph,
    ) -> Result<WorkflowId> {
        self.insert_workflow(WorkflowId::new(), name.into(), description.into(), graph, config)
            .await
    }

    async fn insert_workflow(
        &self,
        id: WorkflowId,
        name: String,
        description: String,
        graph: Graph,
        config: WorkflowConfig,
    ) -> Result<WorkflowId> {
        let workflow = Workflow::new(id, name, description, graph, config)?;
        info!(workflow_id = %id, name = %workflow.name(), "Workflow created");
        let event = Event::new(types::WORKFLOW_CREATED, id.to_string())
            .with_payload(json!({ "name": workflow.name() }));
        self.inner.workflows.write().await.insert(id, workflow);
        self.emit(event).await;
        Ok(id)
    }

    /// Edit a workflow's graph, e.g. to add nodes before the first run.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::WorkflowNotFound`]
    /// - [`OrchestratorError::AlreadyRunning`] while the workflow runs
    /// - [`OrchestratorError::Graph`] from `edit`, e.g. after compilation
    pub async fn update_graph<F>(&self, id: WorkflowId, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Graph) -> std::result::Result<(), GraphError>,
    {
        let mut workflows = self.inner.workflows.write().await;
        let workflow = workflows
            .get_mut(&id)
            .ok_or_else(|| OrchestratorError::workflow_not_found(id))?;
        if workflow.status == WorkflowStatus::Running {
            return Err(OrchestratorError::already_running(id));
        }
        edit(&mut workflow.graph)?;
        workflow.updated_at = Utc::now();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`OrchestratorError::WorkflowNotFound`].
    pub async fn get_workflow(&self, id: WorkflowId) -> Result<WorkflowSnapshot> {
        self.inner
            .workflows
            .read()
            .await
            .get(&id)
            .map(Workflow::snapshot)
            .ok_or_else(|| OrchestratorError::workflow_not_found(id))
    }

    /// Id of the first workflow, by creation time, with this name.
    pub async fn find_workflow(&self, name: &str) -> Option<WorkflowId> {
        self.inner
            .workflows
            .read()
            .await
            .values()
            .filter(|w| w.name == name)
            .min_by_key(|w| (w.created_at, w.id))
            .map(Workflow::id)
    }

    /// Remove a workflow that is not running.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::WorkflowNotFound`]
    /// - [`OrchestratorError::AlreadyRunning`]
    pub async fn remove_workflow(&self, id: WorkflowId) -> Result<WorkflowSnapshot> {
        let mut workflows = self.inner.workflows.write().await;
        match workflows.get(&id).map(|w| w.status) {
            None => Err(OrchestratorError::workflow_not_found(id)),
            Some(WorkflowStatus::Running) => Err(OrchestratorError::already_running(id)),
            Some(_) => {
                let removed = workflows.remove(&id).map(|w| w.snapshot());
                info!(workflow_id = %id, "Workflow removed");
                removed.ok_or_else(|| OrchestratorError::workflow_not_found(id))
            }
        }
    }

    /// All workflows, oldest first.
    pub async fn list_workflows(&self) -> Vec<WorkflowSnapshot> {
        let mut list: Vec<WorkflowSnapshot> = self
            .inner
            .workflows
            .read()
            .await
            .values()
            .map(Workflow::snapshot)
            .collect();
        list.sort_by_key(|w| (w.created_at, w.id));
        list
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Mark a workflow as running and take what its run needs.
    async fn claim(&self, id: WorkflowId, trigger: Option<TriggerCondition>) -> Result<Claim> {
        let mut workflows = self.inner.workflows.write().await;
        let workflow = workflows
            .get_mut(&id)
            .ok_or_else(|| OrchestratorError::workflow_not_found(id))?;
        Self::claim_locked(workflow, trigger)
    }

    fn claim_locked(workflow: &mut Workflow, trigger: Option<TriggerCondition>) -> Result<Claim> {
        if workflow.status == WorkflowStatus::Running {
            return Err(OrchestratorError::already_running(workflow.id));
        }
        if let Err(e) = workflow.graph.compile() {
            workflow.last_error = Some(e.to_string());
            workflow.set_status(WorkflowStatus::Error);
            return Err(e.into());
        }
        workflow.set_status(WorkflowStatus::Running);
        Ok(Claim {
            id: workflow.id,
            graph: workflow.graph.clone(),
            config: workflow.config.clone(),
            trigger,
        })
    }

    /// Run a workflow now with the retry and timeout policy of its config.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::WorkflowNotFound`]
    /// - [`OrchestratorError::AlreadyRunning`]
    /// - [`OrchestratorError::Graph`] when the graph does not compile
    /// - [`OrchestratorError::ExecutionFailed`] when every attempt failed
    pub async fn execute_workflow(
        &self,
        id: WorkflowId,
        initial: State,
    ) -> Result<ExecutionReport> {
        let claim = self.claim(id, None).await?;
        self.run_claimed(claim, initial, CancellationToken::new())
            .await
    }

    async fn run_claimed(
        &self,
        claim: Claim,
        initial: State,
        cancel: CancellationToken,
    ) -> Result<ExecutionReport> {
        let Claim {
            id,
            graph,
            config,
            trigger,
        } = claim;
        let started_at = Utc::now();
        let max_attempts = config.retry_count.saturating_add(1);

        info!(workflow_id = %id, max_attempts, "Workflow started");
        self.emit(
            Event::new(types::WORKFLOW_STARTED, id.to_string()).with_payload(json!({
                "trigger": trigger.as_ref().map(|t| t.pattern.clone()),
                "max_attempts": max_attempts,
            })),
        )
        .await;

        let mut attempt: u32 = 0;
        let result = loop {
            attempt = attempt.saturating_add(1);
            let ctx = ExecutionContext::new()
                .with_max_iterations(config.max_iterations)
                .with_timeout(config.timeout)
                .with_cancel(cancel.child_token());

            match graph.execute(initial.clone(), &ctx).await {
                Ok(report) => break Ok(report),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        workflow_id = %id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    self.emit(
                        Event::new(types::WORKFLOW_RETRYING, id.to_string()).with_payload(json!({
                            "attempt": attempt,
                            "error": e.to_string(),
                            "delay_ms": u64::try_from(config.retry_delay.as_millis()).unwrap_or(u64::MAX),
                        })),
                    )
                    .await;
                    tokio::select! {
                        () = tokio::time::sleep(config.retry_delay) => {}
                        () = cancel.cancelled() => break Err(e),
                    }
                }
                Err(e) => break Err(e),
            }
        };

        self.finish(id, trigger.as_ref(), started_at, attempt, result)
            .await
    }

    async fn finish(
        &self,
        id: WorkflowId,
        trigger: Option<&TriggerCondition>,
        started_at: chrono::DateTime<Utc>,
        attempts: u32,
        result: std::result::Result<ExecutionReport, ExecutionError>,
    ) -> Result<ExecutionReport> {
        let summary = RunSummary {
            run_id: match &result {
                Ok(report) => report.run_id.to_string(),
                Err(_) => String::new(),
            },
            trigger: trigger.map(|t| t.pattern.clone()),
            attempts,
            outcome: result.as_ref().ok().map(|r| r.outcome.clone()),
            steps: result.as_ref().ok().map(|r| r.steps),
            error: result.as_ref().err().map(ToString::to_string),
            started_at,
            finished_at: Utc::now(),
        };

        if let Ok(report) = &result {
            if self.inner.config.checkpoint_state {
                if let Err(e) = self
                    .inner
                    .store
                    .update(&format!("workflow:{id}"), report.state.clone())
                    .await
                {
                    warn!(workflow_id = %id, error = %e, "Failed to checkpoint final state");
                }
            }
        }

        {
            let mut workflows = self.inner.workflows.write().await;
            if let Some(workflow) = workflows.get_mut(&id) {
                match &result {
                    Ok(_) => {
                        workflow.last_error = None;
                        workflow.set_status(WorkflowStatus::Completed);
                    }
                    Err(e) => {
                        workflow.last_error = Some(e.to_string());
                        workflow.set_status(WorkflowStatus::Error);
                    }
                }
                workflow.record_run(summary);
            }
        }

        match result {
            Ok(report) => {
                bump(&self.inner.counters.runs_completed);
                info!(
                    workflow_id = %id,
                    attempts,
                    steps = report.steps,
                    outcome = ?report.outcome,
                    "Workflow completed"
                );
                self.emit(
                    Event::new(types::WORKFLOW_COMPLETED, id.to_string()).with_payload(json!({
                        "attempts": attempts,
                        "steps": report.steps,
                        "outcome": report.outcome,
                    })),
                )
                .await;
                Ok(report)
            }
            Err(last) => {
                bump(&self.inner.counters.runs_failed);
                error!(workflow_id = %id, attempts, error = %last, "Workflow failed");
                self.emit(
                    Event::new(types::WORKFLOW_FAILED, id.to_string()).with_payload(json!({
                        "attempts": attempts,
                        "error": last.to_string(),
                        "timeout": last.is_timeout(),
                    })),
                )
                .await;
                Err(OrchestratorError::ExecutionFailed {
                    workflow: id.to_string(),
                    attempts,
                    last,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Context monitor
    // ------------------------------------------------------------------

    /// Submit an observation to the context monitor.
    ///
    /// Updates are buffered until the monitor loop picks them up.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ContextBufferFull`] when the buffer is
    /// at capacity.
    pub async fn update_context(&self, update: ContextUpdate) -> Result<()> {
        bump(&self.inner.counters.updates_received);
        *self.inner.latest_context.write().await = Some(update.clone());
        self.inner.context_tx.try_send(update).map_err(|_| {
            OrchestratorError::ContextBufferFull {
                capacity: self.inner.config.context_buffer,
            }
        })
    }

    /// The most recent update submitted.
    pub async fn latest_context(&self) -> Option<ContextUpdate> {
        self.inner.latest_context.read().await.clone()
    }

    /// Start the background loop. `cancel` stops it, as does
    /// [`stop_monitoring`](Self::stop_monitoring); runs it started are
    /// cancelled at their next node boundary.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::MonitoringAlreadyStarted`].
    pub async fn start_monitoring(&self, cancel: CancellationToken) -> Result<()> {
        let mut monitor = self.inner.monitor.lock().await;
        if monitor.is_some() {
            return Err(OrchestratorError::MonitoringAlreadyStarted);
        }
        let rx = self
            .inner
            .context_rx
            .lock()
            .await
            .take()
            .ok_or(OrchestratorError::MonitoringAlreadyStarted)?;

        let this = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { this.monitor_loop(rx, token).await });
        *monitor = Some(MonitorTask { cancel, task });
        info!("Context monitoring started");
        Ok(())
    }

    /// Stop the background loop and wait for the runs it started.
    pub async fn stop_monitoring(&self) {
        let Some(MonitorTask { cancel, task }) = self.inner.monitor.lock().await.take() else {
            return;
        };
        cancel.cancel();
        match task.await {
            Ok(rx) => *self.inner.context_rx.lock().await = Some(rx),
            Err(e) => error!(error = %e, "Context monitor task failed"),
        }
        info!("Context monitoring stopped");
    }

    pub async fn stats(&self) -> MonitorStats {
        let counters = &self.inner.counters;
        MonitorStats {
            updates_received: counters.updates_received.load(Ordering::Relaxed),
            triggers_fired: counters.triggers_fired.load(Ordering::Relaxed),
            runs_completed: counters.runs_completed.load(Ordering::Relaxed),
            runs_failed: counters.runs_failed.load(Ordering::Relaxed),
            monitoring: self.inner.monitor.lock().await.is_some(),
        }
    }

    async fn monitor_loop(
        self,
        mut rx: mpsc::Receiver<ContextUpdate>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ContextUpdate> {
        let mut runs: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                update = rx.recv() => {
                    let Some(update) = update else { break };
                    self.evaluate(update, &cancel, &mut runs).await;
                }
                Some(joined) = runs.join_next(), if !runs.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Workflow run task failed");
                    }
                }
            }
        }

        while let Some(joined) = runs.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Workflow run task failed");
            }
        }
        rx
    }

    /// Evaluate one update against every auto-triggered workflow.
    async fn evaluate(
        &self,
        update: ContextUpdate,
        cancel: &CancellationToken,
        runs: &mut JoinSet<()>,
    ) {
        debug!(context_type = %update.context_type, "Evaluating context update");

        let context = match serde_json::to_value(&update) {
            Ok(context) => context,
            Err(e) => {
                warn!(
                    context_type = %update.context_type,
                    error = %e,
                    "Context update could not be serialized; no workflow triggered"
                );
                return;
            }
        };

        let claims: Vec<Claim> = {
            let mut workflows = self.inner.workflows.write().await;
            let mut claims = Vec::new();
            for workflow in workflows.values_mut() {
                if !workflow.config.auto_trigger {
                    continue;
                }
                let Some(matched) = best_match(&workflow.triggers, &update) else {
                    continue;
                };
                if workflow.status == WorkflowStatus::Running {
                    debug!(workflow_id = %workflow.id, "Trigger matched a running workflow; skipped");
                    continue;
                }
                let condition = matched.condition().clone();
                match Self::claim_locked(workflow, Some(condition)) {
                    Ok(claim) => claims.push(claim),
                    Err(e) => warn!(workflow_id = %workflow.id, error = %e, "Triggered workflow not started"),
                }
            }
            claims
        };

        for claim in claims {
            bump(&self.inner.counters.triggers_fired);
            let trigger = match claim.trigger.as_ref().map(serde_json::to_value) {
                Some(Ok(trigger)) => trigger,
                Some(Err(e)) => {
                    warn!(workflow_id = %claim.id, error = %e, "Trigger could not be serialized");
                    Value::Null
                }
                None => Value::Null,
            };
            info!(workflow_id = %claim.id, "Workflow triggered by context");
            self.emit(
                Event::new(types::WORKFLOW_TRIGGERED, claim.id.to_string()).with_payload(json!({
                    "context_type": update.context_type,
                    "trigger": trigger,
                })),
            )
            .await;

            let initial = State::new()
                .with("context", context.clone())
                .with("trigger", trigger);
            let this = self.clone();
            let token = cancel.child_token();
            runs.spawn(async move {
                // Failures are recorded on the workflow and already logged.
                let _ = this.run_claimed(claim, initial, token).await;
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn should_default_orchestrator_config() {
        let config: OrchestratorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.context_buffer, 256);
        assert!(config.checkpoint_state);
    }

    #[tokio::test]
    async fn given_full_buffer_when_updating_context_then_update_is_refused() {
        let orchestrator = Orchestrator::new(
            OrchestratorConfig {
                context_buffer: 1,
                checkpoint_state: false,
            },
            Arc::new(TracingSink),
            Arc::new(InMemoryStateStore::new()),
        );
        orchestrator
            .update_context(ContextUpdate::new("a", ""))
            .await
            .unwrap();
        let err = orchestrator
            .update_context(ContextUpdate::new("b", ""))
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::ContextBufferFull { capacity: 1 }));
        assert_eq!(
            orchestrator.latest_context().await.unwrap().context_type,
            "b"
        );
        assert_eq!(orchestrator.stats().await.updates_received, 2);
    }

    #[tokio::test]
    async fn given_running_monitor_when_started_twice_then_second_start_fails() {
        let orchestrator = Orchestrator::default();
        orchestrator
            .start_monitoring(CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            orchestrator.start_monitoring(CancellationToken::new()).await,
            Err(OrchestratorError::MonitoringAlreadyStarted)
        ));
        assert!(orchestrator.stats().await.monitoring);

        orchestrator.stop_monitoring().await;
        assert!(!orchestrator.stats().await.monitoring);
        orchestrator
            .start_monitoring(CancellationToken::new())
            .await
            .unwrap();
        orchestrator.stop_monitoring().await;
    }
}
