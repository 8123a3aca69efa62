//! Workflows: a graph bound to an execution policy and trigger conditions.
//!
//! Lifecycle: `created → running → {completed | error}`. A workflow in a
//! terminal state may run again; `running` lasts across retry attempts.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use braid_workflow::{DEFAULT_MAX_ITERATIONS, Graph, RunOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{OrchestratorError, Result};
use crate::trigger::{CompiledTrigger, TriggerCondition, compile_all};

/// Run summaries kept per workflow.
pub const RUN_HISTORY: usize = 32;

/// Unique identifier for a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowId(Ulid);

impl WorkflowId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkflowId {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| OrchestratorError::invalid_workflow_id(s, e))
    }
}

/// Workflow lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Created,
    Running,
    Completed,
    Error,
}

impl WorkflowStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Execution policy of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Run automatically when a trigger condition matches.
    pub auto_trigger: bool,
    /// Transition cap per attempt.
    pub max_iterations: usize,
    /// Deadline per attempt.
    #[serde(with = "braid_core::duration::millis")]
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retry_count: u32,
    #[serde(with = "braid_core::duration::millis")]
    pub retry_delay: Duration,
    pub trigger_conditions: Vec<TriggerCondition>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            auto_trigger: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout: Duration::from_secs(300),
            retry_count: 3,
            retry_delay: Duration::from_secs(2),
            trigger_conditions: Vec::new(),
        }
    }
}

impl WorkflowConfig {
    #[must_use]
    pub const fn auto_triggered(mut self) -> Self {
        self.auto_trigger = true;
        self
    }

    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_retries(mut self, retry_count: u32, retry_delay: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_delay = retry_delay;
        self
    }

    #[must_use]
    pub fn with_trigger(mut self, condition: TriggerCondition) -> Self {
        self.trigger_conditions.push(condition);
        self
    }
}

/// What happened in one execution, retries included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    /// Pattern of the condition that triggered the run; `None` for manual runs.
    pub trigger: Option<String>,
    pub attempts: u32,
    pub outcome: Option<RunOutcome>,
    pub steps: Option<usize>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A workflow owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub(crate) id: WorkflowId,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) graph: Graph,
    pub(crate) config: WorkflowConfig,
    pub(crate) triggers: Vec<CompiledTrigger>,
    pub(crate) status: WorkflowStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) last_error: Option<String>,
    pub(crate) runs: Vec<RunSummary>,
}

impl Workflow {
    /// Build a workflow around `graph`; the graph id is the workflow id.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidTrigger`] for a bad condition.
    pub(crate) fn new(
        id: WorkflowId,
        name: String,
        description: String,
        graph: Graph,
        config: WorkflowConfig,
    ) -> Result<Self> {
        let triggers = compile_all(&config.trigger_conditions)?;
        let now = Utc::now();
        Ok(Self {
            id,
            name,
            description,
            graph,
            config,
            triggers,
            status: WorkflowStatus::Created,
            created_at: now,
            updated_at: now,
            last_error: None,
            runs: Vec::new(),
        })
    }

    pub(crate) fn set_status(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub(crate) fn record_run(&mut self, summary: RunSummary) {
        if self.runs.len() >= RUN_HISTORY {
            self.runs.remove(0);
        }
        self.runs.push(summary);
    }

    #[must_use]
    pub const fn id(&self) -> WorkflowId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn graph(&self) -> &Graph {
        &self.graph
    }

    #[must_use]
    pub const fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Reporting view without the graph.
    #[must_use]
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            graph_id: self.graph.id().to_string(),
            compiled: self.graph.is_compiled(),
            config: self.config.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_error: self.last_error.clone(),
            runs: self.runs.clone(),
        }
    }
}

/// Point-in-time view of a workflow for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSnapshot {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub graph_id: String,
    pub compiled: bool,
    pub config: WorkflowConfig,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub runs: Vec<RunSummary>,
}
