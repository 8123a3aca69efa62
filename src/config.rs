//! Service configuration file.
//!
//! ```toml
//! [orchestrator]
//! context_buffer = 128
//!
//! [supervisor]
//! strategy = "one_for_one"
//! max_restarts = 5
//! within = 30000
//!
//! [[actors]]
//! id = "echo"
//!
//! [[workflows]]
//! name = "triage"
//! graph = "graphs/triage.yaml"
//! config = { auto_trigger = true, trigger_conditions = [{ type = "keyword", pattern = "incident" }] }
//! ```
//!
//! Graph paths are relative to the directory holding the config file.

use std::path::{Path, PathBuf};

use orchestrator::actors::SupervisorConfig;
use orchestrator::{OrchestratorConfig, WorkflowConfig};
use serde::Deserialize;

/// Top-level configuration of the `braid` service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BraidConfig {
    pub orchestrator: OrchestratorConfig,
    /// Policy of the root supervisor hosting the configured actors.
    pub supervisor: SupervisorConfig,
    pub actors: Vec<ActorEntry>,
    pub workflows: Vec<WorkflowEntry>,
}

/// An echo actor started under the root supervisor.
#[derive(Debug, Clone, Deserialize)]
pub struct ActorEntry {
    pub id: String,
    #[serde(default)]
    pub checkpoint: bool,
}

/// A workflow registered at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: WorkflowConfig,
    /// Graph definition file (JSON or YAML).
    pub graph: PathBuf,
}

impl BraidConfig {
    /// Load a TOML, YAML or JSON config file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub fn load(path: &Path) -> braid_core::Result<Self> {
        braid_core::config::load(path)
    }
}

impl WorkflowEntry {
    /// The graph file, resolved against `base` when relative.
    pub fn graph_path(&self, base: &Path) -> PathBuf {
        if self.graph.is_absolute() {
            self.graph.clone()
        } else {
            base.join(&self.graph)
        }
    }
}
