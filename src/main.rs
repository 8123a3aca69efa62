//! # Braid service
//!
//! Loads a configuration file, starts the actor runtime and the
//! orchestrator, registers the configured workflows, then feeds context
//! updates read from stdin (one JSON object per line) to the context
//! monitor until Ctrl+C.
//!
//! ```text
//! {"type": "chat", "content": "we have an incident on the api", "confidence": 0.9}
//! ```
//!
//! On shutdown the final workflow snapshots are printed to stdout as JSON.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use braid_events::{EventBus, InMemoryStateStore, StateStore};
use braid_workflow::{ConditionRegistry, GraphDefinition, GraphError, NodeHandler, NodeRegistry};
use clap::Parser;
use orchestrator::actors::{ActorSpec, ActorSystem, EchoBehavior, SupervisorSpec};
use orchestrator::{ActorNode, ContextUpdate, Orchestrator};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::BraidConfig;

/// Braid - context-triggered reasoning workflows on a supervised actor runtime
#[derive(Parser, Debug)]
#[command(name = "braid")]
#[command(version)]
struct Cli {
    /// Configuration file (.toml, .yaml or .json)
    #[arg(short, long)]
    config: PathBuf,

    /// Validate the configuration and every graph, then exit
    #[arg(long, default_value_t = false)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = BraidConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    let base = cli
        .config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let bus = Arc::new(EventBus::new());
    let event_log = tokio::spawn(log_events(Arc::clone(&bus)));

    let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let system = Arc::new(
        ActorSystem::start_with(root_spec(&config), bus.clone(), store.clone())
            .await
            .context("Failed to start actor runtime")?,
    );
    info!(actors = ?system.actor_ids().await, "Actor runtime started");

    let orchestrator = Orchestrator::new(config.orchestrator.clone(), bus, store);
    register_workflows(&orchestrator, &config, &base, &system).await?;

    if cli.check {
        info!(workflows = config.workflows.len(), "Configuration is valid");
        system.shutdown().await;
        event_log.abort();
        return Ok(());
    }

    let cancel = CancellationToken::new();
    orchestrator
        .start_monitoring(cancel.clone())
        .await
        .context("Failed to start context monitoring")?;

    info!("Braid is running. Reading context updates from stdin; press Ctrl+C to stop.");
    tokio::select! {
        () = feed_context(&orchestrator) => wait_for_shutdown().await,
        () = wait_for_shutdown() => {}
    }

    cancel.cancel();
    orchestrator.stop_monitoring().await;
    system.shutdown().await;

    let snapshots = orchestrator.list_workflows().await;
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshots).context("Failed to render workflow status")?
    );
    info!(stats = ?orchestrator.stats().await, "Braid stopped");
    event_log.abort();
    Ok(())
}

/// Log every runtime event published on the bus.
async fn log_events(bus: Arc<EventBus>) {
    let mut events = bus.subscribe();
    while let Ok(event) = events.recv().await {
        debug!(
            event_type = %event.event_type,
            source = %event.source,
            payload = %event.payload,
            "Runtime event"
        );
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn root_spec(config: &BraidConfig) -> SupervisorSpec {
    config.actors.iter().fold(
        SupervisorSpec::new("root", config.supervisor.clone()),
        |spec, actor| {
            let actor_spec = ActorSpec::from_behavior(actor.id.clone(), EchoBehavior);
            spec.with_actor(if actor.checkpoint {
                actor_spec.with_checkpoint()
            } else {
                actor_spec
            })
        },
    )
}

/// Handler registry: the built-ins plus `actor`, which dispatches the
/// node to an actor of the runtime.
///
/// ```yaml
/// ask_echo: { handler: actor, actor: echo, message_type: review, timeout_ms: 5000 }
/// ```
fn node_registry(system: &Arc<ActorSystem>) -> NodeRegistry {
    let mut registry = NodeRegistry::with_builtins();
    let system = Arc::clone(system);
    registry.register("actor", move |node, descriptor| {
        let actor = descriptor
            .get("actor")
            .and_then(Value::as_str)
            .ok_or_else(|| GraphError::invalid_descriptor(node, "'actor' must be a string"))?;
        let message_type = descriptor
            .get("message_type")
            .and_then(Value::as_str)
            .unwrap_or(node);
        let mut handler = ActorNode::new(Arc::clone(&system), actor, message_type);
        if let Some(millis) = descriptor.get("timeout_ms").and_then(Value::as_u64) {
            handler = handler.with_timeout(Duration::from_millis(millis));
        }
        if let Some(key) = descriptor.get("result_key").and_then(Value::as_str) {
            handler = handler.with_result_key(key);
        }
        Ok(Arc::new(handler) as Arc<dyn NodeHandler>)
    });
    registry
}

async fn register_workflows(
    orchestrator: &Orchestrator,
    config: &BraidConfig,
    base: &Path,
    system: &Arc<ActorSystem>,
) -> Result<()> {
    let nodes = node_registry(system);
    let conditions = ConditionRegistry::new();

    for entry in &config.workflows {
        let path = entry.graph_path(base);
        let definition = GraphDefinition::load(&path)
            .with_context(|| format!("Failed to load graph {}", path.display()))?;
        let graph = definition
            .build(entry.name.clone(), &nodes, &conditions)
            .with_context(|| format!("Invalid graph for workflow '{}'", entry.name))?;
        let id = orchestrator
            .create_workflow_with_graph(
                entry.name.clone(),
                entry.description.clone(),
                entry.config.clone(),
                graph,
            )
            .await
            .with_context(|| format!("Failed to register workflow '{}'", entry.name))?;
        info!(
            workflow_id = %id,
            name = %entry.name,
            auto_trigger = entry.config.auto_trigger,
            "Workflow registered"
        );
    }
    Ok(())
}

/// Forward JSON-lines context updates from stdin until EOF.
async fn feed_context(orchestrator: &Orchestrator) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<ContextUpdate>(&line) {
                Ok(update) => {
                    if let Err(e) = orchestrator.update_context(update).await {
                        warn!(error = %e, "Context update dropped");
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring malformed context update"),
            },
            Ok(None) => {
                info!("Input closed; waiting for Ctrl+C");
                return;
            }
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                return;
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
