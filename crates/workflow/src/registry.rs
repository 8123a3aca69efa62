//! Registries that turn names found in graph definitions into handlers and
//! conditions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use braid_core::State;
use serde_json::Value;

use crate::edge::{Condition, DEFAULT_CONDITION};
use crate::error::{GraphError, Result};
use crate::node::{NoOpNode, NodeHandler, NodeId, StateUpdate, node_fn};

/// Builds a handler for one node from its opaque descriptor.
pub type NodeFactory = Arc<dyn Fn(&str, &Value) -> Result<Arc<dyn NodeHandler>> + Send + Sync>;

/// Registry of node handler factories, keyed by handler name.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: HashMap<String, NodeFactory>,
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names();
        names.sort_unstable();
        f.debug_struct("NodeRegistry")
            .field("handlers", &names)
            .finish()
    }
}

impl NodeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in handlers `noop`, `set` and
    /// `increment`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_handler("noop", Arc::new(NoOpNode));
        registry.register("set", build_set);
        registry.register("increment", build_increment);
        registry
    }

    /// Register a factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&str, &Value) -> Result<Arc<dyn NodeHandler>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Register one shared handler used for every node naming it.
    pub fn register_handler(&mut self, name: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        self.register(name, move |_, _| Ok(Arc::clone(&handler)));
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered handler names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build the handler for `node` from its descriptor.
    ///
    /// # Errors
    ///
    /// * `GraphError::UnknownHandler` when the resolved name is not registered
    /// * whatever the factory reports for a malformed descriptor
    pub fn resolve(&self, node: &str, descriptor: &Value) -> Result<Arc<dyn NodeHandler>> {
        let name = handler_name(node, descriptor);
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| GraphError::unknown_handler(node, name))?;
        factory(node, descriptor)
    }
}

/// The handler name a descriptor asks for.
///
/// Resolution order: the descriptor's `"handler"` field, the descriptor
/// itself when it is a string, then the node id.
#[must_use]
pub fn handler_name<'a>(node: &'a str, descriptor: &'a Value) -> &'a str {
    match descriptor {
        Value::String(name) => name.as_str(),
        Value::Object(fields) => fields
            .get("handler")
            .and_then(Value::as_str)
            .unwrap_or(node),
        _ => node,
    }
}

fn build_set(node: &str, descriptor: &Value) -> Result<Arc<dyn NodeHandler>> {
    let values = descriptor
        .get("values")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    let values = State::from_value(values)
        .map_err(|e| GraphError::invalid_descriptor(node, format!("'values': {e}")))?;
    Ok(node_fn(move |_| Ok(StateUpdate::Merge(values.clone()))))
}

fn build_increment(node: &str, descriptor: &Value) -> Result<Arc<dyn NodeHandler>> {
    let key: NodeId = descriptor
        .get("key")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GraphError::invalid_descriptor(node, "'key' must be a string"))?;
    let by = match descriptor.get("by") {
        None => 1,
        Some(v) => v
            .as_i64()
            .ok_or_else(|| GraphError::invalid_descriptor(node, "'by' must be an integer"))?,
    };
    Ok(node_fn(move |state| {
        let current = state.get_as::<i64>(&key)?.unwrap_or(0);
        Ok(StateUpdate::Merge(
            State::new().with(key.clone(), current.saturating_add(by)),
        ))
    }))
}

/// Registry of named edge conditions.
///
/// Besides registered names it understands `if:<key>` (field truthy) and
/// `unless:<key>` (field absent or falsy). An empty name or `"default"`
/// means the edge is unconditional.
#[derive(Debug, Clone, Default)]
pub struct ConditionRegistry {
    conditions: HashMap<String, Condition>,
}

impl ConditionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&State) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        self.conditions
            .insert(name.clone(), Condition::new(name, predicate));
    }

    /// Look up a condition by name. `Ok(None)` is the unconditional edge.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::UnknownCondition` for a name that is neither
    /// registered nor built in.
    pub fn resolve(&self, name: &str) -> Result<Option<Condition>> {
        let name = name.trim();
        if name.is_empty() || name == DEFAULT_CONDITION {
            return Ok(None);
        }
        if let Some(condition) = self.conditions.get(name) {
            return Ok(Some(condition.clone()));
        }
        if let Some(key) = name.strip_prefix("if:") {
            return Ok(Some(Condition::truthy(key)));
        }
        if let Some(key) = name.strip_prefix("unless:") {
            return Ok(Some(Condition::falsy(key)));
        }
        Err(GraphError::UnknownCondition(name.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::node::NodeContext;
    use serde_json::json;

    #[test]
    fn test_handler_name_resolution_order() {
        assert_eq!(handler_name("n", &json!({"handler": "set"})), "set");
        assert_eq!(handler_name("n", &json!("increment")), "increment");
        assert_eq!(handler_name("n", &json!({"values": {}})), "n");
        assert_eq!(handler_name("n", &Value::Null), "n");
    }

    #[test]
    fn test_unknown_handler_names_node() {
        let registry = NodeRegistry::with_builtins();
        let err = match registry.resolve("think", &json!("llm")) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err, GraphError::unknown_handler("think", "llm"));
    }

    #[tokio::test]
    async fn test_builtin_set_merges_values() {
        let registry = NodeRegistry::with_builtins();
        let handler = registry
            .resolve("init", &json!({"handler": "set", "values": {"phase": "detect"}}))
            .unwrap();
        let update = handler
            .run(&State::new(), &NodeContext::detached("init"))
            .await
            .unwrap();
        assert_eq!(
            update,
            StateUpdate::Merge(State::new().with("phase", "detect"))
        );
    }

    #[tokio::test]
    async fn test_builtin_increment() {
        let registry = NodeRegistry::with_builtins();
        let handler = registry
            .resolve("tick", &json!({"handler": "increment", "key": "n", "by": 2}))
            .unwrap();
        let update = handler
            .run(&State::new().with("n", 3), &NodeContext::detached("tick"))
            .await
            .unwrap();
        assert_eq!(update, StateUpdate::Merge(State::new().with("n", 5)));
    }

    #[test]
    fn test_increment_requires_key() {
        let registry = NodeRegistry::with_builtins();
        assert!(matches!(
            registry.resolve("tick", &json!({"handler": "increment"})),
            Err(GraphError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_condition_resolution() {
        let mut registry = ConditionRegistry::new();
        registry.register("needs_more", |s: &State| !s.is_truthy("done"));

        assert!(registry.resolve("").unwrap().is_none());
        assert!(registry.resolve("default").unwrap().is_none());

        let needs_more = registry.resolve("needs_more").unwrap().unwrap();
        assert!(needs_more.evaluate(&State::new()));

        let flag = registry.resolve("if:ready").unwrap().unwrap();
        assert!(flag.evaluate(&State::new().with("ready", true)));
        assert!(!flag.evaluate(&State::new()));

        assert_eq!(
            registry.resolve("whenever").unwrap_err(),
            GraphError::UnknownCondition("whenever".into())
        );
    }
}
