//! Edges and edge conditions.

use std::fmt;
use std::sync::Arc;

use braid_core::State;

use crate::node::NodeId;

/// Condition name that marks an unconditional edge in definitions.
pub const DEFAULT_CONDITION: &str = "default";

type Predicate = Arc<dyn Fn(&State) -> bool + Send + Sync>;

/// An opaque, named predicate over a state snapshot.
#[derive(Clone)]
pub struct Condition {
    name: String,
    predicate: Predicate,
}

impl Condition {
    /// Create a named condition.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&State) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Condition that holds when `key` is truthy.
    pub fn truthy(key: impl Into<String>) -> Self {
        let key = key.into();
        let name = format!("if:{key}");
        Self::new(name, move |state| state.is_truthy(&key))
    }

    /// Condition that holds when `key` is absent or falsy.
    pub fn falsy(key: impl Into<String>) -> Self {
        let key = key.into();
        let name = format!("unless:{key}");
        Self::new(name, move |state| !state.is_truthy(&key))
    }

    /// The name this condition was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate against a state.
    #[must_use]
    pub fn evaluate(&self, state: &State) -> bool {
        (self.predicate)(state)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A directed, optionally conditional transition.
#[derive(Debug, Clone)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub condition: Option<Condition>,
}

impl Edge {
    /// Whether this edge may be taken from `state`.
    ///
    /// An edge without a condition is always eligible.
    #[must_use]
    pub fn is_eligible(&self, state: &State) -> bool {
        self.condition.as_ref().is_none_or(|c| c.evaluate(state))
    }

    /// Name of the condition, `"default"` when unconditional.
    #[must_use]
    pub fn condition_name(&self) -> &str {
        self.condition
            .as_ref()
            .map_or(DEFAULT_CONDITION, Condition::name)
    }
}

/// Pick the first eligible edge in the order given.
///
/// Deterministic: the same state and the same edge order always yield the
/// same edge.
pub fn select_edge<'a, I>(edges: I, state: &State) -> Option<&'a Edge>
where
    I: IntoIterator<Item = &'a Edge>,
{
    edges.into_iter().find(|edge| edge.is_eligible(state))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn edge(target: &str, condition: Option<Condition>) -> Edge {
        Edge {
            source: "a".into(),
            target: target.into(),
            condition,
        }
    }

    #[test]
    fn test_unconditional_edge_is_always_eligible() {
        let e = edge("b", None);
        assert!(e.is_eligible(&State::new()));
        assert_eq!(e.condition_name(), DEFAULT_CONDITION);
    }

    #[test]
    fn test_first_eligible_wins_even_before_default() {
        let edges = vec![
            edge("never", Some(Condition::new("never", |_| false))),
            edge("flagged", Some(Condition::truthy("flag"))),
            edge("fallback", None),
        ];

        let flagged = State::new().with("flag", true);
        assert_eq!(select_edge(&edges, &flagged).unwrap().target, "flagged");
        assert_eq!(select_edge(&edges, &State::new()).unwrap().target, "fallback");
    }

    #[test]
    fn test_no_edge_when_nothing_eligible() {
        let edges = vec![edge("b", Some(Condition::falsy("done")))];
        assert!(select_edge(&edges, &State::new().with("done", true)).is_none());
    }
}
