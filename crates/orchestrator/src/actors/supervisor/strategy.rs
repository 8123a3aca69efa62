#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Restart strategies for supervisor actor management.
//!
//! This module defines a pluggable strategy pattern for how supervisors
//! handle child failures. Each strategy determines which children to restart
//! when a child crashes.
//!
//! # Strategy Types
//!
//! - **OneForOne**: restart only the failed child (siblings unaffected)
//! - **OneForAll**: restart every child of the supervisor
//! - **RestForOne**: restart the failed child and every child spawned after
//!   it, in spawn order
//!
//! Whether a restart is allowed at all is decided by the per-child
//! [`RestartTracker`](super::restart::RestartTracker); a strategy only
//! escalates when told the budget is spent.
//!
//! # Example
//!
//! ```
//! use orchestrator::actors::supervisor::strategy::{
//!     RestartContext, RestartDecision, RestartStrategy, RestForOne,
//! };
//!
//! let children = vec!["db".to_string(), "cache".to_string(), "api".to_string()];
//! let ctx = RestartContext::new("cache", "connection reset", &children);
//!
//! assert_eq!(
//!     RestForOne::new().on_child_failure(&ctx),
//!     RestartDecision::Restart {
//!         child_names: vec!["cache".to_string(), "api".to_string()],
//!     }
//! );
//! ```

use std::fmt;

/// Context provided to restart strategies for decision-making.
#[derive(Debug, Clone)]
pub struct RestartContext<'a> {
    /// Name of the child that failed.
    pub child_name: String,
    /// Reason for failure.
    pub failure_reason: String,
    /// Every current child, in spawn order.
    pub children: &'a [String],
    /// Whether the failed child has used up its restart budget.
    pub restarts_exhausted: bool,
}

impl<'a> RestartContext<'a> {
    /// Create a new restart context.
    #[must_use]
    pub fn new(
        child_name: impl Into<String>,
        failure_reason: impl Into<String>,
        children: &'a [String],
    ) -> Self {
        Self {
            child_name: child_name.into(),
            failure_reason: failure_reason.into(),
            children,
            restarts_exhausted: false,
        }
    }

    /// Mark the restart budget as spent.
    #[must_use]
    pub const fn exhausted(mut self, exhausted: bool) -> Self {
        self.restarts_exhausted = exhausted;
        self
    }

    /// Get all child names, in spawn order.
    #[must_use]
    pub fn all_children(&self) -> Vec<String> {
        self.children.to_vec()
    }

    /// The failed child and every sibling spawned after it.
    #[must_use]
    pub fn failed_and_younger(&self) -> Vec<String> {
        self.children
            .iter()
            .skip_while(|name| **name != self.child_name)
            .cloned()
            .collect()
    }
}

/// Decision returned by restart strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart specified children, in this order.
    Restart {
        /// Names of children to restart.
        child_names: Vec<String>,
    },
    /// Give up on the child and escalate to the parent supervisor.
    Escalate,
}

/// Trait for restart strategies.
///
/// Strategies determine which children to restart when a child crashes.
pub trait RestartStrategy: Send + Sync + fmt::Debug {
    /// Get strategy name.
    fn name(&self) -> &'static str;

    /// Determine what to do when a child fails.
    fn on_child_failure(&self, ctx: &RestartContext<'_>) -> RestartDecision;
}

/// One-for-one restart strategy.
///
/// When a child crashes, restart only that child. Siblings are unaffected.
/// This is the default Erlang/OTP supervision behavior.
#[derive(Debug, Clone, Default)]
pub struct OneForOne;

impl OneForOne {
    /// Create a new one-for-one strategy.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl RestartStrategy for OneForOne {
    fn name(&self) -> &'static str {
        "one_for_one"
    }

    fn on_child_failure(&self, ctx: &RestartContext<'_>) -> RestartDecision {
        if ctx.restarts_exhausted {
            RestartDecision::Escalate
        } else {
            RestartDecision::Restart {
                child_names: vec![ctx.child_name.clone()],
            }
        }
    }
}

/// One-for-all restart strategy.
///
/// When a child crashes, restart all children. This is useful when
/// children share assumptions and a crash indicates systemic failure.
#[derive(Debug, Clone, Default)]
pub struct OneForAll;

impl OneForAll {
    /// Create a new one-for-all strategy.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl RestartStrategy for OneForAll {
    fn name(&self) -> &'static str {
        "one_for_all"
    }

    fn on_child_failure(&self, ctx: &RestartContext<'_>) -> RestartDecision {
        if ctx.restarts_exhausted {
            RestartDecision::Escalate
        } else {
            RestartDecision::Restart {
                child_names: ctx.all_children(),
            }
        }
    }
}

/// Rest-for-one restart strategy.
///
/// When a child crashes, restart it and every child spawned after it.
/// Children started earlier keep running. This fits pipelines where later
/// children depend on earlier ones.
#[derive(Debug, Clone, Default)]
pub struct RestForOne;

impl RestForOne {
    /// Create a new rest-for-one strategy.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl RestartStrategy for RestForOne {
    fn name(&self) -> &'static str {
        "rest_for_one"
    }

    fn on_child_failure(&self, ctx: &RestartContext<'_>) -> RestartDecision {
        if ctx.restarts_exhausted {
            return RestartDecision::Escalate;
        }
        let child_names = ctx.failed_and_younger();
        if child_names.is_empty() {
            // The failed child is no longer listed; restart it alone.
            RestartDecision::Restart {
                child_names: vec![ctx.child_name.clone()],
            }
        } else {
            RestartDecision::Restart { child_names }
        }
    }
}
