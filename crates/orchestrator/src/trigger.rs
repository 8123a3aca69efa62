//! Trigger conditions and the context updates they are matched against.
//!
//! A condition matches an update when its pattern is satisfied by the
//! update's type or content AND the update's confidence reaches the
//! condition's threshold. Among several matching conditions of one
//! workflow the highest priority wins; equal priorities go to the one
//! declared first.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OrchestratorError, Result};

/// How a condition's pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Case-insensitive equality with the context type; `*` matches any.
    ContextType,
    /// Regular expression searched in the context type and content.
    ContextPattern,
    /// Case-insensitive substring of the content.
    Keyword,
}

/// A rule that fires its workflow when observed context matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerCondition {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub pattern: String,
    /// Higher wins among matching conditions.
    #[serde(default)]
    pub priority: i32,
    /// Minimum confidence, in `0.0..=1.0`.
    #[serde(default)]
    pub threshold: f64,
}

impl TriggerCondition {
    pub fn new(trigger_type: TriggerType, pattern: impl Into<String>) -> Self {
        Self {
            trigger_type,
            pattern: pattern.into(),
            priority: 0,
            threshold: 0.0,
        }
    }

    pub fn context_type(pattern: impl Into<String>) -> Self {
        Self::new(TriggerType::ContextType, pattern)
    }

    pub fn context_pattern(pattern: impl Into<String>) -> Self {
        Self::new(TriggerType::ContextPattern, pattern)
    }

    pub fn keyword(pattern: impl Into<String>) -> Self {
        Self::new(TriggerType::Keyword, pattern)
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

/// A validated condition ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledTrigger {
    condition: TriggerCondition,
    regex: Option<Regex>,
    keyword: String,
}

impl CompiledTrigger {
    /// Validate a condition.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidTrigger`] for a threshold outside
    /// `0.0..=1.0`, an empty pattern, or a `context_pattern` that is not a
    /// valid regular expression.
    pub fn compile(condition: TriggerCondition) -> Result<Self> {
        if !(0.0..=1.0).contains(&condition.threshold) {
            return Err(OrchestratorError::invalid_trigger(
                &condition.pattern,
                format!("threshold {} is outside 0..=1", condition.threshold),
            ));
        }
        if condition.pattern.is_empty() {
            return Err(OrchestratorError::invalid_trigger(
                &condition.pattern,
                "pattern is empty",
            ));
        }
        let regex = match condition.trigger_type {
            TriggerType::ContextPattern => Some(
                Regex::new(&condition.pattern)
                    .map_err(|e| OrchestratorError::invalid_trigger(&condition.pattern, e.to_string()))?,
            ),
            TriggerType::ContextType | TriggerType::Keyword => None,
        };
        Ok(Self {
            keyword: condition.pattern.to_lowercase(),
            regex,
            condition,
        })
    }

    #[must_use]
    pub const fn condition(&self) -> &TriggerCondition {
        &self.condition
    }

    /// Whether this condition fires for `update`.
    #[must_use]
    pub fn matches(&self, update: &ContextUpdate) -> bool {
        // NaN confidence never reaches a threshold.
        if update.confidence.is_nan() || update.confidence < self.condition.threshold {
            return false;
        }
        match self.condition.trigger_type {
            TriggerType::ContextType => {
                self.condition.pattern == "*"
                    || self
                        .condition
                        .pattern
                        .eq_ignore_ascii_case(&update.context_type)
            }
            TriggerType::ContextPattern => self.regex.as_ref().is_some_and(|re| {
                re.is_match(&update.context_type) || re.is_match(&update.content)
            }),
            TriggerType::Keyword => update.content.to_lowercase().contains(&self.keyword),
        }
    }
}

/// Compile a workflow's conditions, keeping declaration order.
///
/// # Errors
///
/// Returns the first [`OrchestratorError::InvalidTrigger`].
pub fn compile_all(conditions: &[TriggerCondition]) -> Result<Vec<CompiledTrigger>> {
    conditions
        .iter()
        .cloned()
        .map(CompiledTrigger::compile)
        .collect()
}

/// The winning condition for `update`, if any matches.
#[must_use]
pub fn best_match<'a>(
    triggers: &'a [CompiledTrigger],
    update: &ContextUpdate,
) -> Option<&'a CompiledTrigger> {
    triggers
        .iter()
        .filter(|t| t.matches(update))
        .fold(None, |best: Option<&CompiledTrigger>, candidate| match best {
            Some(current) if current.condition.priority >= candidate.condition.priority => {
                Some(current)
            }
            _ => Some(candidate),
        })
}

const fn full_confidence() -> f64 {
    1.0
}

/// One observation fed to the context monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextUpdate {
    #[serde(rename = "type")]
    pub context_type: String,
    #[serde(default)]
    pub content: String,
    /// Reported confidence, `0.0..=1.0`.
    #[serde(default = "full_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ContextUpdate {
    pub fn new(context_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            context_type: context_type.into(),
            content: content.into(),
            confidence: full_confidence(),
            source: None,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
