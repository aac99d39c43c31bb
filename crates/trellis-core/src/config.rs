//! Configuration for the workflow engine
//!
//! Values come from serde (e.g. a host's config file) or from environment
//! variables via [`EngineConfig::from_env`].

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

/// How concurrent resumes of the same workflow instance are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// No locking and no version checks
    #[default]
    Unguarded,
    /// Saves and deletes carry the loaded version; stale writes are rejected
    Optimistic,
    /// One resume at a time per instance, later ones wait for the lock
    Exclusive,
}

impl FromStr for ConcurrencyPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unguarded" => Ok(Self::Unguarded),
            "optimistic" => Ok(Self::Optimistic),
            "exclusive" => Ok(Self::Exclusive),
            other => Err(CoreError::ConfigurationError(format!(
                "Unknown concurrency policy: {}",
                other
            ))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Handling of concurrent resumes on one instance
    #[serde(default)]
    pub concurrency_policy: ConcurrencyPolicy,

    /// Upper bound of activities executed by a single traversal
    #[serde(default = "default_max_activity_executions")]
    pub max_activity_executions: usize,
}

fn default_max_activity_executions() -> usize {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency_policy: ConcurrencyPolicy::default(),
            max_activity_executions: default_max_activity_executions(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `TRELLIS_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(policy) = env::var("TRELLIS_CONCURRENCY_POLICY") {
            match policy.parse() {
                Ok(policy) => config.concurrency_policy = policy,
                Err(e) => warn!("Invalid TRELLIS_CONCURRENCY_POLICY value: {}", e),
            }
        }

        if let Ok(max) = env::var("TRELLIS_MAX_ACTIVITY_EXECUTIONS") {
            match max.parse::<usize>() {
                Ok(max) if max > 0 => config.max_activity_executions = max,
                _ => warn!("Invalid TRELLIS_MAX_ACTIVITY_EXECUTIONS value: {}", max),
            }
        }

        config
    }

    /// Set the concurrency policy
    pub fn with_concurrency_policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.concurrency_policy = policy;
        self
    }

    /// Set the per-traversal execution cap
    pub fn with_max_activity_executions(mut self, max: usize) -> Self {
        self.max_activity_executions = max;
        self
    }
}
