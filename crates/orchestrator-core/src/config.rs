// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Process-wide configuration for the workflow executor.

use std::time::Duration;

/// Process-wide executor configuration, constructed from environment
/// variables with documented defaults (the teacher crates' `from_env()`
/// convention rather than a config-file layer, since none is used upstream).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline applied to every step dispatch. Default: 30 minutes.
    pub execution_timeout: Duration,
    /// Max resolved workflows run concurrently within one phase. Default: 5.
    pub max_concurrent_workflows: usize,
    /// Whether unresolved variable references fail a workflow before it runs.
    pub strict_validation: bool,
    /// Root directory generator/provider steps write under (`workspaces/<app>/<tool>/`).
    pub workspace_root: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(30 * 60),
            max_concurrent_workflows: 5,
            strict_validation: true,
            workspace_root: "workspaces".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Builds configuration from the process environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            strict_validation: std::env::var("STRICT_VALIDATION")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1"))
                .unwrap_or(defaults.strict_validation),
            execution_timeout: std::env::var("EXECUTION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.execution_timeout),
            max_concurrent_workflows: std::env::var("MAX_CONCURRENT_WORKFLOWS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(defaults.max_concurrent_workflows),
            workspace_root: std::env::var("WORKSPACE_ROOT").unwrap_or(defaults.workspace_root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.execution_timeout, Duration::from_secs(1800));
        assert_eq!(config.max_concurrent_workflows, 5);
        assert!(config.strict_validation);
        assert_eq!(config.workspace_root, "workspaces");
    }
}
