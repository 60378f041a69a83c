// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Passive step executors: `security`, `monitoring`, `validation`,
//! `cost-analysis`, `tagging`, `database-migration`, `vault-setup`. These
//! step types are named by the workflow model but their concrete side
//! effects are out of scope for this engine; they log their invocation and
//! always succeed, so dependent steps and variable interpolation behave as
//! if the real integration ran.

use async_trait::async_trait;
use std::collections::HashMap;

use orchestrator_core::error::Result;
use orchestrator_core::registry::{StepExecutionInput, StepExecutionOutput, StepExecutor};

pub struct PassiveExecutor {
    step_type: String,
}

impl PassiveExecutor {
    pub fn new(step_type: impl Into<String>) -> Self {
        Self {
            step_type: step_type.into(),
        }
    }
}

#[async_trait]
impl StepExecutor for PassiveExecutor {
    fn step_type(&self) -> &str {
        &self.step_type
    }

    async fn execute(&self, input: StepExecutionInput) -> Result<StepExecutionOutput> {
        tracing::info!(
            step = %input.step.name,
            step_type = %self.step_type,
            application = %input.application_name,
            "passive step executed"
        );
        Ok(StepExecutionOutput {
            raw_output: format!("{} step '{}' acknowledged", self.step_type, input.step.name),
            outputs: HashMap::new(),
        })
    }
}

pub const PASSIVE_STEP_TYPES: &[&str] = &[
    "security",
    "monitoring",
    "validation",
    "cost-analysis",
    "tagging",
    "database-migration",
    "vault-setup",
];

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::workflow::Step;

    #[tokio::test]
    async fn always_succeeds_and_echoes_step_type() {
        let executor = PassiveExecutor::new("security");
        let input = StepExecutionInput {
            step: Step::new("scan-image", "security"),
            config: HashMap::new(),
            env: HashMap::new(),
            workspace_root: "/tmp".to_string(),
            application_name: "checkout".to_string(),
            execution_id: 1,
        };
        let output = executor.execute(input).await.unwrap();
        assert!(output.raw_output.contains("security"));
    }
}
