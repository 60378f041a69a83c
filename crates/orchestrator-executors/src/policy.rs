// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! `policy` step executor: runs a policy-check script (e.g. an `opa eval`
//! wrapper or a repo-local validation script) and fails the step on a
//! non-zero exit.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::registry::{StepExecutionInput, StepExecutionOutput, StepExecutor};

use crate::config_ext::require_str;
use crate::subprocess;

pub struct PolicyExecutor;

#[async_trait]
impl StepExecutor for PolicyExecutor {
    fn step_type(&self) -> &str {
        "policy"
    }

    async fn execute(&self, input: StepExecutionInput) -> Result<StepExecutionOutput> {
        let to_step_failed = |e: crate::error::ExecutorError| OrchestratorError::StepFailed {
            step: input.step.name.clone(),
            reason: e.to_string(),
        };

        let script = require_str(&input.config, "script").map_err(to_step_failed)?;
        let extra_args: Vec<&str> = input
            .config
            .get("args")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let working_dir = PathBuf::from(&input.workspace_root)
            .join(&input.application_name)
            .join("policy");

        let output = subprocess::run(script, &extra_args, &working_dir, &[])
            .await
            .map_err(to_step_failed)?;

        Ok(StepExecutionOutput {
            raw_output: output.combined,
            outputs: HashMap::new(),
        })
    }
}
