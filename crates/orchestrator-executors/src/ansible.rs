// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! `ansible` step executor: runs `ansible-playbook` against a playbook and
//! optional inventory file named in step config.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::registry::{StepExecutionInput, StepExecutionOutput, StepExecutor};

use crate::config_ext::require_str;
use crate::subprocess;

pub struct AnsibleExecutor;

#[async_trait]
impl StepExecutor for AnsibleExecutor {
    fn step_type(&self) -> &str {
        "ansible"
    }

    async fn execute(&self, input: StepExecutionInput) -> Result<StepExecutionOutput> {
        let to_step_failed = |e: crate::error::ExecutorError| OrchestratorError::StepFailed {
            step: input.step.name.clone(),
            reason: e.to_string(),
        };

        let playbook = require_str(&input.config, "playbook").map_err(to_step_failed)?;
        let working_dir = PathBuf::from(&input.workspace_root)
            .join(&input.application_name)
            .join("ansible");

        let mut args = vec![playbook];
        if let Some(inventory) = input.config.get("inventory").and_then(|v| v.as_str()) {
            args.push("-i");
            args.push(inventory);
        }

        let output = subprocess::run("ansible-playbook", &args, &working_dir, &[])
            .await
            .map_err(to_step_failed)?;

        Ok(StepExecutionOutput {
            raw_output: output.combined,
            outputs: HashMap::new(),
        })
    }
}
