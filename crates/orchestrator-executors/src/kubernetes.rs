// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! `kubernetes` step executor: applies a manifest (inline or from a file)
//! via `kubectl apply`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::registry::{StepExecutionInput, StepExecutionOutput, StepExecutor};

use crate::error::ExecutorError;
use crate::subprocess;

pub struct KubernetesExecutor;

#[async_trait]
impl StepExecutor for KubernetesExecutor {
    fn step_type(&self) -> &str {
        "kubernetes"
    }

    async fn execute(&self, input: StepExecutionInput) -> Result<StepExecutionOutput> {
        let to_step_failed = |e: ExecutorError| OrchestratorError::StepFailed {
            step: input.step.name.clone(),
            reason: e.to_string(),
        };

        let working_dir = PathBuf::from(&input.workspace_root)
            .join(&input.application_name)
            .join("kubernetes");
        std::fs::create_dir_all(&working_dir).map_err(|e| to_step_failed(ExecutorError::Spawn(e)))?;

        let manifest_path = if let Some(manifest) = input.config.get("manifest").and_then(|v| v.as_str()) {
            let path = working_dir.join(format!("{}.yaml", input.step.name));
            std::fs::write(&path, manifest).map_err(|e| to_step_failed(ExecutorError::Spawn(e)))?;
            path
        } else if let Some(path) = input.config.get("manifest_file").and_then(|v| v.as_str()) {
            PathBuf::from(path)
        } else {
            return Err(to_step_failed(ExecutorError::MissingConfig(
                "manifest or manifest_file".to_string(),
            )));
        };

        let namespace = input.config.get("namespace").and_then(|v| v.as_str());
        let manifest_str = manifest_path.display().to_string();
        let mut args = vec!["apply", "-f", manifest_str.as_str()];
        if let Some(ns) = namespace {
            args.push("-n");
            args.push(ns);
        }

        let output = subprocess::run("kubectl", &args, &working_dir, &[])
            .await
            .map_err(to_step_failed)?;

        Ok(StepExecutionOutput {
            raw_output: output.combined,
            outputs: HashMap::new(),
        })
    }
}
