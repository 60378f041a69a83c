// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! `git-commit-manifests` step executor: stages and commits generated
//! manifests in a GitOps repository checkout, then pushes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::registry::{StepExecutionInput, StepExecutionOutput, StepExecutor};

use crate::config_ext::str_or;
use crate::subprocess;

pub struct GitCommitManifestsExecutor;

#[async_trait]
impl StepExecutor for GitCommitManifestsExecutor {
    fn step_type(&self) -> &str {
        "git-commit-manifests"
    }

    async fn execute(&self, input: StepExecutionInput) -> Result<StepExecutionOutput> {
        let to_step_failed = |e: crate::error::ExecutorError| OrchestratorError::StepFailed {
            step: input.step.name.clone(),
            reason: e.to_string(),
        };

        let working_dir: PathBuf = input
            .config
            .get("working_dir")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                PathBuf::from(&input.workspace_root)
                    .join(&input.application_name)
                    .join("gitops")
            });
        let message = str_or(&input.config, "message", "chore: update generated manifests").to_string();

        subprocess::run("git", &["add", "-A"], &working_dir, &[])
            .await
            .map_err(to_step_failed)?;

        let commit = subprocess::run("git", &["commit", "-m", &message], &working_dir, &[]).await;
        let commit_output = match commit {
            Ok(output) => output.combined,
            Err(crate::error::ExecutorError::NonZeroExit { tail, .. }) if tail.contains("nothing to commit") => {
                "nothing to commit".to_string()
            }
            Err(e) => return Err(to_step_failed(e)),
        };

        let push = subprocess::run("git", &["push"], &working_dir, &[])
            .await
            .map_err(to_step_failed)?;

        Ok(StepExecutionOutput {
            raw_output: format!("{commit_output}\n{}", push.combined),
            outputs: HashMap::new(),
        })
    }
}
