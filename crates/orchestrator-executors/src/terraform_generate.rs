// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! `terraform-generate` step executor: renders a Handlebars template from
//! step config into a `.tf` file under the workspace, for a later
//! `terraform` step to apply.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::registry::{StepExecutionInput, StepExecutionOutput, StepExecutor};

use crate::config_ext::require_str;
use crate::error::ExecutorError;

pub struct TerraformGenerateExecutor;

#[async_trait]
impl StepExecutor for TerraformGenerateExecutor {
    fn step_type(&self) -> &str {
        "terraform-generate"
    }

    async fn execute(&self, input: StepExecutionInput) -> Result<StepExecutionOutput> {
        let to_step_failed = |e: ExecutorError| OrchestratorError::StepFailed {
            step: input.step.name.clone(),
            reason: e.to_string(),
        };

        let template = require_str(&input.config, "template").map_err(to_step_failed)?;
        let file_name = input
            .config
            .get("file_name")
            .and_then(|v| v.as_str())
            .unwrap_or("main.tf");

        let mut registry = handlebars::Handlebars::new();
        registry
            .register_template_string("main", template)
            .map_err(|e| to_step_failed(ExecutorError::Other(e.to_string())))?;

        let rendered = registry
            .render("main", &input.config)
            .map_err(ExecutorError::from)
            .map_err(to_step_failed)?;

        let working_dir: PathBuf = input
            .config
            .get("working_dir")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                PathBuf::from(&input.workspace_root)
                    .join(&input.application_name)
                    .join("terraform")
            });
        std::fs::create_dir_all(&working_dir).map_err(|e| to_step_failed(ExecutorError::Spawn(e)))?;
        let target = working_dir.join(file_name);
        std::fs::write(&target, &rendered).map_err(|e| to_step_failed(ExecutorError::Spawn(e)))?;

        Ok(StepExecutionOutput {
            raw_output: format!("wrote {}", target.display()),
            outputs: HashMap::from([("file_path".to_string(), target.display().to_string())]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    #[tokio::test]
    async fn renders_template_to_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Map::new();
        config.insert(
            "template".to_string(),
            serde_json::Value::String("resource \"null_resource\" \"{{name}}\" {}".to_string()),
        );
        config.insert("name".to_string(), serde_json::Value::String("demo".to_string()));
        config.insert(
            "working_dir".to_string(),
            serde_json::Value::String(dir.path().display().to_string()),
        );

        let input = StepExecutionInput {
            step: orchestrator_core::workflow::Step::new("generate", "terraform-generate"),
            config,
            env: Map::new(),
            workspace_root: "workspaces".to_string(),
            application_name: "checkout".to_string(),
            execution_id: 1,
        };

        let output = TerraformGenerateExecutor.execute(input).await.unwrap();
        let written = std::fs::read_to_string(dir.path().join("main.tf")).unwrap();
        assert!(written.contains("null_resource"));
        assert!(written.contains("demo"));
        assert!(output.outputs.contains_key("file_path"));
    }
}
