// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! `terraform` step executor: runs `terraform init`/`apply` (or `plan` /
//! `destroy`) against a working directory and, on a successful apply,
//! captures `terraform output -json` into the step's outputs so later steps
//! can reference `${resources.<key>.<field>}`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::registry::{StepExecutionInput, StepExecutionOutput, StepExecutor};

use crate::config_ext::{str_or, string_map};
use crate::subprocess;

pub struct TerraformExecutor;

fn to_step_failed(input: &StepExecutionInput, err: impl std::fmt::Display) -> OrchestratorError {
    OrchestratorError::StepFailed {
        step: input.step.name.clone(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl StepExecutor for TerraformExecutor {
    fn step_type(&self) -> &str {
        "terraform"
    }

    async fn execute(&self, input: StepExecutionInput) -> Result<StepExecutionOutput> {
        let action = str_or(&input.config, "action", "apply");
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

        let vars = string_map(&input.config, "vars");
        let mut args: Vec<String> = vec!["init".to_string(), "-input=false".to_string()];
        subprocess::run("terraform", &str_refs(&args), &working_dir, &[])
            .await
            .map_err(|e| to_step_failed(&input, e))?;

        args = vec![action.to_string(), "-input=false".to_string(), "-auto-approve".to_string()];
        for (key, value) in &vars {
            args.push("-var".to_string());
            args.push(format!("{key}={value}"));
        }
        let apply_output = subprocess::run("terraform", &str_refs(&args), &working_dir, &[])
            .await
            .map_err(|e| to_step_failed(&input, e))?;

        let mut outputs = HashMap::new();
        if action == "apply" {
            if let Ok(output_json) = subprocess::run("terraform", &["output", "-json"], &working_dir, &[]).await {
                outputs = parse_terraform_outputs(&output_json.combined);
            }
        }

        Ok(StepExecutionOutput {
            raw_output: apply_output.combined,
            outputs,
        })
    }
}

fn str_refs(args: &[String]) -> Vec<&str> {
    args.iter().map(|s| s.as_str()).collect()
}

fn parse_terraform_outputs(json: &str) -> HashMap<String, String> {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(json) else {
        return HashMap::new();
    };
    map.into_iter()
        .filter_map(|(key, entry)| {
            let value = entry.get("value")?;
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((key, rendered))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_terraform_output_json() {
        let json = r#"{"host": {"value": "db.example.com", "type": "string"}, "port": {"value": 5432, "type": "number"}}"#;
        let outputs = parse_terraform_outputs(json);
        assert_eq!(outputs["host"], "db.example.com");
        assert_eq!(outputs["port"], "5432");
    }

    #[test]
    fn malformed_json_yields_no_outputs() {
        assert!(parse_terraform_outputs("not json").is_empty());
    }
}
