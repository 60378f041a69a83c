// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! `argocd-app` step executor: creates or updates an ArgoCD `Application`
//! resource via its REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::registry::{StepExecutionInput, StepExecutionOutput, StepExecutor};

use crate::config_ext::{require_str, str_or};
use crate::error::ExecutorError;

#[derive(Debug, Serialize)]
struct ApplicationSpec {
    metadata: ApplicationMetadata,
    spec: ApplicationBody,
}

#[derive(Debug, Serialize)]
struct ApplicationMetadata {
    name: String,
}

#[derive(Debug, Serialize)]
struct ApplicationBody {
    project: String,
    source: ApplicationSource,
    destination: ApplicationDestination,
}

#[derive(Debug, Serialize)]
struct ApplicationSource {
    #[serde(rename = "repoURL")]
    repo_url: String,
    path: String,
    #[serde(rename = "targetRevision")]
    target_revision: String,
}

#[derive(Debug, Serialize)]
struct ApplicationDestination {
    server: String,
    namespace: String,
}

pub struct ArgoCdAppExecutor {
    client: Client,
}

impl Default for ArgoCdAppExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgoCdAppExecutor {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build HTTP client"),
        }
    }
}

#[async_trait]
impl StepExecutor for ArgoCdAppExecutor {
    fn step_type(&self) -> &str {
        "argocd-app"
    }

    async fn execute(&self, input: StepExecutionInput) -> Result<StepExecutionOutput> {
        let to_step_failed = |e: ExecutorError| OrchestratorError::StepFailed {
            step: input.step.name.clone(),
            reason: e.to_string(),
        };

        let base_url = require_str(&input.config, "base_url").map_err(to_step_failed)?;
        let app_name = require_str(&input.config, "app_name").map_err(to_step_failed)?;
        let repo_url = require_str(&input.config, "repo_url").map_err(to_step_failed)?;
        let path = str_or(&input.config, "path", ".");
        let project = str_or(&input.config, "project", "default");
        let dest_namespace = require_str(&input.config, "dest_namespace").map_err(to_step_failed)?;
        let dest_server = str_or(&input.config, "dest_server", "https://kubernetes.default.svc");
        let target_revision = str_or(&input.config, "target_revision", "HEAD");
        let token = input.env.get("ARGOCD_TOKEN").cloned().unwrap_or_default();

        let body = ApplicationSpec {
            metadata: ApplicationMetadata {
                name: app_name.to_string(),
            },
            spec: ApplicationBody {
                project: project.to_string(),
                source: ApplicationSource {
                    repo_url: repo_url.to_string(),
                    path: path.to_string(),
                    target_revision: target_revision.to_string(),
                },
                destination: ApplicationDestination {
                    server: dest_server.to_string(),
                    namespace: dest_namespace.to_string(),
                },
            },
        };

        let response = self
            .client
            .post(format!("{base_url}/api/v1/applications"))
            .header("Authorization", format!("Bearer {token}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| to_step_failed(ExecutorError::Http(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(to_step_failed(ExecutorError::ApiError {
                status: status.as_u16(),
                body,
            }));
        }

        Ok(StepExecutionOutput {
            raw_output: format!("application {app_name} synced"),
            outputs: HashMap::from([("application_name".to_string(), app_name.to_string())]),
        })
    }
}
