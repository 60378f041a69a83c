// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! `gitea-repo` step executor: ensures a Gitea repository exists under the
//! configured owner, creating it if absent. Mirrors the teacher provider
//! crate's HTTP-client construction and error-mapping shape.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::registry::{StepExecutionInput, StepExecutionOutput, StepExecutor};

use crate::config_ext::require_str;
use crate::error::{self, ExecutorError};

#[derive(Debug, Serialize)]
struct CreateRepoRequest {
    name: String,
    private: bool,
    auto_init: bool,
}

pub struct GiteaRepoExecutor {
    client: Client,
}

impl Default for GiteaRepoExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl GiteaRepoExecutor {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    async fn repo_exists(&self, base_url: &str, owner: &str, repo: &str, token: &str) -> error::Result<bool> {
        let url = format!("{base_url}/api/v1/repos/{owner}/{repo}");
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("token {token}"))
            .send()
            .await?;
        Ok(response.status() == StatusCode::OK)
    }
}

#[async_trait]
impl StepExecutor for GiteaRepoExecutor {
    fn step_type(&self) -> &str {
        "gitea-repo"
    }

    async fn execute(&self, input: StepExecutionInput) -> Result<StepExecutionOutput> {
        let to_step_failed = |e: ExecutorError| OrchestratorError::StepFailed {
            step: input.step.name.clone(),
            reason: e.to_string(),
        };

        let base_url = require_str(&input.config, "base_url").map_err(to_step_failed)?;
        let owner = require_str(&input.config, "owner").map_err(to_step_failed)?;
        let repo = require_str(&input.config, "repo").map_err(to_step_failed)?;
        let token = input.env.get("GITEA_TOKEN").cloned().unwrap_or_default();

        if self
            .repo_exists(base_url, owner, repo, &token)
            .await
            .map_err(to_step_failed)?
        {
            return Ok(StepExecutionOutput {
                raw_output: format!("repository {owner}/{repo} already exists"),
                outputs: HashMap::from([("repo_url".to_string(), format!("{base_url}/{owner}/{repo}"))]),
            });
        }

        let url = format!("{base_url}/api/v1/orgs/{owner}/repos");
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("token {token}"))
            .json(&CreateRepoRequest {
                name: repo.to_string(),
                private: true,
                auto_init: true,
            })
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
            raw_output: format!("created repository {owner}/{repo}"),
            outputs: HashMap::from([("repo_url".to_string(), format!("{base_url}/{owner}/{repo}"))]),
        })
    }
}
