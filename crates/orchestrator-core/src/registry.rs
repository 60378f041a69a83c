// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Step executor trait and the registry the workflow executor dispatches
//! through. Concrete executors (`terraform`, `kubernetes`, `ansible`, ...)
//! live in the companion executors crate and register themselves under
//! their step `type` string, mirroring how the teacher's `LLMProvider`
//! implementations are looked up by provider name.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{OrchestratorError, Result};
use crate::workflow::Step;

/// Inputs available to a step executor: the step's own (already
/// interpolated) config plus captured environment overrides.
#[derive(Debug, Clone)]
pub struct StepExecutionInput {
    pub step: Step,
    pub config: HashMap<String, serde_json::Value>,
    pub env: HashMap<String, String>,
    pub workspace_root: String,
    pub application_name: String,
    /// Owning workflow execution id, threaded down so executors that
    /// provision resources (§4.7) can tag them for later Resource Coupling.
    pub execution_id: i64,
}

/// What a step executor hands back on success: raw captured output plus
/// anything it wants exposed under `${step.<key>}` without requiring an
/// `output_file`.
#[derive(Debug, Clone, Default)]
pub struct StepExecutionOutput {
    pub raw_output: String,
    pub outputs: HashMap<String, String>,
}

/// A pluggable implementation for one step `type`. Implementations should
/// not apply their own timeout; the registry wraps every call in the
/// configured deadline.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// The `type` string this executor handles, e.g. `"terraform"`.
    fn step_type(&self) -> &str;

    async fn execute(&self, input: StepExecutionInput) -> Result<StepExecutionOutput>;
}

/// Looks up a `StepExecutor` by step type and wraps dispatch in the
/// configured per-step timeout.
#[derive(Clone, Default)]
pub struct StepExecutorRegistry {
    executors: HashMap<String, Arc<dyn StepExecutor>>,
}

impl StepExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    pub fn register(&mut self, executor: Arc<dyn StepExecutor>) {
        self.executors.insert(executor.step_type().to_string(), executor);
    }

    pub fn is_registered(&self, step_type: &str) -> bool {
        self.executors.contains_key(step_type)
    }

    pub async fn dispatch(
        &self,
        step_type: &str,
        input: StepExecutionInput,
        timeout: Duration,
    ) -> Result<StepExecutionOutput> {
        let executor = self
            .executors
            .get(step_type)
            .ok_or_else(|| OrchestratorError::UnknownStepType {
                step_type: step_type.to_string(),
            })?
            .clone();

        let step_name = input.step.name.clone();
        match tokio::time::timeout(timeout, executor.execute(input)).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::Timeout {
                step: step_name,
                duration: timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Step;

    struct EchoExecutor;

    #[async_trait]
    impl StepExecutor for EchoExecutor {
        fn step_type(&self) -> &str {
            "echo"
        }

        async fn execute(&self, input: StepExecutionInput) -> Result<StepExecutionOutput> {
            Ok(StepExecutionOutput {
                raw_output: format!("ran {}", input.step.name),
                outputs: HashMap::new(),
            })
        }
    }

    struct HangingExecutor;

    #[async_trait]
    impl StepExecutor for HangingExecutor {
        fn step_type(&self) -> &str {
            "hang"
        }

        async fn execute(&self, _input: StepExecutionInput) -> Result<StepExecutionOutput> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(StepExecutionOutput::default())
        }
    }

    fn sample_input(step_name: &str) -> StepExecutionInput {
        StepExecutionInput {
            step: Step::new(step_name, "echo"),
            config: HashMap::new(),
            env: HashMap::new(),
            workspace_root: "workspaces".to_string(),
            application_name: "checkout".to_string(),
            execution_id: 1,
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_executor() {
        let mut registry = StepExecutorRegistry::new();
        registry.register(Arc::new(EchoExecutor));

        let output = registry
            .dispatch("echo", sample_input("greet"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.raw_output, "ran greet");
    }

    #[tokio::test]
    async fn unknown_step_type_is_an_error() {
        let registry = StepExecutorRegistry::new();
        let result = registry
            .dispatch("missing", sample_input("greet"), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(OrchestratorError::UnknownStepType { .. })));
    }

    #[tokio::test]
    async fn dispatch_times_out() {
        let mut registry = StepExecutorRegistry::new();
        registry.register(Arc::new(HangingExecutor));

        let result = registry
            .dispatch("hang", sample_input("slow"), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(OrchestratorError::Timeout { .. })));
    }
}
