// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! `resource-provisioning` step executor: drives a [`ResourceManager`]
//! through `request` -> `mark_provisioning` and surfaces the declared
//! outputs for `${resources.<key>.*}` interpolation. The resource stays
//! `provisioning` when this step returns; the `active`/`failed` transition
//! is deferred to the workflow's terminal Resource Coupling (§4.7) so a
//! resource provisioned by an early, successful step is still reconciled to
//! `failed` if a later step in the same execution fails.

use async_trait::async_trait;
use std::collections::HashMap;

use orchestrator_core::error::Result;
use orchestrator_core::registry::{StepExecutionInput, StepExecutionOutput, StepExecutor};
use orchestrator_core::resource::ResourceManagerRef;

use crate::config_ext::string_map;

pub struct ResourceProvisioningExecutor {
    resources: ResourceManagerRef,
}

impl ResourceProvisioningExecutor {
    pub fn new(resources: ResourceManagerRef) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl StepExecutor for ResourceProvisioningExecutor {
    fn step_type(&self) -> &str {
        "resource-provisioning"
    }

    async fn execute(&self, input: StepExecutionInput) -> Result<StepExecutionOutput> {
        let resource_key = input.step.resource_key().to_string();
        let instance = self
            .resources
            .request(&input.application_name, &resource_key, input.execution_id)
            .await?;

        let outputs = string_map(&input.config, "outputs");
        self.resources.mark_provisioning(instance.id, outputs.clone()).await?;

        Ok(StepExecutionOutput {
            raw_output: format!("resource '{resource_key}' provisioning requested"),
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::resource::InMemoryResourceManager;
    use orchestrator_core::workflow::Step;
    use std::sync::Arc;

    fn input(step: Step, config: HashMap<String, serde_json::Value>) -> StepExecutionInput {
        StepExecutionInput {
            step,
            config,
            env: HashMap::new(),
            workspace_root: "/tmp".to_string(),
            application_name: "checkout".to_string(),
            execution_id: 1,
        }
    }

    #[tokio::test]
    async fn provisions_and_leaves_resource_in_provisioning_state() {
        let resources: ResourceManagerRef = Arc::new(InMemoryResourceManager::default());
        let executor = ResourceProvisioningExecutor::new(resources.clone());

        let mut config = HashMap::new();
        config.insert(
            "outputs".to_string(),
            serde_json::json!({ "connection_string": "postgres://db" }),
        );

        let mut step = Step::new("provision-db", "resource-provisioning");
        step.resource = Some("db".to_string());

        let output = executor.execute(input(step, config)).await.unwrap();
        assert_eq!(
            output.outputs.get("connection_string"),
            Some(&"postgres://db".to_string())
        );

        let found = resources.find_by_key("checkout", "db").await.unwrap().unwrap();
        assert_eq!(found.state, orchestrator_core::resource::ResourceState::Provisioning);
        assert_eq!(found.workflow_execution_id, Some(1));
    }
}
