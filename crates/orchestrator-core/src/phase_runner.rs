// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Phase-level concurrency (§5): phases run strictly in order
//! (`pre-deployment` -> `deployment` -> `post-deployment`), but within a
//! phase the resolved workflows run concurrently under a semaphore of size
//! `max_concurrent_workflows`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::info;

use crate::executor::{ExecutionOutcome, WorkflowExecutor};
use crate::workflow::{Phase, ResolvedWorkflow};

/// Runs every phase of a resolved plan to completion, in phase order.
pub struct PhaseRunner {
    executor: Arc<WorkflowExecutor>,
    max_concurrent: usize,
}

impl PhaseRunner {
    pub fn new(executor: Arc<WorkflowExecutor>, max_concurrent: usize) -> Self {
        Self {
            executor,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Runs `plan`'s phases in `Phase::ALL` order. A phase's workflows all
    /// run concurrently (bounded by `max_concurrent`); the next phase does
    /// not start until every workflow in the current phase has finished,
    /// win or lose.
    pub async fn run(
        &self,
        application_name: &str,
        plan: &HashMap<Phase, Vec<ResolvedWorkflow>>,
    ) -> Vec<ExecutionOutcome> {
        let mut outcomes = Vec::new();

        for phase in Phase::ALL {
            let Some(workflows) = plan.get(&phase) else {
                continue;
            };
            if workflows.is_empty() {
                continue;
            }

            info!(phase = phase.as_str(), count = workflows.len(), "starting phase");
            let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

            let tasks = workflows.iter().map(|resolved| {
                let semaphore = Arc::clone(&semaphore);
                let executor = Arc::clone(&self.executor);
                let application_name = application_name.to_string();
                let workflow = resolved.workflow.clone();
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore never closed");
                    executor.execute(&application_name, &workflow, HashMap::new()).await
                }
            });

            let results = futures::future::join_all(tasks).await;
            for result in results {
                match result {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => {
                        tracing::error!(phase = phase.as_str(), error = %e, "workflow execution failed to start");
                    }
                }
            }
            info!(phase = phase.as_str(), "phase complete");
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::events::NullEventBus;
    use crate::persistence::InMemoryPersistence;
    use crate::registry::{StepExecutionInput, StepExecutionOutput, StepExecutor, StepExecutorRegistry};
    use crate::resource::InMemoryResourceManager;
    use crate::workflow::{Step, Tier, Workflow};
    use async_trait::async_trait;
    use std::time::Duration;

    struct SlowNoop;

    #[async_trait]
    impl StepExecutor for SlowNoop {
        fn step_type(&self) -> &str {
            "noop"
        }

        async fn execute(&self, _input: StepExecutionInput) -> crate::error::Result<StepExecutionOutput> {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(StepExecutionOutput::default())
        }
    }

    fn runner(max_concurrent: usize) -> PhaseRunner {
        let mut registry = StepExecutorRegistry::new();
        registry.register(Arc::new(SlowNoop));
        let executor = Arc::new(WorkflowExecutor::new(
            Arc::new(registry),
            Arc::new(InMemoryPersistence::new()),
            Arc::new(InMemoryResourceManager::new()),
            Arc::new(NullEventBus),
            OrchestratorConfig::default(),
        ));
        PhaseRunner::new(executor, max_concurrent)
    }

    fn resolved(name: &str, phase: Phase) -> ResolvedWorkflow {
        let workflow = Workflow {
            name: name.to_string(),
            variables: HashMap::new(),
            steps: vec![Step::new("s", "noop")],
        };
        ResolvedWorkflow::new(workflow, phase, Tier::Platform)
    }

    #[tokio::test]
    async fn runs_all_workflows_in_every_non_empty_phase() {
        let mut plan = HashMap::new();
        plan.insert(
            Phase::PreDeployment,
            vec![resolved("a", Phase::PreDeployment), resolved("b", Phase::PreDeployment)],
        );
        plan.insert(Phase::Deployment, vec![resolved("c", Phase::Deployment)]);
        plan.insert(Phase::PostDeployment, vec![]);

        let runner = runner(5);
        let outcomes = runner.run("checkout", &plan).await;
        assert_eq!(outcomes.len(), 3);
    }

    #[tokio::test]
    async fn bounds_concurrency_within_a_phase() {
        let mut plan = HashMap::new();
        plan.insert(
            Phase::PreDeployment,
            (0..6).map(|i| resolved(&format!("w{i}"), Phase::PreDeployment)).collect(),
        );

        let runner = runner(2);
        let start = std::time::Instant::now();
        let outcomes = runner.run("checkout", &plan).await;
        let elapsed = start.elapsed();

        assert_eq!(outcomes.len(), 6);
        // 6 workflows, 1 step each (~30ms), concurrency 2 -> at least 3 serialized batches.
        assert!(elapsed >= Duration::from_millis(90), "elapsed was {elapsed:?}");
    }
}
