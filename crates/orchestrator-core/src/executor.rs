// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! The workflow executor main loop: preparation, step dispatch (sequential
//! and parallel execution groups), finalization, and retry-from-failed-step
//! (§4.5, §4.8).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::condition::should_execute;
use crate::config::OrchestratorConfig;
use crate::context::{ExecutionContext, StepStatus};
use crate::error::{OrchestratorError, Result};
use crate::events::{EventBusRef, WorkflowEvent};
use crate::output_parser::parse_output;
use crate::persistence::{ExecutionStatus, PersistenceRef, StepRecordStatus, WorkflowExecution};
use crate::registry::{StepExecutionInput, StepExecutorRegistry};
use crate::resource::{ResourceManagerRef, ResourceState};
use crate::workflow::{Step, Workflow};

/// Outcome of a single `execute`/`retry` call.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub execution: WorkflowExecution,
    pub failed_step: Option<String>,
}

/// Orchestrates one workflow execution from preparation through
/// finalization. A single `WorkflowExecutor` instance may drive many
/// concurrent executions; all mutable state lives in the per-execution
/// `ExecutionContext`, never on `self`.
pub struct WorkflowExecutor {
    registry: Arc<StepExecutorRegistry>,
    persistence: PersistenceRef,
    resources: ResourceManagerRef,
    events: EventBusRef,
    config: OrchestratorConfig,
}

impl WorkflowExecutor {
    pub fn new(
        registry: Arc<StepExecutorRegistry>,
        persistence: PersistenceRef,
        resources: ResourceManagerRef,
        events: EventBusRef,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            persistence,
            resources,
            events,
            config,
        }
    }

    /// Runs every step of `workflow` from the start.
    pub async fn execute(
        &self,
        application_name: &str,
        workflow: &Workflow,
        golden_path_params: HashMap<String, String>,
    ) -> Result<ExecutionOutcome> {
        workflow.validate()?;
        let ctx = Arc::new(ExecutionContext::new(HashMap::new()));

        // Phase A.1: golden-path params first, workflow-local variables win (S1).
        ctx.set_workflow_variables(golden_path_params);
        ctx.set_workflow_variables(workflow.variables.clone());

        // Phase A.2: pre-execution validation.
        self.validate_references(&ctx, workflow)?;

        // Phase A.3 + A.4: create persistent records.
        let execution = self
            .persistence
            .create_workflow_execution(application_name, &workflow.name, workflow.steps.len())
            .await?;
        self.events
            .publish(WorkflowEvent::Started {
                application_name: application_name.to_string(),
                workflow_name: workflow.name.clone(),
                execution_id: execution.id,
                total_steps: workflow.steps.len(),
            })
            .await;

        let mut step_ids = Vec::with_capacity(workflow.steps.len());
        for (idx, step) in workflow.steps.iter().enumerate() {
            let record = self
                .persistence
                .create_workflow_step(
                    execution.id,
                    idx + 1,
                    &step.name,
                    &step.step_type,
                    serde_json::to_value(&step.config).unwrap_or(serde_json::Value::Null),
                )
                .await?;
            step_ids.push(record.id);
        }

        let start = Instant::now();
        self.run_and_finalize(application_name, workflow, &ctx, &execution, &step_ids, 1, start)
            .await
    }

    /// Creates a retry execution and runs only the steps from the first
    /// failed step number onward (§4.8, I4).
    pub async fn retry(
        &self,
        application_name: &str,
        workflow: &Workflow,
        parent_execution_id: i64,
    ) -> Result<ExecutionOutcome> {
        workflow.validate()?;
        let resume_from = self
            .persistence
            .get_first_failed_step_number(parent_execution_id)
            .await?
            .ok_or_else(|| OrchestratorError::other("parent execution has no failed step to retry from"))?;

        let total_steps = workflow.steps.len();
        let execution = self
            .persistence
            .create_retry_execution(parent_execution_id, total_steps, resume_from)
            .await?;

        // The context is re-initialized from the workflow's declared variables
        // only: earlier step/resource outputs are not rehydrated (§9 open
        // question, preserved as specified).
        let ctx = Arc::new(ExecutionContext::new(HashMap::new()));
        ctx.set_workflow_variables(workflow.variables.clone());

        self.validate_references(&ctx, workflow)?;

        let mut step_ids = Vec::with_capacity(total_steps);
        for (idx, step) in workflow.steps.iter().enumerate() {
            let step_number = idx + 1;
            if step_number < resume_from {
                continue;
            }
            let record = self
                .persistence
                .create_workflow_step(
                    execution.id,
                    step_number,
                    &step.name,
                    &step.step_type,
                    serde_json::to_value(&step.config).unwrap_or(serde_json::Value::Null),
                )
                .await?;
            step_ids.push(record.id);
        }

        let start = Instant::now();
        self.run_and_finalize(application_name, workflow, &ctx, &execution, &step_ids, resume_from, start)
            .await
    }

    fn validate_references(&self, ctx: &ExecutionContext, workflow: &Workflow) -> Result<()> {
        for step in &workflow.steps {
            if let Err(e) = self.validate_step_references(ctx, step) {
                if self.config.strict_validation {
                    return Err(e);
                }
                warn!(step = %step.name, error = %e, "unresolved variable reference (lenient mode)");
            }
        }
        Ok(())
    }

    fn validate_step_references(&self, ctx: &ExecutionContext, step: &Step) -> Result<()> {
        let env = &step.env;
        for value in step.config.values() {
            if let serde_json::Value::String(s) = value {
                ctx.validate_variable_references(s, env).map_err(|e| tag_step(e, step))?;
            }
        }
        for condition in [&step.when, &step.if_condition, &step.unless].into_iter().flatten() {
            ctx.validate_variable_references(condition, env).map_err(|e| tag_step(e, step))?;
        }
        Ok(())
    }

    /// Dispatches execution groups, applies §4.7 resource coupling, and
    /// persists the terminal workflow status.
    async fn run_and_finalize(
        &self,
        application_name: &str,
        workflow: &Workflow,
        ctx: &Arc<ExecutionContext>,
        execution: &WorkflowExecution,
        step_ids: &[i64],
        start_step_number: usize,
        start: Instant,
    ) -> Result<ExecutionOutcome> {
        let active_steps: Vec<ActiveStep> = workflow
            .steps
            .iter()
            .enumerate()
            .filter(|(idx, _)| idx + 1 >= start_step_number)
            .zip(step_ids.iter())
            .map(|((idx, step), step_id)| (idx + 1, step, *step_id))
            .collect();

        let groups = build_execution_groups(&active_steps);
        let mut failed_step: Option<String> = None;

        'groups: for group in groups {
            let tasks = group.into_iter().map(|(step_number, step, step_id)| {
                let ctx = Arc::clone(ctx);
                async move {
                    self.run_step(application_name, step, step_number, step_id, execution.id, &ctx)
                        .await
                }
            });
            let results = futures::future::join_all(tasks).await;
            for outcome in results {
                if let Some(name) = outcome {
                    failed_step = Some(name);
                }
            }
            if failed_step.is_some() {
                break 'groups;
            }
        }

        if let Some(ref name) = failed_step {
            let message = format!("step '{name}' failed");
            self.persistence
                .update_workflow_execution(execution.id, ExecutionStatus::Failed, Some(message.clone()))
                .await?;
            self.couple_resources(execution.id, false, Some(&message)).await;
            self.events
                .publish(WorkflowEvent::Failed {
                    application_name: application_name.to_string(),
                    workflow_name: workflow.name.clone(),
                    execution_id: execution.id,
                    error_message: message,
                })
                .await;
        } else {
            self.persistence
                .update_workflow_execution(execution.id, ExecutionStatus::Completed, None)
                .await?;
            self.couple_resources(execution.id, true, None).await;
            self.events
                .publish(WorkflowEvent::Completed {
                    application_name: application_name.to_string(),
                    workflow_name: workflow.name.clone(),
                    execution_id: execution.id,
                    total_steps: workflow.steps.len(),
                    duration_ms: start.elapsed().as_millis() as u64,
                })
                .await;
        }

        let final_execution = self
            .persistence
            .get_workflow_execution(execution.id)
            .await?
            .unwrap_or_else(|| execution.clone());

        Ok(ExecutionOutcome {
            execution: final_execution,
            failed_step,
        })
    }

    /// Runs a single step: dependency check, validation, condition
    /// evaluation, dispatch, and output capture. Returns `Some(step_name)`
    /// if the step failed (fatal), `None` otherwise (success or skip).
    async fn run_step(
        &self,
        application_name: &str,
        step: &Step,
        _step_number: usize,
        step_id: i64,
        execution_id: i64,
        ctx: &ExecutionContext,
    ) -> Option<String> {
        if let Err(e) = self.check_dependencies(step, ctx) {
            warn!(step = %step.name, error = %e, "dependency check failed");
            let _ = self
                .persistence
                .update_workflow_step_status(step_id, StepRecordStatus::Failed, Some(e.to_string()))
                .await;
            ctx.set_step_status(&step.name, StepStatus::Failed);
            return Some(step.name.clone());
        }

        if let Err(e) = self.validate_step_references(ctx, step) {
            if self.config.strict_validation {
                warn!(step = %step.name, error = %e, "per-step variable validation failed");
                let _ = self
                    .persistence
                    .update_workflow_step_status(step_id, StepRecordStatus::Failed, Some(e.to_string()))
                    .await;
                ctx.set_step_status(&step.name, StepStatus::Failed);
                return Some(step.name.clone());
            }
            warn!(step = %step.name, error = %e, "unresolved variable reference (lenient mode)");
        }

        let outcome = should_execute(step, ctx, &step.env);
        if !outcome.should_run {
            let reason = outcome.skip_reason.unwrap_or_default();
            debug!(step = %step.name, reason = %reason, "skipping step");
            let _ = self
                .persistence
                .update_workflow_step_status(step_id, StepRecordStatus::Skipped, Some(reason))
                .await;
            ctx.set_step_status(&step.name, StepStatus::Skipped);
            return None;
        }

        ctx.set_step_status(&step.name, StepStatus::Running);
        let _ = self
            .persistence
            .update_workflow_step_status(step_id, StepRecordStatus::Running, None)
            .await;
        let step_start = Instant::now();

        let timeout = Duration::from_secs(step.timeout.unwrap_or_else(|| self.config.execution_timeout.as_secs()));
        let config = ctx.interpolate_params(&step.config, &step.env);
        let input = StepExecutionInput {
            step: step.clone(),
            config,
            env: step.env.clone(),
            workspace_root: self.config.workspace_root.clone(),
            application_name: application_name.to_string(),
            execution_id,
        };

        info!(step = %step.name, step_type = %step.step_type, "dispatching step");
        match self.registry.dispatch(&step.step_type, input, timeout).await {
            Ok(output) => {
                if !output.raw_output.is_empty() {
                    let _ = self.persistence.add_workflow_step_logs(step_id, &output.raw_output).await;
                }
                self.capture_outputs(ctx, step, &output.outputs);
                let _ = self
                    .persistence
                    .update_workflow_step_status(step_id, StepRecordStatus::Completed, None)
                    .await;
                ctx.set_step_status(&step.name, StepStatus::Success);
                self.events
                    .publish(WorkflowEvent::StepCompleted {
                        execution_id,
                        step_name: step.name.clone(),
                        duration_ms: step_start.elapsed().as_millis() as u64,
                    })
                    .await;
                None
            }
            Err(e) => {
                error!(step = %step.name, error = %e, "step failed");
                let _ = self
                    .persistence
                    .update_workflow_step_status(step_id, StepRecordStatus::Failed, Some(e.to_string()))
                    .await;
                ctx.set_step_status(&step.name, StepStatus::Failed);
                self.events
                    .publish(WorkflowEvent::StepFailed {
                        execution_id,
                        step_name: step.name.clone(),
                        error_message: e.to_string(),
                    })
                    .await;
                Some(step.name.clone())
            }
        }
    }

    fn check_dependencies(&self, step: &Step, ctx: &ExecutionContext) -> Result<()> {
        for dependency in &step.depends_on {
            match ctx.get_step_status(dependency) {
                Some(StepStatus::Success) => {}
                _ => {
                    return Err(OrchestratorError::DependencyFailed {
                        dependency: dependency.clone(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Output capture per §4.6.
    fn capture_outputs(&self, ctx: &ExecutionContext, step: &Step, executor_outputs: &HashMap<String, String>) {
        let mut merged = HashMap::new();

        for (key, value) in &step.set_variables {
            ctx.set_variable(key.clone(), ctx.interpolate(value, &step.env));
        }
        merged.extend(step.set_variables.clone());

        if let Some(path) = &step.output_file {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let (outputs, warnings) = parse_output(&content);
                    for warning in warnings {
                        warn!(step = %step.name, %warning, "output_file parse warning");
                    }
                    merged.extend(outputs);
                }
                Err(e) => {
                    warn!(step = %step.name, error = %e, "failed to read output_file");
                }
            }
        }

        merged.extend(executor_outputs.clone());

        ctx.set_step_outputs(&step.name, merged);

        if !executor_outputs.is_empty() {
            ctx.set_resource_outputs(step.resource_key(), executor_outputs.clone());
        }
    }

    /// Resource coupling per §4.7: finds every resource this execution still
    /// owns in `provisioning` state and reconciles it to the workflow's
    /// terminal outcome — `active`/`healthy` on success, `failed`/`unhealthy`
    /// (carrying the workflow's error message) otherwise. Resources already
    /// `active`/`failed`, or owned by a different execution, are untouched.
    async fn couple_resources(&self, execution_id: i64, success: bool, error_message: Option<&str>) {
        let provisioning = match self
            .resources
            .get_resources_by_execution(execution_id, ResourceState::Provisioning)
            .await
        {
            Ok(resources) => resources,
            Err(e) => {
                warn!(execution_id, error = %e, "resource coupling: lookup failed");
                return;
            }
        };

        for resource in provisioning {
            let result = if success {
                self.resources.mark_active(resource.id).await
            } else {
                let message = error_message.unwrap_or("workflow failed");
                self.resources.mark_failed(resource.id, message).await
            };
            if let Err(e) = result {
                warn!(
                    execution_id,
                    resource_id = %resource.id,
                    error = %e,
                    "resource coupling: transition failed"
                );
            } else {
                debug!(
                    execution_id,
                    resource_id = %resource.id,
                    success,
                    "resource coupling: transitioned"
                );
            }
        }
    }
}

fn tag_step(err: OrchestratorError, step: &Step) -> OrchestratorError {
    match err {
        OrchestratorError::UnresolvedVariable { reference, .. } => OrchestratorError::UnresolvedVariable {
            step: step.name.clone(),
            reference,
        },
        other => other,
    }
}

type ActiveStep<'a> = (usize, &'a Step, i64);

/// Builds execution groups per §5 `buildStepExecutionGroups`: contiguous runs
/// of steps sharing a nonzero `parallel_group`, or contiguous runs of
/// `parallel=true` ungrouped steps, become one concurrent group; every other
/// step is its own single-member group. Groups are dispatched in list order.
fn build_execution_groups<'a>(steps: &[ActiveStep<'a>]) -> Vec<Vec<ActiveStep<'a>>> {
    let mut groups = Vec::new();
    let mut i = 0;
    while i < steps.len() {
        let (_, step, _) = steps[i];
        if step.parallel_group > 0 {
            let gid = step.parallel_group;
            let mut j = i + 1;
            while j < steps.len() && steps[j].1.parallel_group == gid {
                j += 1;
            }
            groups.push(steps[i..j].to_vec());
            i = j;
        } else if step.parallel {
            let mut j = i + 1;
            while j < steps.len() && steps[j].1.parallel && steps[j].1.parallel_group == 0 {
                j += 1;
            }
            groups.push(steps[i..j].to_vec());
            i = j;
        } else {
            groups.push(vec![steps[i]]);
            i += 1;
        }
    }
    groups
}
