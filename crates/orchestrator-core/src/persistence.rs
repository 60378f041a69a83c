// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Persistence contract for workflow executions, step records, and retry
//! bookkeeping. The executor talks to storage only through this trait;
//! concrete backends (Postgres/SQLite via `sqlx`) live in the companion
//! state crate, matching the teacher's `AuditStorage` trait split between
//! its `storage.rs` (contract) and `database.rs` (implementation).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{OrchestratorError, Result};

/// Terminal/non-terminal status of a `WorkflowExecution`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

/// Status of an individual persisted step record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRecordStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// A persistent workflow execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: i64,
    pub application_name: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub total_steps: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub is_retry: bool,
    pub retry_count: u32,
    pub parent_execution_id: Option<i64>,
}

/// A persistent step execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepExecution {
    pub id: i64,
    pub workflow_execution_id: i64,
    pub step_number: usize,
    pub step_name: String,
    pub step_type: String,
    pub step_config: serde_json::Value,
    pub status: StepRecordStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub logs: String,
}

/// Persistence operations the executor depends on. Implementations must be
/// safe for concurrent use; updates to a single step row must be serialized
/// to that row, and a terminal `update_workflow_execution` call must be
/// idempotent (a conditional `WHERE status = 'running'` update over a
/// relational store).
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn create_workflow_execution(
        &self,
        application_name: &str,
        workflow_name: &str,
        total_steps: usize,
    ) -> Result<WorkflowExecution>;

    async fn create_workflow_step(
        &self,
        execution_id: i64,
        step_number: usize,
        step_name: &str,
        step_type: &str,
        step_config: serde_json::Value,
    ) -> Result<WorkflowStepExecution>;

    async fn update_workflow_step_status(
        &self,
        step_id: i64,
        status: StepRecordStatus,
        error_message: Option<String>,
    ) -> Result<()>;

    /// Transitions the execution to a terminal status. A no-op if the
    /// execution is already terminal (one-shot terminal transition).
    async fn update_workflow_execution(
        &self,
        execution_id: i64,
        status: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<()>;

    async fn add_workflow_step_logs(&self, step_id: i64, text: &str) -> Result<()>;

    async fn get_workflow_execution(&self, execution_id: i64) -> Result<Option<WorkflowExecution>>;

    async fn list_steps(&self, execution_id: i64) -> Result<Vec<WorkflowStepExecution>>;

    /// The lowest `step_number` with `status = failed` in this execution, if any.
    async fn get_first_failed_step_number(&self, execution_id: i64) -> Result<Option<usize>>;

    async fn create_retry_execution(
        &self,
        parent_execution_id: i64,
        total_steps: usize,
        resume_from_step: usize,
    ) -> Result<WorkflowExecution>;

    /// Whether this application has any prior `Completed` execution of this
    /// workflow name (drives the `first_deployment` trigger).
    async fn has_prior_successful_execution(&self, application_name: &str, workflow_name: &str) -> Result<bool>;
}

pub type PersistenceRef = Arc<dyn PersistenceAdapter>;

/// In-memory persistence adapter used by tests and the SDK's default
/// configuration. Not durable across process restarts.
pub struct InMemoryPersistence {
    executions: dashmap::DashMap<i64, WorkflowExecution>,
    steps: dashmap::DashMap<i64, WorkflowStepExecution>,
    next_execution_id: std::sync::atomic::AtomicI64,
    next_step_id: std::sync::atomic::AtomicI64,
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            executions: dashmap::DashMap::new(),
            steps: dashmap::DashMap::new(),
            next_execution_id: std::sync::atomic::AtomicI64::new(1),
            next_step_id: std::sync::atomic::AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryPersistence {
    async fn create_workflow_execution(
        &self,
        application_name: &str,
        workflow_name: &str,
        total_steps: usize,
    ) -> Result<WorkflowExecution> {
        let id = self.next_execution_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let record = WorkflowExecution {
            id,
            application_name: application_name.to_string(),
            workflow_name: workflow_name.to_string(),
            status: ExecutionStatus::Running,
            total_steps,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
            is_retry: false,
            retry_count: 0,
            parent_execution_id: None,
        };
        self.executions.insert(id, record.clone());
        Ok(record)
    }

    async fn create_workflow_step(
        &self,
        execution_id: i64,
        step_number: usize,
        step_name: &str,
        step_type: &str,
        step_config: serde_json::Value,
    ) -> Result<WorkflowStepExecution> {
        let id = self.next_step_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let record = WorkflowStepExecution {
            id,
            workflow_execution_id: execution_id,
            step_number,
            step_name: step_name.to_string(),
            step_type: step_type.to_string(),
            step_config,
            status: StepRecordStatus::Pending,
            started_at: None,
            completed_at: None,
            error_message: None,
            logs: String::new(),
        };
        self.steps.insert(id, record.clone());
        Ok(record)
    }

    async fn update_workflow_step_status(
        &self,
        step_id: i64,
        status: StepRecordStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let mut entry = self
            .steps
            .get_mut(&step_id)
            .ok_or_else(|| OrchestratorError::Persistence(format!("unknown step id {step_id}")))?;
        entry.status = status;
        entry.error_message = error_message;
        match status {
            StepRecordStatus::Running => entry.started_at = Some(Utc::now()),
            StepRecordStatus::Completed | StepRecordStatus::Failed | StepRecordStatus::Skipped => {
                entry.completed_at = Some(Utc::now());
            }
            StepRecordStatus::Pending => {}
        }
        Ok(())
    }

    async fn update_workflow_execution(
        &self,
        execution_id: i64,
        status: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let mut entry = self
            .executions
            .get_mut(&execution_id)
            .ok_or_else(|| OrchestratorError::Persistence(format!("unknown execution id {execution_id}")))?;
        // One-shot terminal transition: a second call once terminal is a no-op,
        // mirroring a `WHERE status = 'running'` conditional update.
        if entry.status != ExecutionStatus::Running {
            return Ok(());
        }
        entry.status = status;
        entry.error_message = error_message;
        if status != ExecutionStatus::Running {
            entry.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn add_workflow_step_logs(&self, step_id: i64, text: &str) -> Result<()> {
        let mut entry = self
            .steps
            .get_mut(&step_id)
            .ok_or_else(|| OrchestratorError::Persistence(format!("unknown step id {step_id}")))?;
        entry.logs.push_str(text);
        Ok(())
    }

    async fn get_workflow_execution(&self, execution_id: i64) -> Result<Option<WorkflowExecution>> {
        Ok(self.executions.get(&execution_id).map(|e| e.clone()))
    }

    async fn list_steps(&self, execution_id: i64) -> Result<Vec<WorkflowStepExecution>> {
        let mut steps: Vec<_> = self
            .steps
            .iter()
            .filter(|e| e.workflow_execution_id == execution_id)
            .map(|e| e.clone())
            .collect();
        steps.sort_by_key(|s| s.step_number);
        Ok(steps)
    }

    async fn get_first_failed_step_number(&self, execution_id: i64) -> Result<Option<usize>> {
        let steps = self.list_steps(execution_id).await?;
        Ok(steps
            .iter()
            .filter(|s| s.status == StepRecordStatus::Failed)
            .map(|s| s.step_number)
            .min())
    }

    async fn create_retry_execution(
        &self,
        parent_execution_id: i64,
        total_steps: usize,
        _resume_from_step: usize,
    ) -> Result<WorkflowExecution> {
        let parent = self
            .executions
            .get(&parent_execution_id)
            .ok_or_else(|| OrchestratorError::Persistence(format!("unknown parent execution {parent_execution_id}")))?
            .clone();

        let id = self.next_execution_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let record = WorkflowExecution {
            id,
            application_name: parent.application_name.clone(),
            workflow_name: parent.workflow_name.clone(),
            status: ExecutionStatus::Running,
            total_steps,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
            is_retry: true,
            retry_count: parent.retry_count + 1,
            parent_execution_id: Some(parent_execution_id),
        };
        self.executions.insert(id, record.clone());
        Ok(record)
    }

    async fn has_prior_successful_execution(&self, application_name: &str, workflow_name: &str) -> Result<bool> {
        Ok(self.executions.iter().any(|e| {
            e.application_name == application_name
                && e.workflow_name == workflow_name
                && e.status == ExecutionStatus::Completed
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminal_transition_is_one_shot() {
        let store = InMemoryPersistence::new();
        let exec = store.create_workflow_execution("app", "wf", 2).await.unwrap();

        store
            .update_workflow_execution(exec.id, ExecutionStatus::Completed, None)
            .await
            .unwrap();
        store
            .update_workflow_execution(exec.id, ExecutionStatus::Failed, Some("late error".to_string()))
            .await
            .unwrap();

        let reloaded = store.get_workflow_execution(exec.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ExecutionStatus::Completed);
        assert!(reloaded.error_message.is_none());
    }

    #[tokio::test]
    async fn retry_execution_increments_retry_count() {
        let store = InMemoryPersistence::new();
        let parent = store.create_workflow_execution("app", "wf", 3).await.unwrap();
        store
            .create_workflow_step(parent.id, 1, "a", "terraform", serde_json::json!({}))
            .await
            .unwrap();
        let step2 = store
            .create_workflow_step(parent.id, 2, "b", "kubernetes", serde_json::json!({}))
            .await
            .unwrap();
        store
            .update_workflow_step_status(step2.id, StepRecordStatus::Failed, Some("boom".to_string()))
            .await
            .unwrap();

        let first_failed = store.get_first_failed_step_number(parent.id).await.unwrap();
        assert_eq!(first_failed, Some(2));

        let retry = store.create_retry_execution(parent.id, 2, 2).await.unwrap();
        assert!(retry.is_retry);
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.parent_execution_id, Some(parent.id));
    }
}
