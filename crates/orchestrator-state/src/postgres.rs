// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL-backed [`PersistenceAdapter`]. Schema and connection-pool
//! tuning mirror the teacher's `DatabaseAuditStorage`; row (de)serialization
//! follows the same `sqlx::Row` field-by-field extraction style.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;

use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::persistence::{
    ExecutionStatus, PersistenceAdapter, StepRecordStatus, WorkflowExecution, WorkflowStepExecution,
};

use crate::error::StateError;

pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub async fn connect(database_url: &str) -> crate::error::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(5)
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> crate::error::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_executions (
                id BIGSERIAL PRIMARY KEY,
                application_name VARCHAR(255) NOT NULL,
                workflow_name VARCHAR(255) NOT NULL,
                status VARCHAR(20) NOT NULL,
                total_steps INTEGER NOT NULL,
                started_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                error_message TEXT,
                is_retry BOOLEAN NOT NULL DEFAULT FALSE,
                retry_count INTEGER NOT NULL DEFAULT 0,
                parent_execution_id BIGINT REFERENCES workflow_executions(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_step_executions (
                id BIGSERIAL PRIMARY KEY,
                workflow_execution_id BIGINT NOT NULL REFERENCES workflow_executions(id),
                step_number INTEGER NOT NULL,
                step_name VARCHAR(255) NOT NULL,
                step_type VARCHAR(100) NOT NULL,
                step_config JSONB NOT NULL,
                status VARCHAR(20) NOT NULL,
                started_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                error_message TEXT,
                logs TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Migration(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_step_executions_execution \
             ON workflow_step_executions(workflow_execution_id, step_number)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Migration(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_executions_application_workflow \
             ON workflow_executions(application_name, workflow_name, status)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Migration(e.to_string()))?;

        Ok(())
    }
}

fn status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Running => "running",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> ExecutionStatus {
    match s {
        "completed" => ExecutionStatus::Completed,
        "failed" => ExecutionStatus::Failed,
        _ => ExecutionStatus::Running,
    }
}

fn step_status_str(status: StepRecordStatus) -> &'static str {
    match status {
        StepRecordStatus::Pending => "pending",
        StepRecordStatus::Running => "running",
        StepRecordStatus::Completed => "completed",
        StepRecordStatus::Failed => "failed",
        StepRecordStatus::Skipped => "skipped",
    }
}

fn parse_step_status(s: &str) -> StepRecordStatus {
    match s {
        "running" => StepRecordStatus::Running,
        "completed" => StepRecordStatus::Completed,
        "failed" => StepRecordStatus::Failed,
        "skipped" => StepRecordStatus::Skipped,
        _ => StepRecordStatus::Pending,
    }
}

fn to_persistence_err(e: sqlx::Error) -> OrchestratorError {
    OrchestratorError::Persistence(e.to_string())
}

fn row_to_execution(row: &sqlx::postgres::PgRow) -> WorkflowExecution {
    WorkflowExecution {
        id: row.get("id"),
        application_name: row.get("application_name"),
        workflow_name: row.get("workflow_name"),
        status: parse_status(row.get::<String, _>("status").as_str()),
        total_steps: row.get::<i32, _>("total_steps") as usize,
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        error_message: row.get("error_message"),
        is_retry: row.get("is_retry"),
        retry_count: row.get::<i32, _>("retry_count") as u32,
        parent_execution_id: row.get("parent_execution_id"),
    }
}

fn row_to_step(row: &sqlx::postgres::PgRow) -> WorkflowStepExecution {
    WorkflowStepExecution {
        id: row.get("id"),
        workflow_execution_id: row.get("workflow_execution_id"),
        step_number: row.get::<i32, _>("step_number") as usize,
        step_name: row.get("step_name"),
        step_type: row.get("step_type"),
        step_config: row.get("step_config"),
        status: parse_step_status(row.get::<String, _>("status").as_str()),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        error_message: row.get("error_message"),
        logs: row.get("logs"),
    }
}

#[async_trait]
impl PersistenceAdapter for PostgresPersistence {
    async fn create_workflow_execution(
        &self,
        application_name: &str,
        workflow_name: &str,
        total_steps: usize,
    ) -> Result<WorkflowExecution> {
        let row = sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (application_name, workflow_name, status, total_steps, started_at, is_retry, retry_count)
            VALUES ($1, $2, 'running', $3, $4, FALSE, 0)
            RETURNING *
            "#,
        )
        .bind(application_name)
        .bind(workflow_name)
        .bind(total_steps as i32)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(to_persistence_err)?;

        Ok(row_to_execution(&row))
    }

    async fn create_workflow_step(
        &self,
        execution_id: i64,
        step_number: usize,
        step_name: &str,
        step_type: &str,
        step_config: serde_json::Value,
    ) -> Result<WorkflowStepExecution> {
        let row = sqlx::query(
            r#"
            INSERT INTO workflow_step_executions
                (workflow_execution_id, step_number, step_name, step_type, step_config, status, logs)
            VALUES ($1, $2, $3, $4, $5, 'pending', '')
            RETURNING *
            "#,
        )
        .bind(execution_id)
        .bind(step_number as i32)
        .bind(step_name)
        .bind(step_type)
        .bind(step_config)
        .fetch_one(&self.pool)
        .await
        .map_err(to_persistence_err)?;

        Ok(row_to_step(&row))
    }

    async fn update_workflow_step_status(
        &self,
        step_id: i64,
        status: StepRecordStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        match status {
            StepRecordStatus::Running => {
                sqlx::query(
                    "UPDATE workflow_step_executions SET status = $1, error_message = $2, started_at = NOW() \
                     WHERE id = $3",
                )
                .bind(step_status_str(status))
                .bind(error_message)
                .bind(step_id)
                .execute(&self.pool)
                .await
                .map_err(to_persistence_err)?;
            }
            StepRecordStatus::Completed | StepRecordStatus::Failed | StepRecordStatus::Skipped => {
                sqlx::query(
                    "UPDATE workflow_step_executions SET status = $1, error_message = $2, completed_at = NOW() \
                     WHERE id = $3",
                )
                .bind(step_status_str(status))
                .bind(error_message)
                .bind(step_id)
                .execute(&self.pool)
                .await
                .map_err(to_persistence_err)?;
            }
            StepRecordStatus::Pending => {
                sqlx::query("UPDATE workflow_step_executions SET status = $1, error_message = $2 WHERE id = $3")
                    .bind(step_status_str(status))
                    .bind(error_message)
                    .bind(step_id)
                    .execute(&self.pool)
                    .await
                    .map_err(to_persistence_err)?;
            }
        }

        Ok(())
    }

    async fn update_workflow_execution(
        &self,
        execution_id: i64,
        status: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $1, error_message = $2, completed_at = NOW()
            WHERE id = $3 AND status = 'running'
            "#,
        )
        .bind(status_str(status))
        .bind(error_message)
        .bind(execution_id)
        .execute(&self.pool)
        .await
        .map_err(to_persistence_err)?;

        Ok(())
    }

    async fn add_workflow_step_logs(&self, step_id: i64, text: &str) -> Result<()> {
        sqlx::query("UPDATE workflow_step_executions SET logs = logs || $1 WHERE id = $2")
            .bind(text)
            .bind(step_id)
            .execute(&self.pool)
            .await
            .map_err(to_persistence_err)?;

        Ok(())
    }

    async fn get_workflow_execution(&self, execution_id: i64) -> Result<Option<WorkflowExecution>> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = $1")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_persistence_err)?;

        Ok(row.as_ref().map(row_to_execution))
    }

    async fn list_steps(&self, execution_id: i64) -> Result<Vec<WorkflowStepExecution>> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_step_executions WHERE workflow_execution_id = $1 ORDER BY step_number ASC",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await
        .map_err(to_persistence_err)?;

        Ok(rows.iter().map(row_to_step).collect())
    }

    async fn get_first_failed_step_number(&self, execution_id: i64) -> Result<Option<usize>> {
        let row = sqlx::query(
            r#"
            SELECT MIN(step_number) AS step_number FROM workflow_step_executions
            WHERE workflow_execution_id = $1 AND status = 'failed'
            "#,
        )
        .bind(execution_id)
        .fetch_one(&self.pool)
        .await
        .map_err(to_persistence_err)?;

        let step_number: Option<i32> = row.get("step_number");
        Ok(step_number.map(|n| n as usize))
    }

    async fn create_retry_execution(
        &self,
        parent_execution_id: i64,
        total_steps: usize,
        _resume_from_step: usize,
    ) -> Result<WorkflowExecution> {
        let parent = self
            .get_workflow_execution(parent_execution_id)
            .await?
            .ok_or_else(|| OrchestratorError::Persistence(format!("unknown parent execution {parent_execution_id}")))?;

        let row = sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (application_name, workflow_name, status, total_steps, started_at, is_retry, retry_count, parent_execution_id)
            VALUES ($1, $2, 'running', $3, $4, TRUE, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&parent.application_name)
        .bind(&parent.workflow_name)
        .bind(total_steps as i32)
        .bind(Utc::now())
        .bind(parent.retry_count as i32 + 1)
        .bind(parent_execution_id)
        .fetch_one(&self.pool)
        .await
        .map_err(to_persistence_err)?;

        Ok(row_to_execution(&row))
    }

    async fn has_prior_successful_execution(&self, application_name: &str, workflow_name: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM workflow_executions
                WHERE application_name = $1 AND workflow_name = $2 AND status = 'completed'
            ) AS present
            "#,
        )
        .bind(application_name)
        .bind(workflow_name)
        .fetch_one(&self.pool)
        .await
        .map_err(to_persistence_err)?;

        Ok(row.get("present"))
    }
}

