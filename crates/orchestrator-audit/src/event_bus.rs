// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! `EventBus` implementation that records every workflow lifecycle event to
//! the tamper-evident audit trail.

use std::time::Duration;

use async_trait::async_trait;
use orchestrator_core::events::{EventBus, WorkflowEvent};

use crate::logger::AuditLogger;

/// Bridges the executor's `EventBus` to an `AuditLogger`.
pub struct AuditEventBus {
    logger: AuditLogger,
}

impl AuditEventBus {
    pub fn new(logger: AuditLogger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl EventBus for AuditEventBus {
    async fn publish(&self, event: WorkflowEvent) {
        let result = match event {
            WorkflowEvent::Started {
                application_name,
                workflow_name,
                execution_id,
                ..
            } => {
                self.logger
                    .log_workflow_started(execution_id, &application_name, &workflow_name)
                    .await
            }
            WorkflowEvent::Completed {
                application_name,
                workflow_name,
                execution_id,
                duration_ms,
                ..
            } => {
                self.logger
                    .log_workflow_completed(
                        execution_id,
                        &application_name,
                        &workflow_name,
                        Duration::from_millis(duration_ms),
                    )
                    .await
            }
            WorkflowEvent::Failed {
                application_name,
                workflow_name,
                execution_id,
                error_message,
            } => {
                self.logger
                    .log_workflow_failed(execution_id, &application_name, &workflow_name, None, &error_message)
                    .await
            }
            WorkflowEvent::StepCompleted {
                execution_id,
                step_name,
                duration_ms,
            } => {
                self.logger
                    .log_step_completed(execution_id, &step_name, Duration::from_millis(duration_ms))
                    .await
            }
            WorkflowEvent::StepFailed {
                execution_id,
                step_name,
                error_message,
            } => self.logger.log_step_failed(execution_id, &step_name, &error_message).await,
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to record audit event for workflow lifecycle event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{FileAuditStorage, RotationPolicy};
    use crate::models::AuditFilter;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn publishes_workflow_started_as_audit_event() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Arc::new(FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap());
        let bus = AuditEventBus::new(AuditLogger::new(storage.clone()));

        bus.publish(WorkflowEvent::Started {
            application_name: "checkout".to_string(),
            workflow_name: "deploy-application".to_string(),
            execution_id: 7,
            total_steps: 3,
        })
        .await;

        let events = storage.query(AuditFilter::new()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_id, "7");
    }

    #[tokio::test]
    async fn publishes_step_failed_as_audit_event() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Arc::new(FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap());
        let bus = AuditEventBus::new(AuditLogger::new(storage.clone()));

        bus.publish(WorkflowEvent::StepFailed {
            execution_id: 7,
            step_name: "deploy-application".to_string(),
            error_message: "kubectl apply exited 1".to_string(),
        })
        .await;

        let events = storage.query(AuditFilter::new()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_id, "deploy-application");
    }
}
