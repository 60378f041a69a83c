use crate::models::{AuditEvent, AuditEventType, AuditResult, ResourceType};
use crate::storage::{AuditStorage, AuditStorageRef, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Audit logger for recording security and operational events
pub struct AuditLogger {
    storage: AuditStorageRef,
    enabled: bool,
    previous_hash: Arc<RwLock<Option<String>>>,
}

impl AuditLogger {
    /// Create a new audit logger
    pub fn new(storage: AuditStorageRef) -> Self {
        Self {
            storage,
            enabled: true,
            previous_hash: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a disabled audit logger (for testing)
    pub fn disabled() -> Self {
        Self {
            storage: Arc::new(NoOpStorage),
            enabled: false,
            previous_hash: Arc::new(RwLock::new(None)),
        }
    }

    /// Check if the audit logger is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Log a workflow execution starting
    pub async fn log_workflow_started(
        &self,
        execution_id: i64,
        application_name: &str,
        workflow_name: &str,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::WorkflowStarted,
            format!("workflow '{}' started", workflow_name),
            ResourceType::WorkflowExecution,
            execution_id.to_string(),
            AuditResult::Success,
        )
        .with_user_id(application_name.to_string())
        .with_details(serde_json::json!({
            "workflow_name": workflow_name,
        }));

        self.log_event(event).await
    }

    /// Log a workflow execution reaching `completed`
    pub async fn log_workflow_completed(
        &self,
        execution_id: i64,
        application_name: &str,
        workflow_name: &str,
        duration: Duration,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::WorkflowCompleted,
            format!("workflow '{}' completed", workflow_name),
            ResourceType::WorkflowExecution,
            execution_id.to_string(),
            AuditResult::Success,
        )
        .with_user_id(application_name.to_string())
        .with_details(serde_json::json!({
            "duration_ms": duration.as_millis() as u64,
        }));

        self.log_event(event).await
    }

    /// Log a workflow execution reaching `failed`
    pub async fn log_workflow_failed(
        &self,
        execution_id: i64,
        application_name: &str,
        workflow_name: &str,
        failed_step: Option<&str>,
        reason: &str,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::WorkflowFailed,
            format!("workflow '{}' failed", workflow_name),
            ResourceType::WorkflowExecution,
            execution_id.to_string(),
            AuditResult::Failure(reason.to_string()),
        )
        .with_user_id(application_name.to_string())
        .with_details(serde_json::json!({
            "failed_step": failed_step,
        }));

        self.log_event(event).await
    }

    /// Log an individual step's completion
    pub async fn log_step_completed(
        &self,
        execution_id: i64,
        step_name: &str,
        duration: Duration,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::StepCompleted,
            format!("step '{}' completed", step_name),
            ResourceType::Step,
            step_name.to_string(),
            AuditResult::Success,
        )
        .with_details(serde_json::json!({
            "workflow_execution_id": execution_id,
            "duration_ms": duration.as_millis() as u64,
        }));

        self.log_event(event).await
    }

    /// Log an individual step's failure
    pub async fn log_step_failed(&self, execution_id: i64, step_name: &str, reason: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::StepFailed,
            format!("step '{}' failed", step_name),
            ResourceType::Step,
            step_name.to_string(),
            AuditResult::Failure(reason.to_string()),
        )
        .with_details(serde_json::json!({
            "workflow_execution_id": execution_id,
        }));

        self.log_event(event).await
    }

    /// Log a resource instance's lifecycle transition
    pub async fn log_resource_transitioned(
        &self,
        resource_id: uuid::Uuid,
        resource_key: &str,
        application_name: &str,
        new_state: &str,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::ResourceTransitioned,
            format!("resource '{}' transitioned to {}", resource_key, new_state),
            ResourceType::Resource,
            resource_id.to_string(),
            AuditResult::Success,
        )
        .with_user_id(application_name.to_string())
        .with_details(serde_json::json!({
            "resource_key": resource_key,
            "new_state": new_state,
        }));

        self.log_event(event).await
    }

    /// Log a generic audit event
    pub async fn log_event(&self, mut event: AuditEvent) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        // Add hash chain for tamper detection
        let prev_hash = self.previous_hash.read().clone();
        event.previous_hash = prev_hash;
        event.event_hash = Some(event.compute_hash());

        // Store the event
        self.storage.store(&event).await?;

        // Update previous hash
        *self.previous_hash.write() = event.event_hash.clone();

        tracing::debug!(
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            user_id = ?event.user_id,
            "Audit event logged"
        );

        Ok(())
    }

    /// Get the storage backend
    pub fn storage(&self) -> &AuditStorageRef {
        &self.storage
    }
}

/// No-op storage for disabled audit logger
struct NoOpStorage;

#[async_trait::async_trait]
impl AuditStorage for NoOpStorage {
    async fn store(&self, _event: &AuditEvent) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _filter: crate::models::AuditFilter) -> Result<Vec<AuditEvent>> {
        Ok(vec![])
    }

    async fn get(&self, _id: uuid::Uuid) -> Result<Option<AuditEvent>> {
        Ok(None)
    }

    async fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(0)
    }

    async fn count(&self, _filter: crate::models::AuditFilter) -> Result<u64> {
        Ok(0)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{FileAuditStorage, RotationPolicy};
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_audit_logger_workflow_completed() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Arc::new(
            FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap(),
        );
        let logger = AuditLogger::new(storage.clone());

        logger
            .log_workflow_completed(42, "checkout", "deploy-application", Duration::from_millis(500))
            .await
            .unwrap();

        let filter = crate::models::AuditFilter::new();
        let events = storage.query(filter).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::WorkflowCompleted);
        assert_eq!(events[0].resource_id, "42");
    }

    #[tokio::test]
    async fn test_audit_logger_hash_chain() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Arc::new(
            FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap(),
        );
        let logger = AuditLogger::new(storage.clone());

        logger
            .log_workflow_started(1, "checkout", "deploy-application")
            .await
            .unwrap();
        logger
            .log_workflow_started(2, "checkout", "deploy-application")
            .await
            .unwrap();

        let filter = crate::models::AuditFilter::new();
        let events = storage.query(filter).await.unwrap();

        assert_eq!(events.len(), 2);

        // Second event should reference first event's hash
        assert!(events[0].previous_hash.is_some());
        assert!(events[1].previous_hash.is_none()); // First event has no previous
    }

    #[tokio::test]
    async fn test_disabled_logger() {
        let logger = AuditLogger::disabled();

        assert!(!logger.is_enabled());

        // Should not error when disabled
        logger
            .log_workflow_completed(42, "checkout", "deploy-application", Duration::from_millis(500))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_audit_logger_resource_transitioned() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Arc::new(
            FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap(),
        );
        let logger = AuditLogger::new(storage.clone());

        logger
            .log_resource_transitioned(uuid::Uuid::new_v4(), "db", "checkout", "active")
            .await
            .unwrap();

        let filter = crate::models::AuditFilter::new();
        let events = storage.query(filter).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::ResourceTransitioned);
        assert_eq!(events[0].resource_type, ResourceType::Resource);
    }
}
