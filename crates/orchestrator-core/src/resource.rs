// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Resource lifecycle tracking for steps that provision infrastructure
//! (`resource: database`, `resource: cluster`, ...). A resource instance
//! moves through `requested -> provisioning -> active` on success or
//! `requested -> provisioning -> failed` on error; outputs recorded on
//! `active` become available to later steps as `${resources.<key>.<field>}`.
//!
//! The `active`/`failed` transition itself is not performed by the step that
//! provisions a resource: it is deferred to Resource Coupling (§4.7), which
//! runs once at workflow termination and also sets `health`, distinct from
//! `state`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Requested,
    Provisioning,
    Active,
    Failed,
}

/// Health distinct from lifecycle `state` (§4.7): set only by Resource
/// Coupling, once the owning workflow execution terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceHealth {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInstance {
    pub id: uuid::Uuid,
    pub application_name: String,
    /// The `resource:` key declared on the owning step (falls back to the
    /// step name per `Step::resource_key`).
    pub resource_key: String,
    /// Links this resource to the workflow execution that requested it.
    /// Resource Coupling (§4.7) may only transition a resource whose
    /// `workflow_execution_id` equals the terminating execution's id.
    pub workflow_execution_id: Option<i64>,
    pub state: ResourceState,
    pub health: ResourceHealth,
    pub outputs: HashMap<String, String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceInstance {
    fn new(application_name: impl Into<String>, resource_key: impl Into<String>, workflow_execution_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            application_name: application_name.into(),
            resource_key: resource_key.into(),
            workflow_execution_id: Some(workflow_execution_id),
            state: ResourceState::Requested,
            health: ResourceHealth::Unknown,
            outputs: HashMap::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Tracks resource lifecycle state across the steps that provision and
/// consume a given resource. Implementations must serialize transitions for
/// a single resource id but may run concurrently across distinct resources,
/// mirroring how the executor runs independent parallel-group steps.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    async fn request(&self, application_name: &str, resource_key: &str, workflow_execution_id: i64) -> Result<ResourceInstance>;
    async fn mark_provisioning(&self, id: uuid::Uuid, outputs: HashMap<String, String>) -> Result<()>;
    /// Resource Coupling success path (§4.7): `state = active`, `health = healthy`.
    async fn mark_active(&self, id: uuid::Uuid) -> Result<()>;
    /// Resource Coupling failure path (§4.7): `state = failed`, `health = unhealthy`.
    async fn mark_failed(&self, id: uuid::Uuid, error_message: &str) -> Result<()>;
    async fn get(&self, id: uuid::Uuid) -> Result<Option<ResourceInstance>>;
    async fn find_by_key(&self, application_name: &str, resource_key: &str) -> Result<Option<ResourceInstance>>;
    /// §6 Resource Manager Contract's `GetResourcesByApplication`, scoped to
    /// one execution and state — the lookup Resource Coupling needs to find
    /// everything it owns and may still touch.
    async fn get_resources_by_execution(
        &self,
        workflow_execution_id: i64,
        state: ResourceState,
    ) -> Result<Vec<ResourceInstance>>;
}

pub type ResourceManagerRef = Arc<dyn ResourceManager>;

/// In-memory resource manager; the default used by tests and single-process
/// runs that don't persist resource state across restarts.
pub struct InMemoryResourceManager {
    resources: DashMap<uuid::Uuid, ResourceInstance>,
}

impl Default for InMemoryResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryResourceManager {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
        }
    }

    fn transition(
        &self,
        id: uuid::Uuid,
        expected: &[ResourceState],
        apply: impl FnOnce(&mut ResourceInstance),
    ) -> Result<()> {
        let mut entry = self
            .resources
            .get_mut(&id)
            .ok_or_else(|| OrchestratorError::other(format!("unknown resource id {id}")))?;
        if !expected.contains(&entry.state) {
            return Err(OrchestratorError::other(format!(
                "resource {id} cannot transition from {:?}: expected one of {:?}",
                entry.state, expected
            )));
        }
        apply(&mut entry);
        entry.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ResourceManager for InMemoryResourceManager {
    async fn request(&self, application_name: &str, resource_key: &str, workflow_execution_id: i64) -> Result<ResourceInstance> {
        let instance = ResourceInstance::new(application_name, resource_key, workflow_execution_id);
        self.resources.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn mark_provisioning(&self, id: uuid::Uuid, outputs: HashMap<String, String>) -> Result<()> {
        self.transition(id, &[ResourceState::Requested], |r| {
            r.state = ResourceState::Provisioning;
            r.outputs = outputs;
        })
    }

    async fn mark_active(&self, id: uuid::Uuid) -> Result<()> {
        self.transition(id, &[ResourceState::Requested, ResourceState::Provisioning], |r| {
            r.state = ResourceState::Active;
            r.health = ResourceHealth::Healthy;
        })
    }

    async fn mark_failed(&self, id: uuid::Uuid, error_message: &str) -> Result<()> {
        self.transition(id, &[ResourceState::Requested, ResourceState::Provisioning], |r| {
            r.state = ResourceState::Failed;
            r.health = ResourceHealth::Unhealthy;
            r.error_message = Some(error_message.to_string());
        })
    }

    async fn get(&self, id: uuid::Uuid) -> Result<Option<ResourceInstance>> {
        Ok(self.resources.get(&id).map(|r| r.clone()))
    }

    async fn find_by_key(&self, application_name: &str, resource_key: &str) -> Result<Option<ResourceInstance>> {
        Ok(self
            .resources
            .iter()
            .find(|r| r.application_name == application_name && r.resource_key == resource_key)
            .map(|r| r.clone()))
    }

    async fn get_resources_by_execution(
        &self,
        workflow_execution_id: i64,
        state: ResourceState,
    ) -> Result<Vec<ResourceInstance>> {
        Ok(self
            .resources
            .iter()
            .filter(|r| r.workflow_execution_id == Some(workflow_execution_id) && r.state == state)
            .map(|r| r.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn happy_path_transitions_to_active() {
        let mgr = InMemoryResourceManager::new();
        let resource = mgr.request("checkout", "db", 1).await.unwrap();
        assert_eq!(resource.state, ResourceState::Requested);
        assert_eq!(resource.health, ResourceHealth::Unknown);

        let mut outputs = HashMap::new();
        outputs.insert("host".to_string(), "db.internal".to_string());
        mgr.mark_provisioning(resource.id, outputs).await.unwrap();
        mgr.mark_active(resource.id).await.unwrap();

        let reloaded = mgr.get(resource.id).await.unwrap().unwrap();
        assert_eq!(reloaded.state, ResourceState::Active);
        assert_eq!(reloaded.health, ResourceHealth::Healthy);
        assert_eq!(reloaded.outputs["host"], "db.internal");
    }

    #[tokio::test]
    async fn failure_path_records_error_message() {
        let mgr = InMemoryResourceManager::new();
        let resource = mgr.request("checkout", "db", 1).await.unwrap();
        mgr.mark_provisioning(resource.id, HashMap::new()).await.unwrap();
        mgr.mark_failed(resource.id, "terraform apply failed").await.unwrap();

        let reloaded = mgr.get(resource.id).await.unwrap().unwrap();
        assert_eq!(reloaded.state, ResourceState::Failed);
        assert_eq!(reloaded.health, ResourceHealth::Unhealthy);
        assert_eq!(reloaded.error_message.as_deref(), Some("terraform apply failed"));
    }

    #[tokio::test]
    async fn cannot_activate_from_failed() {
        let mgr = InMemoryResourceManager::new();
        let resource = mgr.request("checkout", "db", 1).await.unwrap();
        mgr.mark_failed(resource.id, "boom").await.unwrap();
        let result = mgr.mark_active(resource.id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_resources_by_execution_filters_by_owner_and_state() {
        let mgr = InMemoryResourceManager::new();
        let a = mgr.request("checkout", "db", 1).await.unwrap();
        mgr.mark_provisioning(a.id, HashMap::new()).await.unwrap();
        let b = mgr.request("checkout", "cache", 1).await.unwrap();
        mgr.mark_provisioning(b.id, HashMap::new()).await.unwrap();
        mgr.mark_active(b.id).await.unwrap();
        let _other_execution = mgr.request("checkout", "queue", 2).await.unwrap();

        let provisioning = mgr.get_resources_by_execution(1, ResourceState::Provisioning).await.unwrap();
        assert_eq!(provisioning.len(), 1);
        assert_eq!(provisioning[0].id, a.id);
    }
}
