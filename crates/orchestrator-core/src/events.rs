// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Optional event bus for workflow lifecycle notifications.
//!
//! Absence of a configured bus is not an error: the executor simply omits
//! emission. An implementation backed by a tamper-evident audit trail lives
//! in the companion audit crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle events the executor publishes, if a bus is wired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    Started {
        application_name: String,
        workflow_name: String,
        execution_id: i64,
        total_steps: usize,
    },
    Completed {
        application_name: String,
        workflow_name: String,
        execution_id: i64,
        total_steps: usize,
        duration_ms: u64,
    },
    Failed {
        application_name: String,
        workflow_name: String,
        execution_id: i64,
        error_message: String,
    },
    StepCompleted {
        execution_id: i64,
        step_name: String,
        duration_ms: u64,
    },
    StepFailed {
        execution_id: i64,
        step_name: String,
        error_message: String,
    },
}

/// Publishes workflow lifecycle events. Implementations must not block the
/// executor on slow downstream sinks; failures to publish are logged by the
/// caller, not propagated as workflow failures.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: WorkflowEvent);
}

pub type EventBusRef = Arc<dyn EventBus>;

/// An event bus that discards every event; used when no bus is configured.
pub struct NullEventBus;

#[async_trait]
impl EventBus for NullEventBus {
    async fn publish(&self, _event: WorkflowEvent) {}
}
