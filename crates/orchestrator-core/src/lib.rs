// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Core workflow execution engine for the platform orchestrator: the
//! workflow/step data model, execution context, condition evaluator, output
//! parser, persistence and resource-manager contracts, step executor
//! registry, tier resolver, the executor main loop, and the phase-level
//! concurrency runner.

pub mod condition;
pub mod config;
pub mod context;
pub mod dag;
pub mod error;
pub mod events;
pub mod executor;
pub mod output_parser;
pub mod persistence;
pub mod phase_runner;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod workflow;

pub use config::OrchestratorConfig;
pub use context::{ExecutionContext, StepStatus};
pub use error::{OrchestratorError, Result};
pub use events::{EventBus, EventBusRef, NullEventBus, WorkflowEvent};
pub use executor::{ExecutionOutcome, WorkflowExecutor};
pub use phase_runner::PhaseRunner;
pub use persistence::{
    ExecutionStatus, InMemoryPersistence, PersistenceAdapter, PersistenceRef, StepRecordStatus, WorkflowExecution,
    WorkflowStepExecution,
};
pub use registry::{StepExecutionInput, StepExecutionOutput, StepExecutor, StepExecutorRegistry};
pub use resolver::{ApplicationInstance, WorkflowResolver};
pub use resource::{InMemoryResourceManager, ResourceInstance, ResourceManager, ResourceManagerRef, ResourceState};
pub use workflow::{Phase, ResolvedWorkflow, Step, Tier, Trigger, Workflow, WorkflowFile};
