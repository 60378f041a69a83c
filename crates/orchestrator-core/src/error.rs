// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the workflow execution engine.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the workflow execution engine.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A variable reference could not be resolved against current context state.
    #[error("unresolved variable reference '{reference}' in step '{step}'")]
    UnresolvedVariable { step: String, reference: String },

    /// A step's `depends_on` entry never reached `success`.
    #[error("dependency '{dependency}' did not complete successfully")]
    DependencyFailed { dependency: String },

    /// A step's `depends_on` entry does not name a step in the workflow.
    #[error("dependency '{dependency}' is not a known step")]
    DependencyNotFound { dependency: String },

    /// Condition evaluation failed (unknown step reference, bad regex, closed grammar violation).
    #[error("condition evaluation failed: {reason}")]
    ConditionError { reason: String },

    /// No executor is registered for a step's `type`.
    #[error("no executor registered for step type '{step_type}'")]
    UnknownStepType { step_type: String },

    /// A step executor reported a failure.
    #[error("step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// A step's executor exceeded its deadline.
    #[error("step '{step}' timed out after {duration:?}")]
    Timeout { step: String, duration: Duration },

    /// The workflow definition itself is invalid (duplicate step names, missing fields).
    #[error("invalid workflow: {reason}")]
    InvalidWorkflow { reason: String },

    /// `depends_on` edges form a cycle.
    #[error("workflow contains a dependency cycle involving step '{step}'")]
    DependencyCycle { step: String },

    /// A required platform workflow did not appear among the resolved set.
    #[error("required platform workflow '{name}' was not resolved for this application")]
    MissingRequiredWorkflow { name: String },

    /// Failed to read or parse a workflow definition file.
    #[error("failed to load workflow file '{path}': {reason}")]
    WorkflowLoad { path: String, reason: String },

    /// The persistence adapter failed to create a record that is required to proceed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A step's output file could not be parsed.
    #[error("failed to parse output for step '{step}': {reason}")]
    OutputParse { step: String, reason: String },

    /// Catch-all for executor-side errors that don't fit a more specific variant.
    #[error("{0}")]
    Other(String),
}

impl OrchestratorError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
