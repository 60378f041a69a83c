// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Internal error type for executor implementations. Every public
//! `StepExecutor::execute` still returns `orchestrator_core::Result`; this
//! type exists so individual executors can use `?` over heterogeneous
//! failure sources (I/O, subprocess exit, HTTP, JSON) before converting to
//! the shared `OrchestratorError::StepFailed` at the boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("missing required config key '{0}'")]
    MissingConfig(String),

    #[error("invalid config value for '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("failed to spawn subprocess: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("command exited with status {status}: {tail}")]
    NonZeroExit { status: i32, tail: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api responded with status {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("failed to render template: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
