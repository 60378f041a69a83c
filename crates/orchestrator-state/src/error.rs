// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to connect to database: {0}")]
    Connection(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;
