// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL-backed implementation of `orchestrator_core::PersistenceAdapter`.

pub mod error;
pub mod postgres;

pub use error::StateError;
pub use postgres::PostgresPersistence;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
