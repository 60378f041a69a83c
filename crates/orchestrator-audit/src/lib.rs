// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Tamper-evident audit trail for the platform orchestrator: hash-chained
//! audit events covering workflow execution, step, and resource lifecycle
//! transitions, with file-based, database-backed, and retention-managed
//! storage backends.

pub mod database;
pub mod event_bus;
pub mod file;
pub mod logger;
pub mod models;
pub mod retention;
pub mod storage;

pub use event_bus::AuditEventBus;
pub use file::{FileAuditStorage, RotationPolicy};
pub use logger::AuditLogger;
pub use models::{AuditEvent, AuditEventType, AuditFilter, AuditResult, ResourceType};
pub use retention::AuditRetentionManager;
pub use storage::{AuditStorage, AuditStorageRef, StorageError};

#[cfg(feature = "database")]
pub use database::DatabaseAuditStorage;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
