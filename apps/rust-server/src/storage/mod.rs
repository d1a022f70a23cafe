// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Document Storage
//!
//! Projects and payments are persisted as JSON documents on the local
//! filesystem under `DATA_DIR`.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   projects/
//!     {project_id}.json
//!   payments/
//!     {payment_id}.json
//!   audit/
//!     {date}/events.jsonl  # Daily audit logs
//! ```
//!
//! There is no transaction spanning two documents. Every write the
//! reconciliation layer performs is idempotent and can be retried on its own.

pub mod access;
pub mod audit;
pub mod documents;
pub mod paths;
pub mod repository;

pub use access::{ensure_project_access, AccessDenied};
pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use documents::{DocumentStorage, StorageError, StorageResult};
pub use paths::StoragePaths;
pub use repository::{
    PaymentFilter, PaymentPatch, PaymentProvider, PaymentRepository, PaymentStatus,
    ProjectRepository, ProjectStatus, StoredPayment, StoredProject,
};
