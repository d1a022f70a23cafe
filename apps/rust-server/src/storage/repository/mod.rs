// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the document store.

pub mod payments;
pub mod projects;

pub use payments::{
    PaymentFilter, PaymentPatch, PaymentProvider, PaymentRepository, PaymentStatus, StoredPayment,
};
pub use projects::{ProjectRepository, ProjectStatus, StoredProject};
