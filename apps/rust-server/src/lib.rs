// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Renovation Payments - project payment reconciliation service
//!
//! Payment records belong to renovation projects. A payment is sent to one
//! of three providers (Stripe, Qonto, Revolut) and its status is reconciled
//! back from webhooks, from the confirmation page and from a background
//! poller. The first validated payment moves its project to "in progress".
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer JWT verification and roles
//! - `providers` - Stripe, Qonto and Revolut clients
//! - `reconciliation` - Status mapping, terminal guard and project promotion
//! - `payment_poller` - Background reconciliation sweep
//! - `storage` - JSON document store and audit log

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod payment_poller;
pub mod providers;
pub mod reconciliation;
pub mod state;
pub mod storage;
