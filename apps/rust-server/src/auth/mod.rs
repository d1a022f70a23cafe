// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-token verification for the renovation payments API. Tokens are
//! issued by an external identity provider; this service only verifies them.
//!
//! ## Modes
//!
//! - `AUTH_JWT_SECRET` set: HS256 signature, expiry and (optionally) issuer
//!   are verified.
//! - No secret, built with the `dev` feature: the token structure and expiry
//!   are checked but the signature is not.
//! - No secret otherwise: every authenticated request fails with 500.
//!
//! Clock skew tolerance is 60 seconds.

pub mod claims;
pub mod error;
pub mod extractor;
pub mod roles;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth};
pub use roles::Role;
