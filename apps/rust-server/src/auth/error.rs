// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rejections of the auth layer: bad or missing bearer tokens (401), role
//! and project-membership denials (403), and a signing secret that was never
//! configured (500).
//!
//! Rejections carry a stable `error_code` next to the message so the web
//! front-end can tell an expired session from a forged one.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::AccessDenied;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header is required")]
    MissingAuthHeader,

    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,

    #[error("Token is malformed")]
    MalformedToken,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is not yet valid")]
    TokenNotYetValid,

    #[error("Token issuer is invalid")]
    InvalidIssuer,

    /// Signed mode is required but no secret was loaded.
    #[error("{0} is not configured")]
    SecretNotConfigured(&'static str),

    #[error("Admin role required")]
    AdminRequired,

    #[error("User {user_id} has no access to project {project_id}")]
    NotProjectMember { user_id: String, project_id: String },
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: &'static str,
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::SecretNotConfigured(_) => "auth_not_configured",
            AuthError::AdminRequired => "admin_required",
            AuthError::NotProjectMember { .. } => "not_project_member",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::SecretNotConfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::AdminRequired | AuthError::NotProjectMember { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<AccessDenied> for AuthError {
    fn from(denied: AccessDenied) -> Self {
        AuthError::NotProjectMember {
            user_id: denied.user_id,
            project_id: denied.project_id,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code(),
        });
        (status, body).into_response()
    }
}
