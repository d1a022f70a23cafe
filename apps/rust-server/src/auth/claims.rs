// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;

/// Claims read from a bearer token issued by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub sid: Option<String>,
    /// Role claim; unknown or missing values fall back to `Client`.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, rename = "publicMetadata")]
    pub public_metadata: Option<PublicMetadata>,
}

/// Provider-side public metadata; older tokens carry the role here.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PublicMetadata {
    #[serde(default)]
    pub role: Option<String>,
}

/// Authenticated user information extracted from JWT.
///
/// This is the primary type used throughout the application to represent
/// the authenticated user making a request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Canonical user ID (`sub` claim)
    pub user_id: String,

    pub role: Role,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip)]
    pub issuer: String,

    /// Token expiration (Unix timestamp)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: TokenClaims) -> Self {
        let role = claims
            .role
            .as_deref()
            .or_else(|| {
                claims
                    .public_metadata
                    .as_ref()
                    .and_then(|m| m.role.as_deref())
            })
            .and_then(Role::from_str)
            .unwrap_or_default();

        Self {
            user_id: claims.sub,
            role,
            session_id: claims.sid,
            issuer: claims.iss,
            expires_at: claims.exp,
        }
    }

    pub fn has_role(&self, required: Role) -> bool {
        self.role.has_privilege(required)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claims() -> TokenClaims {
        TokenClaims {
            sub: "user_123".to_string(),
            exp: 1700003600,
            iss: "https://auth.example.com".to_string(),
            sid: Some("sess_abc".to_string()),
            role: Some("artisan".to_string()),
            public_metadata: None,
        }
    }

    #[test]
    fn from_claims_reads_top_level_role() {
        let user = AuthenticatedUser::from_claims(sample_claims());
        assert_eq!(user.user_id, "user_123");
        assert_eq!(user.role, Role::Artisan);
    }

    #[test]
    fn from_claims_falls_back_to_public_metadata() {
        let mut claims = sample_claims();
        claims.role = None;
        claims.public_metadata = Some(PublicMetadata {
            role: Some("admin".to_string()),
        });
        let user = AuthenticatedUser::from_claims(claims);
        assert!(user.is_admin());
    }

    #[test]
    fn from_claims_defaults_to_client_role() {
        let mut claims = sample_claims();
        claims.role = Some("superuser".to_string());
        let user = AuthenticatedUser::from_claims(claims);
        assert_eq!(user.role, Role::Client);
        assert!(!user.has_role(Role::Admin));
    }
}
