// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - Full access to every project, payment and the audit log
/// - `Courtier` - Broker; creates projects and follows the ones they manage
/// - `Artisan` - Contractor assigned to projects
/// - `Client` - Project owner, pays for the work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Artisan,
    Courtier,
    Client,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (own, required) => *own == required,
        }
    }

    /// Parse role from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "artisan" => Some(Role::Artisan),
            "courtier" | "broker" => Some(Role::Courtier),
            "client" => Some(Role::Client),
            _ => None,
        }
    }

    /// Roles allowed to open a new project.
    pub fn can_create_projects(&self) -> bool {
        matches!(self, Role::Admin | Role::Courtier)
    }
}

impl Default for Role {
    /// Least privilege for authenticated users.
    fn default() -> Self {
        Role::Client
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Artisan => write!(f, "artisan"),
            Role::Courtier => write!(f, "courtier"),
            Role::Client => write!(f, "client"),
        }
    }
}
