// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Project membership checks.
//!
//! Admins reach every project. Everyone else reaches the projects they are
//! the client, artisan or courtier of.

use crate::auth::AuthenticatedUser;

use super::StoredProject;

/// The user is not allowed to touch the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub user_id: String,
    pub project_id: String,
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "User {} has no access to project {}",
            self.user_id, self.project_id
        )
    }
}

impl std::error::Error for AccessDenied {}

pub fn ensure_project_access(
    project: &StoredProject,
    user: &AuthenticatedUser,
) -> Result<(), AccessDenied> {
    if user.is_admin() || project.has_member(&user.user_id) {
        Ok(())
    } else {
        Err(AccessDenied {
            user_id: user.user_id.clone(),
            project_id: project.id.clone(),
        })
    }
}
