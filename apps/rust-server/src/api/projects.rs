// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Minimal project endpoints: enough to own payments and observe promotion.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    audit_log,
    auth::{AuthenticatedUser, Auth},
    error::ApiError,
    state::AppState,
    storage::{
        ensure_project_access, AuditEventType, ProjectRepository, ProjectStatus, StoredProject,
    },
};

/// Request body for creating a project.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    pub name: String,
    /// User id of the paying client.
    pub client_id: String,
    #[serde(default)]
    pub artisan_id: Option<String>,
    /// Defaults to the caller when the caller is a courtier.
    #[serde(default)]
    pub courtier_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectResponse {
    pub id: String,
    pub name: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artisan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courtier_id: Option<String>,
    pub status: ProjectStatus,
    /// French label shown in the UI.
    pub status_label: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<StoredProject> for ProjectResponse {
    fn from(project: StoredProject) -> Self {
        Self {
            status_label: project.status.label_fr().to_string(),
            id: project.id,
            name: project.name,
            client_id: project.client_id,
            artisan_id: project.artisan_id,
            courtier_id: project.courtier_id,
            status: project.status,
            created_at: project.created_at.to_rfc3339(),
            updated_at: project.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectResponse>,
    pub total: usize,
}

/// Load a project the user may access; 404 when missing, 403 otherwise.
pub(crate) fn load_project(
    state: &AppState,
    project_id: &str,
    user: &AuthenticatedUser,
) -> Result<StoredProject, ApiError> {
    let project = ProjectRepository::new(&state.storage)
        .get(project_id)
        .map_err(|_| ApiError::not_found("Project not found"))?;

    if let Err(denied) = ensure_project_access(&project, user) {
        audit_log!(
            &state.storage,
            AuditEventType::PermissionDenied,
            user,
            "project",
            project_id
        );
        return Err(denied.into());
    }
    Ok(project)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Create a project.
#[utoipa::path(
    post,
    path = "/v1/projects",
    tag = "Projects",
    security(("bearer_auth" = [])),
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Only admins and courtiers create projects")
    )
)]
pub async fn create_project(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiError> {
    if !user.role.can_create_projects() {
        return Err(ApiError::forbidden("Only admins and courtiers can create projects"));
    }

    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    let client_id = request.client_id.trim();
    if client_id.is_empty() {
        return Err(ApiError::bad_request("client_id is required"));
    }

    let courtier_id = non_empty(request.courtier_id).or_else(|| {
        (user.role == crate::auth::Role::Courtier).then(|| user.user_id.clone())
    });

    let project = StoredProject::new(
        uuid::Uuid::new_v4().to_string(),
        name.to_string(),
        client_id.to_string(),
        non_empty(request.artisan_id),
        courtier_id,
    );
    ProjectRepository::new(&state.storage).create(&project)?;

    audit_log!(
        &state.storage,
        AuditEventType::ProjectCreated,
        &user,
        "project",
        &project.id
    );

    Ok((StatusCode::CREATED, Json(project.into())))
}

/// List the projects visible to the caller.
#[utoipa::path(
    get,
    path = "/v1/projects",
    tag = "Projects",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Visible projects", body = ProjectListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_projects(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<ProjectListResponse>, ApiError> {
    let repo = ProjectRepository::new(&state.storage);
    let projects = if user.is_admin() {
        repo.list()?
    } else {
        repo.list_for_member(&user.user_id)?
    };

    let projects: Vec<ProjectResponse> = projects.into_iter().map(Into::into).collect();
    Ok(Json(ProjectListResponse {
        total: projects.len(),
        projects,
    }))
}

/// Get a project.
#[utoipa::path(
    get,
    path = "/v1/projects/{project_id}",
    tag = "Projects",
    security(("bearer_auth" = [])),
    params(("project_id" = String, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project", body = ProjectResponse),
        (status = 403, description = "Not a member of this project"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn get_project(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = load_project(&state, &project_id, &user)?;
    Ok(Json(project.into()))
}
