// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Project record repository.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::paths::is_document_id;
use super::super::{DocumentStorage, StorageError, StorageResult};

/// Renovation project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[serde(alias = "En attente", alias = "en_attente")]
    Pending,
    #[serde(alias = "En cours", alias = "en_cours")]
    InProgress,
    #[serde(alias = "Terminé", alias = "termine")]
    Completed,
    #[serde(alias = "Annulé", alias = "annule")]
    Cancelled,
}

impl ProjectStatus {
    pub fn label_fr(self) -> &'static str {
        match self {
            ProjectStatus::Pending => "En attente",
            ProjectStatus::InProgress => "En cours",
            ProjectStatus::Completed => "Terminé",
            ProjectStatus::Cancelled => "Annulé",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Pending => write!(f, "pending"),
            ProjectStatus::InProgress => write!(f, "in_progress"),
            ProjectStatus::Completed => write!(f, "completed"),
            ProjectStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Persisted project record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredProject {
    pub id: String,
    pub name: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artisan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courtier_id: Option<String>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredProject {
    pub fn new(
        id: String,
        name: String,
        client_id: String,
        artisan_id: Option<String>,
        courtier_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            client_id,
            artisan_id,
            courtier_id,
            status: ProjectStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `user_id` is the client, artisan or courtier of this project.
    pub fn has_member(&self, user_id: &str) -> bool {
        self.client_id == user_id
            || self.artisan_id.as_deref() == Some(user_id)
            || self.courtier_id.as_deref() == Some(user_id)
    }
}

/// Repository for project records.
pub struct ProjectRepository<'a> {
    storage: &'a DocumentStorage,
}

impl<'a> ProjectRepository<'a> {
    pub fn new(storage: &'a DocumentStorage) -> Self {
        Self { storage }
    }

    /// File of `project_id`. Ids that are not plain document ids never name a
    /// stored record.
    fn document(&self, project_id: &str) -> StorageResult<PathBuf> {
        if !is_document_id(project_id) {
            return Err(StorageError::NotFound(format!("Project {project_id}")));
        }
        Ok(self.storage.paths().project(project_id))
    }

    pub fn exists(&self, project_id: &str) -> bool {
        self.document(project_id)
            .map(|path| self.storage.exists(path))
            .unwrap_or(false)
    }

    pub fn get(&self, project_id: &str) -> StorageResult<StoredProject> {
        let path = self.document(project_id)?;
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound(format!("Project {project_id}")));
        }
        self.storage.read_json(path)
    }

    pub fn create(&self, project: &StoredProject) -> StorageResult<()> {
        if self.exists(&project.id) {
            return Err(StorageError::AlreadyExists(format!("Project {}", project.id)));
        }
        self.storage
            .write_json(self.document(&project.id)?, project)
    }

    /// Set the project status. Returns the record as stored; no write happens
    /// when the status is already `status`.
    pub fn update_status(
        &self,
        project_id: &str,
        status: ProjectStatus,
    ) -> StorageResult<StoredProject> {
        let mut project = self.get(project_id)?;
        if project.status == status {
            return Ok(project);
        }

        project.status = status;
        project.updated_at = Utc::now();
        self.storage
            .write_json(self.document(project_id)?, &project)?;
        Ok(project)
    }

    /// All projects, newest first.
    pub fn list(&self) -> StorageResult<Vec<StoredProject>> {
        let ids = self
            .storage
            .list_files(self.storage.paths().projects_dir(), "json")?;

        let mut projects = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(&id) {
                Ok(project) => projects.push(project),
                Err(error) => {
                    tracing::warn!(project_id = %id, error = %error, "skipping unreadable project document");
                }
            }
        }

        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    /// Projects `user_id` is a member of.
    pub fn list_for_member(&self, user_id: &str) -> StorageResult<Vec<StoredProject>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|project| project.has_member(user_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use tempfile::TempDir;

    fn test_storage() -> (TempDir, DocumentStorage) {
        let temp = TempDir::new().unwrap();
        let mut storage = DocumentStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        (temp, storage)
    }

    fn project(id: &str, client: &str) -> StoredProject {
        StoredProject::new(
            id.to_string(),
            format!("Kitchen {id}"),
            client.to_string(),
            Some("artisan-1".to_string()),
            None,
        )
    }

    #[test]
    fn french_labels_deserialize() {
        let status: ProjectStatus = serde_json::from_str(r#""En cours""#).unwrap();
        assert_eq!(status, ProjectStatus::InProgress);
        let status: ProjectStatus = serde_json::from_str(r#""En attente""#).unwrap();
        assert_eq!(status, ProjectStatus::Pending);
        assert_eq!(ProjectStatus::Cancelled.label_fr(), "Annulé");
    }

    #[test]
    fn update_status_persists() {
        let (_temp, storage) = test_storage();
        let repo = ProjectRepository::new(&storage);
        repo.create(&project("proj_1", "client-1")).unwrap();

        let updated = repo
            .update_status("proj_1", ProjectStatus::InProgress)
            .unwrap();
        assert_eq!(updated.status, ProjectStatus::InProgress);
        assert_eq!(
            repo.get("proj_1").unwrap().status,
            ProjectStatus::InProgress
        );

        let again = repo
            .update_status("proj_1", ProjectStatus::InProgress)
            .unwrap();
        assert_eq!(again.updated_at, updated.updated_at);
    }

    #[test]
    fn list_for_member_matches_any_role_slot() {
        let (_temp, storage) = test_storage();
        let repo = ProjectRepository::new(&storage);
        repo.create(&project("a", "client-1")).unwrap();
        repo.create(&project("b", "client-2")).unwrap();

        assert_eq!(repo.list().unwrap().len(), 2);
        assert_eq!(repo.list_for_member("client-1").unwrap().len(), 1);
        assert_eq!(repo.list_for_member("artisan-1").unwrap().len(), 2);
        assert!(repo.list_for_member("stranger").unwrap().is_empty());
    }

    #[test]
    fn get_missing_project_is_not_found() {
        let (_temp, storage) = test_storage();
        let repo = ProjectRepository::new(&storage);
        assert!(matches!(repo.get("nope"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn traversal_ids_are_not_found() {
        let (temp, storage) = test_storage();
        std::fs::write(
            temp.path().join("outside.json"),
            serde_json::to_vec(&project("outside", "client-1")).unwrap(),
        )
        .unwrap();

        let repo = ProjectRepository::new(&storage);
        assert!(matches!(repo.get("../outside"), Err(StorageError::NotFound(_))));
        assert!(matches!(
            repo.update_status("../outside", ProjectStatus::InProgress),
            Err(StorageError::NotFound(_))
        ));
    }
}
