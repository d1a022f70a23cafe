// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::providers::ProviderRegistry;
use crate::reconciliation::Reconciler;
use crate::storage::DocumentStorage;

/// Bearer token verification settings.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// HS256 secret; `None` selects development mode.
    pub jwt_secret: Option<String>,
    pub issuer: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<DocumentStorage>,
    pub auth_config: AuthConfig,
    pub reconciler: Reconciler,
    /// Front-end URL used in provider redirect links.
    pub public_base_url: String,
}

impl AppState {
    pub fn new(storage: DocumentStorage, providers: ProviderRegistry) -> Self {
        let storage = Arc::new(storage);
        Self {
            reconciler: Reconciler::new(storage.clone(), providers),
            storage,
            auth_config: AuthConfig::default(),
            public_base_url: crate::config::DEFAULT_PUBLIC_BASE_URL.to_string(),
        }
    }

    pub fn with_auth_config(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = auth_config;
        self
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = url.into();
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        self.reconciler.providers()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::storage::StoragePaths;
    use tempfile::TempDir;

    /// Fresh state over a temp directory, development-mode auth, no providers.
    pub fn test_state() -> (AppState, TempDir) {
        test_state_with(ProviderRegistry::default())
    }

    pub fn test_state_with(providers: ProviderRegistry) -> (AppState, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut storage = DocumentStorage::new(StoragePaths::new(temp_dir.path()));
        storage.initialize().expect("Failed to initialize storage");
        (AppState::new(storage, providers), temp_dir)
    }
}
