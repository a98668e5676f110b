//! Mock registry for testing and development.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use slipway_id::ImageId;

use super::{Image, Registry, RegistryError, Repository};

/// Mock registry holding an in-memory map of repositories.
#[derive(Default)]
pub struct MockRegistry {
    repositories: Mutex<HashMap<String, Repository>>,
}

impl MockRegistry {
    /// Create an empty mock registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add images to a repository, creating it if needed.
    ///
    /// Each entry is a `(tag, created_at)` pair; the image reference is
    /// `{repository}:{tag}`.
    pub fn add_images(&self, repository: &str, tags: &[(&str, DateTime<Utc>)]) {
        let mut repositories = self.repositories.lock().unwrap();
        let repo = repositories
            .entry(repository.to_string())
            .or_insert_with(|| Repository {
                name: repository.to_string(),
                images: Vec::new(),
            });
        for (tag, created_at) in tags {
            let id = ImageId::parse(&format!("{repository}:{tag}"))
                .unwrap_or_else(|_| ImageId::new(None::<String>, repository, Some(*tag)));
            repo.images.push(Image {
                id,
                created_at: *created_at,
            });
        }
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn get_repository(&self, repository: &str) -> Result<Repository, RegistryError> {
        debug!(repository = %repository, "[MOCK] Fetching repository");
        let repositories = self.repositories.lock().unwrap();
        repositories
            .get(repository)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownRepository(repository.to_string()))
    }
}
