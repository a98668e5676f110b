//! The image registry port.
//!
//! Given an image lineage (`host/repository`), the registry reports the
//! images it knows about, with creation timestamps. "Latest" selection
//! lives here: newest `created_at` wins, with the lexicographically
//! greatest tag as the tiebreak so the answer is deterministic.

mod mock;

pub use mock::MockRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use slipway_id::ImageId;

/// One image in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub created_at: DateTime<Utc>,
}

/// All known images of one lineage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// The lineage, `host/repository` form.
    pub name: String,
    pub images: Vec<Image>,
}

impl Repository {
    /// The most recently created image, or `None` for an empty
    /// repository. Creation-time ties go to the greatest tag.
    pub fn latest_image(&self) -> Option<&Image> {
        self.images.iter().max_by(|a, b| {
            (a.created_at, a.id.tag().unwrap_or(""))
                .cmp(&(b.created_at, b.id.tag().unwrap_or("")))
        })
    }
}

/// Errors from registry lookups.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown image repository {0}")]
    UnknownRepository(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// The registry's contract.
#[async_trait]
pub trait Registry: Send + Sync {
    /// The images known for one lineage.
    async fn get_repository(&self, repository: &str) -> Result<Repository, RegistryError>;
}
