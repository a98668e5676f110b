//! The manifest repository port.
//!
//! The control plane needs exactly two things from git: materialise the
//! configured revision into a fresh working directory (with the SSH key
//! to use for pushing), and commit-and-push a changeset. The process
//! driver that shells out to git lives outside this repository.

mod mock;

pub use mock::{MockRepo, Push};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use thiserror::Error;

/// A fresh working copy of the manifest repository.
///
/// The working directory is scratch space owned by this handle; it is
/// removed when the handle is dropped, which is what guarantees cleanup
/// on every completion path of a release.
#[derive(Debug)]
pub struct Checkout {
    workdir: TempDir,
    key_file: PathBuf,
}

impl Checkout {
    /// Wrap a materialised working directory and the key file to push
    /// with.
    pub fn new(workdir: TempDir, key_file: PathBuf) -> Self {
        Self { workdir, key_file }
    }

    /// The root of the working copy.
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// The SSH key file for pushing.
    pub fn key_file(&self) -> &Path {
        &self.key_file
    }
}

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("cloning repository: {0}")]
    Clone(String),

    #[error("committing and pushing: {0}")]
    Push(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The manifest repository's contract.
#[async_trait]
pub trait Repo: Send + Sync {
    /// Shallow-clone the configured revision into a fresh working
    /// directory.
    async fn clone_repo(&self) -> Result<Checkout, RepoError>;

    /// Commit everything changed in the checkout and push it. Returns
    /// whatever the underlying tooling printed, which may be empty.
    async fn commit_and_push(
        &self,
        checkout: &Checkout,
        message: &str,
    ) -> Result<String, RepoError>;
}
