//! Mock manifest repository for testing and development.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::info;

use super::{Checkout, Repo, RepoError};

/// A recorded push: the commit message and the full tree as it stood
/// when pushed.
#[derive(Debug, Clone)]
pub struct Push {
    pub message: String,
    pub files: BTreeMap<PathBuf, Vec<u8>>,
}

/// Mock repository seeded with a fixed tree.
///
/// Every clone materialises the seed tree into a fresh temp directory;
/// pushes snapshot whatever the working copy contains at that point.
#[derive(Default)]
pub struct MockRepo {
    seed: BTreeMap<PathBuf, Vec<u8>>,
    pushes: Mutex<Vec<Push>>,
    fail_pushes: bool,
}

impl MockRepo {
    /// Create an empty mock repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, by path relative to the repository root.
    pub fn add_file(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.seed.insert(path.into(), contents.into());
        self
    }

    /// Make every push fail.
    pub fn failing_pushes(mut self) -> Self {
        self.fail_pushes = true;
        self
    }

    /// Every push so far, oldest first.
    pub fn pushes(&self) -> Vec<Push> {
        self.pushes.lock().unwrap().clone()
    }

    fn snapshot(root: &Path, prefix: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            let path = entry.path();
            let rel = prefix.join(entry.file_name());
            if path.is_dir() {
                Self::snapshot(&path, &rel, out)?;
            } else {
                out.insert(rel, std::fs::read(&path)?);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Repo for MockRepo {
    async fn clone_repo(&self) -> Result<Checkout, RepoError> {
        let workdir = TempDir::new()?;

        for (path, contents) in &self.seed {
            let full = workdir.path().join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&full, contents)?;
        }

        // A key file is part of the clone contract; the mock's is inert.
        let key_file = workdir.path().join(".deploy-key");
        std::fs::write(&key_file, b"mock-deploy-key")?;

        info!(workdir = %workdir.path().display(), "[MOCK] Cloned repository");
        Ok(Checkout::new(workdir, key_file))
    }

    async fn commit_and_push(
        &self,
        checkout: &Checkout,
        message: &str,
    ) -> Result<String, RepoError> {
        if self.fail_pushes {
            return Err(RepoError::Push("mock repository configured to fail".to_string()));
        }

        let mut files = BTreeMap::new();
        Self::snapshot(checkout.workdir(), Path::new(""), &mut files)?;
        files.remove(Path::new(".deploy-key"));

        info!(message = %message, files = files.len(), "[MOCK] Pushed commit");
        self.pushes.lock().unwrap().push(Push {
            message: message.to_string(),
            files,
        });

        Ok(String::new())
    }
}
