use std::path::{Path, PathBuf};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),

    #[error("failed to write object: {0}")]
    Io(#[from] std::io::Error),
}

/// Where finished images are kept after they have been returned.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
}

/// Key for a stored result: `{author}/{uuid}_{prompt}.{ext}`.
///
/// Path separators and other unsafe characters in the author and prompt are
/// replaced so the key always names exactly one object.
pub fn object_key(author: &str, prompt: Option<&str>, extension: &str) -> String {
    let author = sanitize(author, 64);
    let author = if author.is_empty() { "anonymous".to_string() } else { author };
    let prompt = sanitize(prompt.unwrap_or_default(), 80);
    format!("{author}/{}_{prompt}.{extension}", Uuid::new_v4())
}

fn sanitize(raw: &str, max_chars: usize) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(max_chars)
        .collect()
}

/// Stores objects as files below a root directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|component| matches!(component, std::path::Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(key, "stored result");
        Ok(())
    }
}
