use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncRead;

/// An opened audio file ready to be streamed
pub struct AudioStream {
    /// Byte reader over the file contents
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Total size in bytes
    pub size_bytes: u64,
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("size_bytes", &self.size_bytes)
            .finish_non_exhaustive()
    }
}

/// Where recording files live
///
/// Implementations:
/// - Local disk, confined to the recordings directory
/// - Anything else that can open and remove by path (object storage, test doubles)
#[async_trait::async_trait]
pub trait AudioStorage: Send + Sync {
    /// Open the file for streaming
    ///
    /// Must return `io::ErrorKind::NotFound` when the file does not exist.
    async fn open(&self, path: &Path) -> io::Result<AudioStream>;

    /// Remove the file
    ///
    /// Must return `io::ErrorKind::NotFound` when the file does not exist.
    async fn remove(&self, path: &Path) -> io::Result<()>;

    /// Map a capture-supplied path to the one this storage manages
    ///
    /// `None` means the path lies outside the storage and must not be registered.
    fn resolve(&self, path: &Path) -> Option<PathBuf> {
        Some(path.to_path_buf())
    }

    /// Storage name for logging
    fn name(&self) -> &str;
}

/// Recording files on the local filesystem, confined to one directory
#[derive(Debug, Clone)]
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl AudioStorage for LocalDiskStorage {
    async fn open(&self, path: &Path) -> io::Result<AudioStream> {
        let file = tokio::fs::File::open(path).await?;
        let size_bytes = file.metadata().await?.len();

        Ok(AudioStream {
            reader: Box::new(file),
            size_bytes,
        })
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    /// Relative paths are taken from the root; `..` is never accepted. The check is lexical.
    fn resolve(&self, path: &Path) -> Option<PathBuf> {
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return None;
        }

        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        (resolved.starts_with(&self.root) && resolved != self.root).then_some(resolved)
    }

    fn name(&self) -> &str {
        "local-disk"
    }
}
