use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use tokio::fs;

use crate::thumbnail_types::{FileStat, ThumbError, ThumbResult};

/// The file system operations the thumbnail cache relies on.
///
/// Implementations may sit on local disk, a sandbox or an object store.
/// `stat` reports missing paths as [`ThumbError::NotFound`].
#[async_trait]
pub trait Storage: Send + Sync {
    async fn stat(&self, path: &Path) -> ThumbResult<FileStat>;

    async fn read(&self, path: &Path) -> ThumbResult<Vec<u8>>;

    /// Readers must observe either the previous artifact or the complete new one.
    async fn write(&self, path: &Path, data: &[u8]) -> ThumbResult<()>;

    /// Succeeds when the directory already exists.
    async fn mkdir(&self, path: &Path) -> ThumbResult<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }
}

/// Sibling path used while an artifact is being written. The name is built
/// from a random token only, so it carries no characters from the source.
pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    // Keeps the extension so external tools still infer the output format.
    path.with_file_name(format!(
        ".{:08x}.partial{}",
        rand::random::<u32>(),
        extension
    ))
}

#[async_trait]
impl Storage for LocalStorage {
    async fn stat(&self, path: &Path) -> ThumbResult<FileStat> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(FileStat {
                is_file: metadata.is_file(),
                modified: metadata.modified().ok(),
                size: metadata.len(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ThumbError::NotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, path: &Path) -> ThumbResult<Vec<u8>> {
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ThumbError::NotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> ThumbResult<()> {
        let partial = partial_path(path);
        fs::write(&partial, data).await?;

        if let Err(e) = fs::rename(&partial, path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    async fn mkdir(&self, path: &Path) -> ThumbResult<()> {
        match fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            _ => {
                fs::create_dir_all(path).await?;
                Ok(())
            }
        }
    }
}
