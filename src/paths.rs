//! Mapping from source files to their thumbnail location.
//!
//! Every directory owns a hidden meta folder; the thumbnail of
//! `<dir>/<name>` lives at `<dir>/<meta>/<name><ext>`. The file system is the
//! only index.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::config::Config;
use crate::thumbnail_types::{ThumbError, ThumbResult};

/// Lower-cased extension without the leading dot.
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default()
}

pub fn meta_directory(directory: &Path, meta_folder: &str) -> PathBuf {
    directory.join(meta_folder)
}

/// True when any component of `directory` is the meta folder.
pub fn is_inside_meta_folder(directory: &Path, meta_folder: &str) -> bool {
    directory
        .components()
        .any(|c| matches!(c, Component::Normal(name) if name == meta_folder))
}

fn containing_directory(source: &Path) -> ThumbResult<&Path> {
    match source.parent() {
        Some(parent) if source.file_name().is_some() => Ok(parent),
        _ => Err(ThumbError::InvalidPath(source.to_path_buf())),
    }
}

/// Fails with [`ThumbError::InvalidPath`] when `source` already sits in a meta
/// folder, so thumbnails never get thumbnails of their own.
pub fn guard_source(source: &Path, meta_folder: &str) -> ThumbResult<()> {
    let directory = containing_directory(source)?;
    if is_inside_meta_folder(directory, meta_folder) {
        return Err(ThumbError::InvalidPath(source.to_path_buf()));
    }
    Ok(())
}

/// Deterministic cache location for `source`. Pure, performs no I/O.
pub fn cache_location(source: &Path, config: &Config) -> ThumbResult<PathBuf> {
    guard_source(source, &config.meta_folder)?;
    let directory = containing_directory(source)?;
    let file_name = source
        .file_name()
        .ok_or_else(|| ThumbError::InvalidPath(source.to_path_buf()))?;

    let mut thumb_name = OsString::from(file_name);
    thumb_name.push(config.thumbnail_extension());

    Ok(meta_directory(directory, &config.meta_folder).join(thumb_name))
}

/// Location of the thumbnail representing the folder that contains `source`.
pub fn folder_thumbnail_location(source: &Path, config: &Config) -> ThumbResult<PathBuf> {
    guard_source(source, &config.meta_folder)?;
    let directory = containing_directory(source)?;
    let name = format!(
        "{}{}",
        config.folder_thumbnail_name,
        config.thumbnail_extension()
    );
    Ok(meta_directory(directory, &config.meta_folder).join(name))
}
