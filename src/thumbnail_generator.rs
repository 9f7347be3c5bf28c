use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, warn};
use tokio::task::JoinSet;

use crate::config::Config;
use crate::dispatcher::{DelegatedGenerator, Dispatcher};
use crate::paths;
use crate::storage::Storage;
use crate::thumbnail_types::{
    BatchEntry, FileStat, GenerationOutcome, RegeneratedThumbnail, SourceEntry, ThumbError,
    ThumbResult, ThumbnailResult,
};

/// Looks up, generates and refreshes thumbnails stored in per-folder meta
/// directories.
///
/// Nothing is cached in memory: every lookup stats the source and its
/// thumbnail, and a thumbnail older than its source is regenerated. None of
/// the public operations fail for a single file; problems are logged and
/// reported as a missing thumbnail.
#[derive(Clone)]
pub struct ThumbnailGenerator {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    dispatcher: Dispatcher,
}

impl ThumbnailGenerator {
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        delegated: Option<Arc<dyn DelegatedGenerator>>,
    ) -> ThumbResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let dispatcher = Dispatcher::new(config.clone(), storage.clone(), delegated);

        Ok(Self {
            config,
            storage,
            dispatcher,
        })
    }

    pub fn cache_location(&self, source: &Path) -> ThumbResult<PathBuf> {
        paths::cache_location(source, &self.config)
    }

    /// Returns the cached thumbnail for `source`, generating it when it is
    /// missing or older than the source.
    pub async fn lookup_or_generate(&self, source: &Path) -> ThumbnailResult {
        let thumb_path = match self.cache_location(source) {
            Ok(path) => path,
            Err(e) => {
                debug!("No thumbnail lookup for {}: {}", source.display(), e);
                return ThumbnailResult::empty(source);
            }
        };

        let Some(source_stat) = self.stat_source(source).await else {
            return ThumbnailResult::empty(source);
        };

        match self.storage.stat(&thumb_path).await {
            Ok(thumb_stat) if is_fresh(&source_stat, &thumb_stat) => {
                debug!("Cache hit for {}", source.display());
                return ThumbnailResult::with_thumbnail(source, thumb_path);
            }
            Ok(_) => debug!("Stale thumbnail for {}, regenerating", source.display()),
            Err(e) if e.is_not_found() => {
                debug!("Cache miss for {}, generating thumbnail", source.display())
            }
            Err(e) => {
                warn!(
                    "Error getting thumbnail properties for {}: {}",
                    thumb_path.display(),
                    e
                );
                return ThumbnailResult::empty(source);
            }
        }

        let entry = SourceEntry::new(source, Some(source_stat.size), source_stat.modified);
        self.create_thumbnail(&entry, &thumb_path).await
    }

    /// Generates a thumbnail for `source` into `destination`, ignoring
    /// freshness.
    pub async fn force_regenerate(&self, source: &Path, destination: &Path) -> ThumbnailResult {
        if let Err(e) = paths::guard_source(source, &self.config.meta_folder) {
            debug!("Skipping regeneration: {}", e);
            return ThumbnailResult::empty(source);
        }

        let Some(source_stat) = self.stat_source(source).await else {
            return ThumbnailResult::empty(source);
        };

        let entry = SourceEntry::new(source, Some(source_stat.size), source_stat.modified);
        self.create_thumbnail(&entry, destination).await
    }

    /// Regenerates the default thumbnail of a file whose size is already
    /// known, without statting it first.
    pub async fn regenerate(&self, source: &Path, size: Option<u64>) -> ThumbnailResult {
        let thumb_path = match self.cache_location(source) {
            Ok(path) => path,
            Err(e) => {
                debug!("Skipping regeneration: {}", e);
                return ThumbnailResult::empty(source);
            }
        };

        let entry = SourceEntry::new(source, size, None);
        self.create_thumbnail(&entry, &thumb_path).await
    }

    /// Uses the thumbnail of `source` as the thumbnail of its folder.
    pub async fn set_folder_thumbnail(&self, source: &Path) -> ThumbnailResult {
        match paths::folder_thumbnail_location(source, &self.config) {
            Ok(destination) => self.force_regenerate(source, &destination).await,
            Err(e) => {
                debug!("Skipping folder thumbnail: {}", e);
                ThumbnailResult::empty(source)
            }
        }
    }

    /// Regenerates all `entries` concurrently and returns the ones that
    /// produced a thumbnail, in input order, each with a cache-busting URL.
    pub async fn regenerate_batch(&self, entries: &[BatchEntry]) -> Vec<RegeneratedThumbnail> {
        let mut tasks = JoinSet::new();

        for (index, entry) in entries.iter().cloned().enumerate() {
            let generator = self.clone();
            tasks.spawn(async move {
                let result = generator.regenerate(&entry.path, entry.size).await;
                (index, result)
            });
        }

        let mut produced = Vec::with_capacity(entries.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, ThumbnailResult {
                    source_path,
                    thumbnail_path: Some(thumbnail_path),
                })) => produced.push((index, source_path, thumbnail_path)),
                Ok(_) => {}
                Err(e) => error!("Thumbnail task failed: {}", e),
            }
        }
        produced.sort_by_key(|(index, _, _)| *index);

        let version = chrono::Utc::now().timestamp_millis();
        produced
            .into_iter()
            .map(|(_, source, thumbnail)| RegeneratedThumbnail::new(source, thumbnail, version))
            .collect()
    }

    async fn stat_source(&self, source: &Path) -> Option<FileStat> {
        match self.storage.stat(source).await {
            Ok(stat) if stat.is_file => Some(stat),
            Ok(_) => {
                debug!("Not a file, no thumbnail: {}", source.display());
                None
            }
            Err(e) => {
                log_failure("Error getting file properties", source, &e);
                None
            }
        }
    }

    async fn create_thumbnail(&self, source: &SourceEntry, target: &Path) -> ThumbnailResult {
        if let Err(e) = paths::guard_source(&source.path, &self.config.meta_folder) {
            debug!("Refusing to thumbnail meta folder content: {}", e);
            return ThumbnailResult::empty(&source.path);
        }

        if let Some(meta_directory) = target.parent() {
            if let Err(e) = self.storage.mkdir(meta_directory).await {
                log_failure("Creating meta directory failed", meta_directory, &e);
                return ThumbnailResult::empty(&source.path);
            }
        }

        match self.dispatcher.generate(source, target).await {
            GenerationOutcome::Empty => ThumbnailResult::empty(&source.path),
            GenerationOutcome::Committed => {
                ThumbnailResult::with_thumbnail(&source.path, target.to_path_buf())
            }
            GenerationOutcome::Bytes(data) if data.is_empty() => {
                ThumbnailResult::empty(&source.path)
            }
            GenerationOutcome::Bytes(data) => match self.storage.write(target, &data).await {
                Ok(()) => ThumbnailResult::with_thumbnail(&source.path, target.to_path_buf()),
                Err(e) => {
                    log_failure("Saving thumbnail failed", target, &e);
                    ThumbnailResult::empty(&source.path)
                }
            },
        }
    }
}

/// A thumbnail is fresh unless it is older than its source. Without a source
/// timestamp there is nothing to compare against.
fn is_fresh(source: &FileStat, thumbnail: &FileStat) -> bool {
    match (source.modified, thumbnail.modified) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(source_time), Some(thumb_time)) => thumb_time >= source_time,
    }
}

fn log_failure(context: &str, path: &Path, e: &ThumbError) {
    if e.is_not_found() {
        debug!("{} for {}: {}", context, path.display(), e);
    } else {
        warn!("{} for {}: {}", context, path.display(), e);
    }
}
