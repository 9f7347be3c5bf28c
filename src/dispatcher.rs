use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use crate::config::Config;
use crate::image_thumbnail;
use crate::storage::Storage;
use crate::thumbnail_types::{GenerationOutcome, SourceEntry, ThumbResult};
use crate::video_processor;

pub const SUPPORTED_IMAGES: &[&str] = &[
    "jpg", "jpeg", "jif", "jfif", "png", "gif", "svg", "webp", "bmp",
];

/// Images the built-in raster decoder cannot read.
const VECTOR_IMAGES: &[&str] = &["svg"];

/// Formats rendered by a delegated document generator.
pub const SUPPORTED_DOCUMENTS: &[&str] = &["pdf", "html", "url", "tiff"];

pub const SUPPORTED_TEXT: &[&str] = &[
    "txt", "md", "coffee", "c", "cpp", "css", "groovy", "haxe", "xml", "java", "js", "json",
    "less", "markdown", "mdown", "php", "pl", "py", "rb", "ini", "sh", "sql", "mhtml",
];

/// Zip-based containers whose preview is an embedded image.
pub const SUPPORTED_CONTAINERS: &[&str] = &[
    "zip", "pages", "key", "numbers", "epub", "docx", "pptx", "pptm", "potx", "potm", "ppxs",
    "ppsm", "sldx", "sldm", "dotx", "dotm", "xlsx", "xlsm", "xlst", "odp", "odg", "ods", "odt",
    "pdf",
];

pub const SUPPORTED_VIDEOS: &[&str] = &["ogv", "mp4", "webm", "m4v", "mkv", "lrv", "wmv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatClass {
    Image,
    Document,
    Text,
    Container,
    Video,
}

impl FormatClass {
    /// Precedence follows table order; `pdf` is therefore a document.
    const TABLE: [(FormatClass, &'static [&'static str]); 5] = [
        (FormatClass::Image, SUPPORTED_IMAGES),
        (FormatClass::Document, SUPPORTED_DOCUMENTS),
        (FormatClass::Text, SUPPORTED_TEXT),
        (FormatClass::Container, SUPPORTED_CONTAINERS),
        (FormatClass::Video, SUPPORTED_VIDEOS),
    ];

    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_lowercase();
        Self::TABLE
            .iter()
            .find(|(_, extensions)| extensions.contains(&extension.as_str()))
            .map(|(class, _)| *class)
    }

    /// Whether files at or above the size ceiling skip generation.
    pub fn is_size_gated(self) -> bool {
        matches!(self, FormatClass::Image | FormatClass::Container)
    }
}

/// Formats a delegated generator can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelegatedFormat {
    Pdf,
    Svg,
    Html,
    Url,
    Tiff,
    Text,
    Container,
    Video,
}

impl DelegatedFormat {
    fn for_class(class: FormatClass, extension: &str) -> Option<Self> {
        match class {
            FormatClass::Image => match extension {
                "svg" => Some(DelegatedFormat::Svg),
                _ => None,
            },
            FormatClass::Document => match extension {
                "pdf" => Some(DelegatedFormat::Pdf),
                "html" => Some(DelegatedFormat::Html),
                "url" => Some(DelegatedFormat::Url),
                "tiff" => Some(DelegatedFormat::Tiff),
                _ => None,
            },
            FormatClass::Text => Some(DelegatedFormat::Text),
            FormatClass::Container => Some(DelegatedFormat::Container),
            FormatClass::Video => Some(DelegatedFormat::Video),
        }
    }
}

/// Everything a delegated generator gets to see about one request.
#[derive(Debug, Clone, Copy)]
pub struct DelegatedRequest<'a> {
    pub source: &'a Path,
    pub target: &'a Path,
    pub max_size: u32,
    /// Image extensions a container generator may pick its preview from.
    pub image_extensions: &'a [&'static str],
}

/// Optional generators with broader format coverage than the built-in set.
///
/// A generator either returns encoded bytes, commits straight to
/// `request.target`, or reports [`GenerationOutcome::Empty`].
#[async_trait]
pub trait DelegatedGenerator: Send + Sync {
    async fn generate(
        &self,
        format: DelegatedFormat,
        request: DelegatedRequest<'_>,
    ) -> ThumbResult<GenerationOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Image,
    Video,
    Delegated(DelegatedFormat),
    /// Produces no artifact and always succeeds.
    Default,
}

/// Picks and runs the generation strategy for a file.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    delegated: Option<Arc<dyn DelegatedGenerator>>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<Config>,
        storage: Arc<dyn Storage>,
        delegated: Option<Arc<dyn DelegatedGenerator>>,
    ) -> Self {
        Self {
            config,
            storage,
            delegated,
        }
    }

    pub fn select_strategy(&self, extension: &str, file_size: Option<u64>) -> Strategy {
        let extension = extension.to_lowercase();
        let Some(class) = FormatClass::from_extension(&extension) else {
            return Strategy::Default;
        };

        if class.is_size_gated() && !self.within_size_limit(file_size) {
            debug!(
                "Skipping .{} file of size {:?}, limit is {} bytes",
                extension, file_size, self.config.max_file_size
            );
            return Strategy::Default;
        }

        let delegated = self
            .delegated
            .as_ref()
            .and(DelegatedFormat::for_class(class, &extension));

        match (class, delegated) {
            (FormatClass::Image, None) if VECTOR_IMAGES.contains(&extension.as_str()) => {
                Strategy::Default
            }
            (FormatClass::Image, None) => Strategy::Image,
            (FormatClass::Video, None) => Strategy::Video,
            (_, Some(format)) => Strategy::Delegated(format),
            (_, None) => Strategy::Default,
        }
    }

    fn within_size_limit(&self, file_size: Option<u64>) -> bool {
        matches!(file_size, Some(size) if size > 0 && size < self.config.max_file_size)
    }

    /// Runs the selected strategy. Failures are logged and reported as
    /// [`GenerationOutcome::Empty`].
    pub async fn generate(&self, source: &SourceEntry, target: &Path) -> GenerationOutcome {
        let strategy = self.select_strategy(&source.extension(), source.size);
        debug!(
            "Generating thumbnail for {} with {:?}",
            source.path.display(),
            strategy
        );

        match self.run(strategy, &source.path, target).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_not_found() => {
                debug!("Source vanished before generation: {}", source.path.display());
                GenerationOutcome::Empty
            }
            Err(e) => {
                warn!(
                    "Thumbnail generation failed for {}: {}",
                    source.path.display(),
                    e
                );
                GenerationOutcome::Empty
            }
        }
    }

    async fn run(
        &self,
        strategy: Strategy,
        source: &Path,
        target: &Path,
    ) -> ThumbResult<GenerationOutcome> {
        match strategy {
            Strategy::Image => {
                image_thumbnail::generate(self.storage.as_ref(), source, &self.config).await
            }
            Strategy::Video => {
                video_processor::generate_video_thumbnail(source, target, &self.config).await
            }
            Strategy::Delegated(format) => match &self.delegated {
                Some(delegated) => {
                    let request = DelegatedRequest {
                        source,
                        target,
                        max_size: self.config.max_thumb_size,
                        image_extensions: SUPPORTED_IMAGES,
                    };
                    delegated.generate(format, request).await
                }
                None => Ok(GenerationOutcome::Empty),
            },
            Strategy::Default => Ok(GenerationOutcome::Empty),
        }
    }
}
