use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThumbnailFormat {
    #[default]
    Jpeg,
    Webp,
}

impl ThumbnailFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThumbnailFormat::Jpeg => "jpeg",
            ThumbnailFormat::Webp => "webp",
        }
    }

    /// File extension appended to the source file name, including the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ThumbnailFormat::Jpeg => ".jpg",
            ThumbnailFormat::Webp => ".webp",
        }
    }
}

impl FromStr for ThumbnailFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpeg" | "jpg" => Ok(ThumbnailFormat::Jpeg),
            "webp" => Ok(ThumbnailFormat::Webp),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ThumbnailFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a file to be thumbnailed, taken at lookup time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub path: PathBuf,
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
}

impl SourceEntry {
    pub fn new(path: impl Into<PathBuf>, size: Option<u64>, modified: Option<SystemTime>) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
        }
    }

    /// Lower-cased extension without the dot, empty when the file has none.
    pub fn extension(&self) -> String {
        crate::paths::file_extension(&self.path)
    }
}

/// Answer to a single-entry lookup. `thumbnail_path` is `None` when no
/// thumbnail exists or could be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailResult {
    pub source_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
}

impl ThumbnailResult {
    pub fn empty(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            thumbnail_path: None,
        }
    }

    pub fn with_thumbnail(source_path: impl Into<PathBuf>, thumbnail_path: PathBuf) -> Self {
        Self {
            source_path: source_path.into(),
            thumbnail_path: Some(thumbnail_path),
        }
    }
}

/// Input record for batch regeneration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub path: PathBuf,
    pub size: Option<u64>,
}

impl BatchEntry {
    pub fn new(path: impl Into<PathBuf>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// A freshly written thumbnail together with a cache-busting reference that
/// forces views to reload the new bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegeneratedThumbnail {
    pub source_path: PathBuf,
    pub thumbnail_path: PathBuf,
    pub url: String,
}

impl RegeneratedThumbnail {
    pub fn new(source_path: PathBuf, thumbnail_path: PathBuf, version: i64) -> Self {
        let url = format!("{}?{}", thumbnail_path.display(), version);
        Self {
            source_path,
            thumbnail_path,
            url,
        }
    }
}

/// What a generation strategy produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Encoded image bytes the caller still has to persist.
    Bytes(Vec<u8>),
    /// The artifact was already written to its final location.
    Committed,
    /// No thumbnail for this file. Not an error.
    Empty,
}

impl GenerationOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, GenerationOutcome::Empty)
    }
}

/// Result of a storage `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_file: bool,
    pub modified: Option<SystemTime>,
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbError {
    #[error("Not found: {0}")]
    NotFound(PathBuf),
    #[error("Decode failure: {0}")]
    DecodeFailure(String),
    #[error("External process failure: {0}")]
    ProcessFailure(String),
    #[error("External process `{program}` timed out after {timeout:?}")]
    ProcessTimeout { program: String, timeout: Duration },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Refusing to thumbnail inside a meta folder: {0}")]
    InvalidPath(PathBuf),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ThumbError {
    /// Missing files are an expected state and are not logged as failures.
    pub fn is_not_found(&self) -> bool {
        match self {
            ThumbError::NotFound(_) => true,
            ThumbError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<image::ImageError> for ThumbError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => ThumbError::Io(io),
            other => ThumbError::DecodeFailure(other.to_string()),
        }
    }
}

pub type ThumbResult<T> = Result<T, ThumbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_format_parsing() {
        assert_eq!("jpeg".parse::<ThumbnailFormat>(), Ok(ThumbnailFormat::Jpeg));
        assert_eq!("jpg".parse::<ThumbnailFormat>(), Ok(ThumbnailFormat::Jpeg));
        assert_eq!("webp".parse::<ThumbnailFormat>(), Ok(ThumbnailFormat::Webp));
        assert_eq!("gif".parse::<ThumbnailFormat>(), Err(()));

        assert_eq!(ThumbnailFormat::Jpeg.extension(), ".jpg");
        assert_eq!(ThumbnailFormat::Webp.extension(), ".webp");
        assert_eq!(format!("{}", ThumbnailFormat::default()), "jpeg");
    }

    #[test]
    fn test_regenerated_thumbnail_url_has_version_marker() {
        let regenerated = RegeneratedThumbnail::new(
            PathBuf::from("/photos/a.png"),
            PathBuf::from("/photos/.ts/a.png.jpg"),
            1700000000123,
        );
        assert_eq!(regenerated.url, "/photos/.ts/a.png.jpg?1700000000123");
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ThumbError::NotFound(PathBuf::from("/x")).is_not_found());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(ThumbError::from(io).is_not_found());
        assert!(!ThumbError::DecodeFailure("bad".into()).is_not_found());
    }
}
