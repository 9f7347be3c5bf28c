//! Thumbnail cache for a file organizer.
//!
//! Thumbnails live next to their sources in a hidden meta folder and are
//! regenerated whenever they are older than the file they preview. Images are
//! rendered in-process, videos through ffprobe/ffmpeg, and other formats by an
//! optional [`DelegatedGenerator`].

pub mod config;
pub mod dispatcher;
pub mod image_thumbnail;
pub mod paths;
pub mod storage;
pub mod thumbnail_generator;
pub mod thumbnail_types;
pub mod video_processor;

pub use config::Config;
pub use dispatcher::{DelegatedFormat, DelegatedGenerator, DelegatedRequest, Dispatcher, Strategy};
pub use storage::{LocalStorage, Storage};
pub use thumbnail_generator::ThumbnailGenerator;
pub use thumbnail_types::{
    BatchEntry, FileStat, GenerationOutcome, RegeneratedThumbnail, SourceEntry, ThumbError,
    ThumbResult, ThumbnailFormat, ThumbnailResult,
};
