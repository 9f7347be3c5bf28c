use std::env;
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::thumbnail_types::{ThumbError, ThumbResult, ThumbnailFormat};

pub const DEFAULT_META_FOLDER: &str = ".ts";
pub const DEFAULT_MAX_THUMB_SIZE: u32 = 512;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 30 * 1024 * 1024;

/// Settings for thumbnail generation. Built once and handed to
/// [`crate::ThumbnailGenerator::new`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the hidden per-directory folder holding derived artifacts.
    pub meta_folder: String,
    pub format: ThumbnailFormat,
    /// Longer edge of a generated thumbnail, in pixels.
    pub max_thumb_size: u32,
    /// Fill color behind transparent sources.
    pub background: [u8; 3],
    /// JPEG quality, 1-100. WebP thumbnails are always lossless and ignore it.
    pub quality: u8,
    /// Size-gated strategies only run for files strictly smaller than this.
    pub max_file_size: u64,
    /// Percent of the video duration from which the captured frame is drawn.
    pub seek_percent_range: RangeInclusive<u32>,
    pub process_timeout: Duration,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// File stem of the thumbnail representing a whole folder.
    pub folder_thumbnail_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta_folder: DEFAULT_META_FOLDER.to_string(),
            format: ThumbnailFormat::Jpeg,
            max_thumb_size: DEFAULT_MAX_THUMB_SIZE,
            background: [0xFF, 0xFF, 0xFF],
            quality: 85,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            seek_percent_range: 20..=80,
            process_timeout: Duration::from_secs(30),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            folder_thumbnail_name: "tst".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> ThumbResult<Self> {
        let defaults = Config::default();

        let format = match env::var("TAGTHUMBS_FORMAT") {
            Ok(value) => value.parse().map_err(|_| {
                ThumbError::Configuration(format!("Unknown thumbnail format: {}", value))
            })?,
            Err(_) => defaults.format,
        };

        let background = match env::var("TAGTHUMBS_BACKGROUND") {
            Ok(value) => parse_hex_color(&value)?,
            Err(_) => defaults.background,
        };

        let seek_min = parse_var("TAGTHUMBS_SEEK_MIN_PERCENT", *defaults.seek_percent_range.start())?;
        let seek_max = parse_var("TAGTHUMBS_SEEK_MAX_PERCENT", *defaults.seek_percent_range.end())?;

        let config = Config {
            meta_folder: env::var("TAGTHUMBS_META_FOLDER").unwrap_or(defaults.meta_folder),
            format,
            max_thumb_size: parse_var("TAGTHUMBS_MAX_SIZE", defaults.max_thumb_size)?,
            background,
            quality: parse_var("TAGTHUMBS_QUALITY", defaults.quality)?,
            max_file_size: parse_var("TAGTHUMBS_MAX_FILE_SIZE", defaults.max_file_size)?,
            seek_percent_range: seek_min..=seek_max,
            process_timeout: Duration::from_secs(parse_var(
                "TAGTHUMBS_PROCESS_TIMEOUT_SECS",
                defaults.process_timeout.as_secs(),
            )?),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            folder_thumbnail_name: env::var("TAGTHUMBS_FOLDER_THUMBNAIL")
                .unwrap_or(defaults.folder_thumbnail_name),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ThumbResult<()> {
        if self.meta_folder.is_empty()
            || self.meta_folder.contains(['/', '\\'])
            || self.meta_folder == "."
            || self.meta_folder == ".."
        {
            return Err(ThumbError::Configuration(format!(
                "Meta folder must be a single directory name, got {:?}",
                self.meta_folder
            )));
        }
        if self.max_thumb_size == 0 {
            return Err(ThumbError::Configuration(
                "Maximum thumbnail size must be positive".to_string(),
            ));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(ThumbError::Configuration(format!(
                "Quality must be between 1 and 100, got {}",
                self.quality
            )));
        }
        if self.seek_percent_range.is_empty() || *self.seek_percent_range.end() > 100 {
            return Err(ThumbError::Configuration(format!(
                "Invalid seek range {:?}",
                self.seek_percent_range
            )));
        }
        if self.process_timeout.is_zero() {
            return Err(ThumbError::Configuration(
                "Process timeout must be positive".to_string(),
            ));
        }
        if self.ffmpeg_path.trim().is_empty() || self.ffprobe_path.trim().is_empty() {
            return Err(ThumbError::Configuration(
                "ffmpeg and ffprobe paths must be set".to_string(),
            ));
        }
        if self.folder_thumbnail_name.is_empty() || self.folder_thumbnail_name.contains(['/', '\\'])
        {
            return Err(ThumbError::Configuration(format!(
                "Invalid folder thumbnail name {:?}",
                self.folder_thumbnail_name
            )));
        }
        Ok(())
    }

    /// Extension appended to source file names, e.g. `.jpg`.
    pub fn thumbnail_extension(&self) -> &'static str {
        self.format.extension()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> ThumbResult<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| ThumbError::Configuration(format!("{}={:?}: {}", name, value, e))),
        Err(_) => Ok(default),
    }
}

/// Parses `#RRGGBB` or `RRGGBB`.
pub fn parse_hex_color(value: &str) -> ThumbResult<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    let invalid = || ThumbError::Configuration(format!("Invalid color {:?}", value));

    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }

    let mut rgb = [0u8; 3];
    for (i, channel) in rgb.iter_mut().enumerate() {
        *channel = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
    }
    Ok(rgb)
}
