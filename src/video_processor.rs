use std::collections::HashMap;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;
use tokio::fs;
use tokio::process::Command;

use crate::config::Config;
use crate::image_thumbnail::fit_within;
use crate::storage::partial_path;
use crate::thumbnail_types::{GenerationOutcome, ThumbError, ThumbResult};

#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation in degrees, normalized to `0..360`.
    pub rotation: u32,
    pub duration: Option<f64>,
}

impl VideoMetadata {
    /// Frame size as displayed, with width and height swapped for
    /// quarter-turn rotations.
    pub fn display_dimensions(&self) -> (u32, u32) {
        match self.rotation {
            90 | 270 => (self.height, self.width),
            _ => (self.width, self.height),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    tags: HashMap<String, serde_json::Value>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl ProbeStream {
    fn rotation(&self) -> i64 {
        let from_tag = self.tags.get("rotate").and_then(|value| match value {
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            other => other.as_f64(),
        });
        let from_side_data = self.side_data_list.iter().find_map(|data| data.rotation);

        from_tag.or(from_side_data).unwrap_or(0.0).round() as i64
    }
}

pub fn parse_probe_output(json: &str) -> ThumbResult<VideoMetadata> {
    let parsed: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| ThumbError::DecodeFailure(format!("Invalid ffprobe output: {}", e)))?;

    let stream = parsed
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ThumbError::DecodeFailure("No video stream found".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(ThumbError::DecodeFailure(
                "Video stream has no dimensions".to_string(),
            ))
        }
    };

    let duration = parsed
        .format
        .and_then(|format| format.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    Ok(VideoMetadata {
        width,
        height,
        rotation: stream.rotation().rem_euclid(360) as u32,
        duration,
    })
}

pub async fn extract_video_metadata(
    video_path: &Path,
    config: &Config,
) -> ThumbResult<VideoMetadata> {
    let args = vec![
        "-v".to_string(),
        "quiet".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        video_path.to_string_lossy().into_owned(),
    ];
    let output = run_tool(&config.ffprobe_path, &args, config.process_timeout).await?;

    let json = String::from_utf8(output.stdout)
        .map_err(|e| ThumbError::DecodeFailure(format!("Invalid UTF-8 output: {}", e)))?;
    parse_probe_output(&json)
}

/// Draws a whole percentage from `range`. Not deterministic.
pub fn pick_seek_percent(range: &std::ops::RangeInclusive<u32>) -> u32 {
    let (low, high) = (*range.start(), *range.end());
    if high <= low {
        return low;
    }
    let span = (high - low + 1) as f64;
    (low + (rand::random::<f64>() * span) as u32).min(high)
}

pub fn seek_seconds(duration: Option<f64>, percent: u32) -> f64 {
    duration.map_or(0.0, |d| d * percent as f64 / 100.0)
}

/// Escapes ffmpeg's output pattern character so `%` in file names is taken
/// literally.
pub fn escape_ffmpeg(path: &str) -> String {
    path.replace('%', "%%")
}

/// Maps a 1-100 quality onto ffmpeg's 2-31 `q:v` scale, lower being better.
fn qscale(quality: u8) -> u32 {
    let quality = quality.clamp(1, 100) as u32;
    2 + (100 - quality) * 29 / 100
}

pub fn build_extract_args(
    video_path: &Path,
    output_path: &Path,
    seek: f64,
    size: (u32, u32),
    quality: u8,
) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-ss".to_string(),
        format!("{:.3}", seek),
        "-i".to_string(),
        video_path.to_string_lossy().into_owned(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        format!("scale={}:{}", size.0, size.1),
        "-q:v".to_string(),
        qscale(quality).to_string(),
        "-f".to_string(),
        "image2".to_string(),
        escape_ffmpeg(&output_path.to_string_lossy()),
    ]
}

async fn run_tool(program: &str, args: &[String], timeout: Duration) -> ThumbResult<Output> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ThumbError::ProcessFailure(format!("{} failed to start: {}", program, e)))?;

    // Dropping the future on timeout kills the child.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result
            .map_err(|e| ThumbError::ProcessFailure(format!("{} failed: {}", program, e)))?,
        Err(_) => {
            return Err(ThumbError::ProcessTimeout {
                program: program.to_string(),
                timeout,
            })
        }
    };

    if !output.status.success() {
        return Err(ThumbError::ProcessFailure(format!(
            "{} exited with status {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(output)
}

/// Probes `video_path` and captures a single frame straight into `target`.
///
/// The frame is written next to `target` first and renamed into place, so a
/// failed or interrupted extraction never leaves a partial thumbnail.
pub async fn generate_video_thumbnail(
    video_path: &Path,
    target: &Path,
    config: &Config,
) -> ThumbResult<GenerationOutcome> {
    let metadata = extract_video_metadata(video_path, config).await?;
    let (width, height) = metadata.display_dimensions();
    let size = fit_within(width, height, config.max_thumb_size);

    let percent = pick_seek_percent(&config.seek_percent_range);
    let seek = seek_seconds(metadata.duration, percent);
    debug!(
        "Capturing frame of {} at {}% ({:.3}s), {}x{}",
        video_path.display(),
        percent,
        seek,
        size.0,
        size.1
    );

    let partial = partial_path(target);
    let args = build_extract_args(video_path, &partial, seek, size, config.quality);

    if let Err(e) = run_tool(&config.ffmpeg_path, &args, config.process_timeout).await {
        discard(&partial).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&partial, target).await {
        discard(&partial).await;
        return Err(e.into());
    }

    Ok(GenerationOutcome::Committed)
}

async fn discard(partial: &Path) {
    if let Err(e) = fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial frame {}: {}", partial.display(), e);
        }
    }
}
