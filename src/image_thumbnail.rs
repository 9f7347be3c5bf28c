use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use log::debug;

use crate::config::Config;
use crate::storage::Storage;
use crate::thumbnail_types::{GenerationOutcome, ThumbError, ThumbResult, ThumbnailFormat};

/// Scales `width`x`height` so the longer edge equals `max`, keeping the
/// aspect ratio. The short edge is rounded and never drops below one pixel.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (max, max);
    }

    let scale = |short: u32, long: u32| {
        ((max as f64 * short as f64 / long as f64).round() as u32).clamp(1, max)
    };

    if width >= height {
        (max, scale(height, width))
    } else {
        (scale(width, height), max)
    }
}

/// Decodes `source` and renders a bounded, opaque thumbnail.
///
/// Undecodable input is reported as `Err(DecodeFailure)`; the dispatcher
/// turns that into an empty outcome.
pub async fn generate(
    storage: &dyn Storage,
    source: &Path,
    config: &Config,
) -> ThumbResult<GenerationOutcome> {
    let data = storage.read(source).await?;
    let max = config.max_thumb_size;
    let background = config.background;
    let quality = config.quality;
    let format = config.format;

    let encoded = tokio::task::spawn_blocking(move || -> ThumbResult<Vec<u8>> {
        let img = image::load_from_memory(&data)?;
        let thumbnail = render(&img, max, background);
        encode(thumbnail, format, quality)
    })
    .await
    .map_err(|e| ThumbError::DecodeFailure(format!("Thumbnail task failed: {}", e)))??;

    debug!(
        "Rendered {} byte thumbnail for {}",
        encoded.len(),
        source.display()
    );
    Ok(GenerationOutcome::Bytes(encoded))
}

/// Resizes onto a background of `background`, flattening any transparency.
pub fn render(img: &DynamicImage, max: u32, background: [u8; 3]) -> DynamicImage {
    let (width, height) = fit_within(img.width(), img.height(), max);
    let resized = img.resize_exact(width, height, FilterType::Triangle).to_rgba8();

    let [r, g, b] = background;
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));
    imageops::overlay(&mut canvas, &resized, 0, 0);

    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
}

fn encode(img: DynamicImage, format: ThumbnailFormat, quality: u8) -> ThumbResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        ThumbnailFormat::Jpeg => {
            img.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))?
        }
        ThumbnailFormat::Webp => img.write_with_encoder(WebPEncoder::new_lossless(&mut buffer))?,
    }
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use image::{GenericImageView, ImageBuffer};
    use tempfile::TempDir;

    #[test]
    fn test_fit_within_preserves_aspect_ratio() {
        assert_eq!(fit_within(1920, 1080, 512), (512, 288));
        assert_eq!(fit_within(1080, 1920, 512), (288, 512));
        assert_eq!(fit_within(100, 100, 512), (512, 512));
        // 512 * 2 / 3 = 341.33
        assert_eq!(fit_within(300, 200, 512), (512, 341));
        // 512 * 1 / 3 = 170.67
        assert_eq!(fit_within(100, 300, 512), (171, 512));
    }

    #[test]
    fn test_fit_within_never_collapses_short_edge() {
        assert_eq!(fit_within(10000, 1, 512), (512, 1));
        assert_eq!(fit_within(0, 10, 512), (512, 512));
    }

    #[test]
    fn test_render_flattens_transparency_onto_background() {
        let transparent: RgbaImage = ImageBuffer::from_pixel(40, 20, Rgba([0, 0, 0, 0]));
        let img = DynamicImage::ImageRgba8(transparent);

        let rendered = render(&img, 64, [10, 200, 30]);

        assert_eq!(rendered.dimensions(), (64, 32));
        assert!(!rendered.color().has_alpha());
        let Rgba([r, g, b, a]) = rendered.get_pixel(5, 5);
        assert_eq!(a, 255);
        assert!(r.abs_diff(10) <= 1 && g.abs_diff(200) <= 1 && b.abs_diff(30) <= 1);
    }

    #[test]
    fn test_render_keeps_opaque_pixels() {
        let red: RgbaImage = ImageBuffer::from_pixel(8, 8, Rgba([255, 0, 0, 255]));
        let rendered = render(&DynamicImage::ImageRgba8(red), 16, [255, 255, 255]);
        let Rgba([r, g, b, _]) = rendered.get_pixel(8, 8);
        assert!(r >= 250 && g <= 5 && b <= 5);
    }

    #[tokio::test]
    async fn test_generate_encodes_jpeg() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wide.png");
        let img: ImageBuffer<image::Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(200, 100, |_x, _y| image::Rgb([0, 0, 255]));
        img.save(&path).unwrap();

        let config = Config {
            max_thumb_size: 64,
            ..Config::default()
        };
        let outcome = generate(&LocalStorage::new(), &path, &config).await.unwrap();

        let GenerationOutcome::Bytes(bytes) = outcome else {
            panic!("Expected encoded bytes");
        };
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(
            image::guess_format(&bytes).unwrap(),
            image::ImageFormat::Jpeg
        );
        assert_eq!(decoded.dimensions(), (64, 32));
    }

    #[tokio::test]
    async fn test_generate_encodes_webp() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tall.png");
        let img: ImageBuffer<image::Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(30, 90, |_x, _y| image::Rgb([0, 255, 0]));
        img.save(&path).unwrap();

        let config = Config {
            max_thumb_size: 90,
            format: ThumbnailFormat::Webp,
            ..Config::default()
        };
        let GenerationOutcome::Bytes(bytes) =
            generate(&LocalStorage::new(), &path, &config).await.unwrap()
        else {
            panic!("Expected encoded bytes");
        };
        assert_eq!(
            image::guess_format(&bytes).unwrap(),
            image::ImageFormat::WebP
        );
        assert_eq!(
            image::load_from_memory(&bytes).unwrap().dimensions(),
            (30, 90)
        );
    }

    #[test]
    fn test_webp_ignores_quality() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(16, 16, |x, y| {
            image::Rgb([(x * 16) as u8, (y * 16) as u8, 128])
        }));

        let low = encode(img.clone(), ThumbnailFormat::Webp, 5).unwrap();
        let high = encode(img.clone(), ThumbnailFormat::Webp, 100).unwrap();
        assert_eq!(low, high);

        let jpeg_low = encode(img.clone(), ThumbnailFormat::Jpeg, 5).unwrap();
        let jpeg_high = encode(img, ThumbnailFormat::Jpeg, 100).unwrap();
        assert_ne!(jpeg_low, jpeg_high);
    }

    #[tokio::test]
    async fn test_generate_rejects_corrupt_input() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.jpg");
        std::fs::write(&path, b"definitely not an image").unwrap();

        let result = generate(&LocalStorage::new(), &path, &Config::default()).await;
        assert!(matches!(result, Err(ThumbError::DecodeFailure(_))));
    }
}
