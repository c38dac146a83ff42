use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

/// Longest edge sent to the model.
pub const MAX_EDGE: u32 = 640;

pub const JPEG_QUALITY: u8 = 85;

/// Decode a downloaded picture, force RGB, shrink to fit `MAX_EDGE` and
/// re-encode as base64 JPEG.
///
/// CPU-bound; call from `spawn_blocking`.
pub fn normalize_file(path: &Path) -> Result<String, ImageError> {
    let bytes = std::fs::read(path)?;
    normalize_bytes(&bytes)
}

pub fn normalize_bytes(bytes: &[u8]) -> Result<String, ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let mut rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

    if rgb.width().max(rgb.height()) > MAX_EDGE {
        // `resize` keeps the aspect ratio and fits within the bounds.
        rgb = rgb.resize(MAX_EDGE, MAX_EDGE, FilterType::Lanczos3);
    }

    let rgb = rgb.into_rgb8();
    let mut jpeg = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&rgb)?;

    Ok(base64::engine::general_purpose::STANDARD.encode(jpeg.into_inner()))
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode or encode image: {0}")]
    Codec(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 128]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn decode_b64(encoded: &str) -> DynamicImage {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn test_large_image_is_bounded_preserving_aspect() {
        let out = decode_b64(&normalize_bytes(&png_bytes(1280, 320)).unwrap());
        assert_eq!(out.dimensions(), (640, 160));
        assert_eq!(out.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn test_small_image_keeps_size() {
        let out = decode_b64(&normalize_bytes(&png_bytes(100, 60)).unwrap());
        assert_eq!(out.dimensions(), (100, 60));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            normalize_bytes(b"definitely not an image"),
            Err(ImageError::Codec(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            normalize_file(Path::new("/nonexistent/pic.jpg")),
            Err(ImageError::Io(_))
        ));
    }
}
