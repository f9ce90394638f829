//! Decoding helpers shared by every image source variant
//!
//! Full images are decoded to RGBA8; thumbnails are the same decode resized to
//! fit a square bound while preserving aspect ratio. A failed thumbnail is
//! replaced by a fixed "missing" placeholder image.

use crate::error::{Error, Result};
use image::{DynamicImage, GenericImageView, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Default long-edge bound for thumbnails, in pixels
pub const THUMBNAIL_SIZE: u32 = 128;

/// File extensions the default decoders can load
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tga", "tiff", "tif", "webp", "ico", "pnm", "pbm",
    "pgm", "ppm", "qoi",
];

/// Whether a path has a loadable image extension (case-insensitive)
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode an image file from disk
pub fn decode_file(path: &Path) -> Result<RgbaImage> {
    let img = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| Error::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(img.to_rgba8())
}

/// Decode an in-memory image; `origin` is only used for error reporting
pub fn decode_bytes(bytes: &[u8], origin: &Path) -> Result<RgbaImage> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()
        .map_err(|e| Error::Decode {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(img.to_rgba8())
}

/// Shrink an image to fit within `max_dim` on its long edge. Never upscales.
pub fn make_thumbnail(img: RgbaImage, max_dim: u32) -> RgbaImage {
    let img = DynamicImage::ImageRgba8(img);
    let (width, height) = img.dimensions();
    let max_existing = width.max(height);

    if max_existing <= max_dim {
        return img.to_rgba8();
    }

    let ratio = max_dim as f64 / max_existing as f64;
    let new_width = ((width as f64 * ratio).round() as u32).max(1);
    let new_height = ((height as f64 * ratio).round() as u32).max(1);

    img.resize_exact(new_width, new_height, image::imageops::FilterType::Triangle)
        .to_rgba8()
}

/// The shared "missing" thumbnail: a grey tile crossed by a darker diagonal
pub fn missing_placeholder() -> Arc<RgbaImage> {
    static PLACEHOLDER: OnceLock<Arc<RgbaImage>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| {
            let size = THUMBNAIL_SIZE;
            let img = RgbaImage::from_fn(size, size, |x, y| {
                if x == y || x + y + 1 == size {
                    Rgba([96, 96, 96, 255])
                } else {
                    Rgba([160, 160, 160, 255])
                }
            });
            Arc::new(img)
        })
        .clone()
}
