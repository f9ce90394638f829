//! Windowed prefetch cache and background thumbnail pipeline for Filmstrip
//!
//! This crate keeps a bounded window of decoded full-resolution images resident
//! around the viewer's current position while a separate worker pool streams
//! thumbnails for the whole collection.
//!
//! # Features
//!
//! - **Position-centric window**: `2 * cache_size + 1` slots around the current
//!   index, stretched toward the far side near either end of the collection
//! - **Forward-first priority**: upcoming images load before previous ones
//! - **Exact eviction**: only items leaving the window release their buffers
//! - **Single loader**: recomputing cancels and joins the previous loader
//! - **Thumbnail pool**: four workers feeding a drain-in-one-pass FIFO
//! - **Placeholders**: per-item failures never abort a pipeline

pub mod cancel;
pub mod error;
pub mod events;
pub mod generate;
pub mod item;
pub mod prefetch;
pub mod thumbnails;
pub mod window;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cancel::CancellationToken;
pub use error::{Error, Result};
pub use events::CacheEvent;
pub use generate::{decode_bytes, decode_file, is_image_path, make_thumbnail, missing_placeholder};
pub use item::{FullState, ImageSource, Item, Pixels, Thumbnail};
pub use prefetch::{PrefetchCache, WindowProgress};
pub use thumbnails::{ThumbnailPipeline, ThumbnailProgress, THUMBNAIL_POOL_SIZE};
pub use window::CacheWindow;

use serde::{Deserialize, Serialize};

/// Tunables for the prefetch window and thumbnail decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Neighbours kept loaded on each side of the current image
    pub cache_size: usize,
    /// Long-edge bound for thumbnails, in pixels
    pub thumbnail_size: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_size: 2,
            thumbnail_size: generate::THUMBNAIL_SIZE,
        }
    }
}

/// Cache file name for a remote resource: a hash of the URL plus the URL's
/// own extension, so that any URL maps to a safe, flat file name.
pub fn cache_file_name(url: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let result = hasher.finalize();
    // First 16 bytes (32 hex chars) is plenty for a per-site cache
    let key = hex::encode(&result[..16]);

    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = match path.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => path,
    };
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    match extension {
        Some(ext) => format!("{}.{}", key, ext),
        None => key,
    }
}
