//! Remote (image-board) collections
//!
//! A post list is parsed elsewhere; each post arrives here as a thumbnail URL,
//! a full-image URL and a tag string. [`PostEntry::resolve`] turns that into
//! absolute URLs plus the local cache paths the files are persisted under, and
//! [`RemoteImage`] serves both from the cache, fetching on a miss.

use image_cache::generate::THUMBNAIL_SIZE;
use image_cache::{cache_file_name, decode_bytes, decode_file, make_thumbnail, Error, ImageSource, Result};
use image::RgbaImage;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Fetches a single remote resource
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP fetcher
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            agent: ureq::agent(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let fetch_error = |message: String| Error::Fetch {
            url: url.to_string(),
            message,
        };

        let resp = self
            .agent
            .get(url)
            .set("User-Agent", concat!("filmstrip/", env!("CARGO_PKG_VERSION")))
            .call()
            .map_err(|e| fetch_error(e.to_string()))?;

        let mut bytes = Vec::new();
        resp.into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| fetch_error(e.to_string()))?;
        Ok(bytes)
    }
}

/// A remote site and the local directory its files are cached in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub name: String,
    /// Base URL without a trailing slash, e.g. `https://example.org`
    pub url: String,
    pub cache_dir: PathBuf,
}

impl Site {
    pub fn new(name: impl Into<String>, url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            url: url.into().trim_end_matches('/').to_string(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Cache under the user's cache directory, `<cache>/filmstrip/<name>`
    pub fn with_default_cache(name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("filmstrip")
            .join(&name);
        Self::new(name, url, cache_dir)
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with("//") {
            format!("https:{}", url)
        } else if url.starts_with('/') {
            format!("{}{}", self.url, url)
        } else {
            url.to_string()
        }
    }
}

/// One post of a remote listing, with resolved URLs and cache paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostEntry {
    pub thumbnail_url: String,
    pub thumbnail_path: PathBuf,
    pub full_url: String,
    pub full_path: PathBuf,
    pub tags: Vec<String>,
}

impl PostEntry {
    /// Resolve a parsed post against its site. Root-relative URLs are prefixed
    /// with the site URL; tags are whitespace separated.
    pub fn resolve(site: &Site, thumbnail_url: &str, full_url: &str, tags: &str) -> Self {
        let thumbnail_url = site.absolute(thumbnail_url);
        let full_url = site.absolute(full_url);

        Self {
            thumbnail_path: site
                .cache_dir
                .join("thumbnails")
                .join(cache_file_name(&thumbnail_url)),
            full_path: site.cache_dir.join(cache_file_name(&full_url)),
            thumbnail_url,
            full_url,
            tags: tags.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// An image served from a remote site, persisted to disk on first fetch
pub struct RemoteImage {
    post: PostEntry,
    fetcher: Arc<dyn Fetcher>,
    thumbnail_size: u32,
}

impl RemoteImage {
    pub fn new(post: PostEntry, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            post,
            fetcher,
            thumbnail_size: THUMBNAIL_SIZE,
        }
    }

    pub fn with_thumbnail_size(mut self, size: u32) -> Self {
        self.thumbnail_size = size;
        self
    }

    pub fn post(&self) -> &PostEntry {
        &self.post
    }

    pub fn tags(&self) -> &[String] {
        &self.post.tags
    }

    /// Decode from the cache file if present, otherwise fetch, persist, decode.
    fn load_cached(&self, url: &str, path: &Path) -> Result<RgbaImage> {
        if path.is_file() {
            match decode_file(path) {
                Ok(img) => return Ok(img),
                Err(e) => log::warn!("Discarding unreadable cache file {}: {}", path.display(), e),
            }
        }

        let bytes = self.fetcher.fetch(url)?;
        let img = decode_bytes(&bytes, path)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Err(e) = fs::write(path, &bytes) {
            log::warn!("Failed to cache {} at {}: {}", url, path.display(), e);
        }
        Ok(img)
    }
}

impl ImageSource for RemoteImage {
    fn path(&self) -> &Path {
        &self.post.full_path
    }

    fn load_full(&self) -> Result<RgbaImage> {
        self.load_cached(&self.post.full_url, &self.post.full_path)
    }

    fn load_thumbnail(&self) -> Result<RgbaImage> {
        let img = self.load_cached(&self.post.thumbnail_url, &self.post.thumbnail_path)?;
        Ok(make_thumbnail(img, self.thumbnail_size))
    }
}
