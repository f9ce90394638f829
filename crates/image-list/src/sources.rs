//! Image sources backed by files on disk: plain files and archive members

use image_cache::generate::THUMBNAIL_SIZE;
use image_cache::{decode_file, make_thumbnail, Error, ImageSource, Result};
use image::RgbaImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A loose image file
#[derive(Debug, Clone)]
pub struct LocalImage {
    path: PathBuf,
    thumbnail_size: u32,
}

impl LocalImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            thumbnail_size: THUMBNAIL_SIZE,
        }
    }

    pub fn with_thumbnail_size(mut self, size: u32) -> Self {
        self.thumbnail_size = size;
        self
    }
}

impl ImageSource for LocalImage {
    fn path(&self) -> &Path {
        &self.path
    }

    fn load_full(&self) -> Result<RgbaImage> {
        decode_file(&self.path)
    }

    fn load_thumbnail(&self) -> Result<RgbaImage> {
        Ok(make_thumbnail(decode_file(&self.path)?, self.thumbnail_size))
    }
}

/// Unpacks archives into a temporary directory. Extraction itself lives
/// outside this crate; the controller only needs these two capabilities.
pub trait ArchiveExtractor: Send + Sync {
    fn is_archive(&self, path: &Path) -> bool;

    /// Extract `path`; the returned directory is deleted when dropped
    fn extract(&self, path: &Path) -> Result<TempDir>;
}

/// An opened archive, shared by all of its member images. The extracted
/// files are removed once the archive and every member have been dropped.
pub struct Archive {
    path: PathBuf,
    extracted: TempDir,
}

impl Archive {
    pub fn open(path: &Path, extractor: &dyn ArchiveExtractor) -> Result<Arc<Self>> {
        let extracted = extractor.extract(path).map_err(|e| match e {
            Error::SourceUnavailable { .. } => e,
            other => Error::unavailable(path, format!("Failed to extract archive ({})", other)),
        })?;

        Ok(Arc::new(Self {
            path: path.to_path_buf(),
            extracted,
        }))
    }

    /// The archive file itself
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extracted_path(&self) -> &Path {
        self.extracted.path()
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("extracted", &self.extracted.path())
            .finish()
    }
}

/// An image extracted from an archive
#[derive(Debug, Clone)]
pub struct ArchiveImage {
    inner: LocalImage,
    archive: Arc<Archive>,
}

impl ArchiveImage {
    pub fn new(path: impl Into<PathBuf>, archive: Arc<Archive>) -> Self {
        Self {
            inner: LocalImage::new(path),
            archive,
        }
    }

    pub fn with_thumbnail_size(mut self, size: u32) -> Self {
        self.inner = self.inner.with_thumbnail_size(size);
        self
    }

    pub fn archive(&self) -> &Arc<Archive> {
        &self.archive
    }
}

impl ImageSource for ArchiveImage {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn load_full(&self) -> Result<RgbaImage> {
        self.inner.load_full()
    }

    fn load_thumbnail(&self) -> Result<RgbaImage> {
        self.inner.load_thumbnail()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgba;
    use std::fs;
    use tempfile::tempdir;

    pub(crate) fn write_png(path: &Path, width: u32, height: u32) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]))
            .save(path)
            .unwrap();
    }

    /// Treats `*.cbz` files as archives holding a copy of a sibling
    /// `<name>.d` directory.
    pub(crate) struct DirectoryExtractor;

    impl ArchiveExtractor for DirectoryExtractor {
        fn is_archive(&self, path: &Path) -> bool {
            path.extension().and_then(|e| e.to_str()) == Some("cbz")
        }

        fn extract(&self, path: &Path) -> Result<TempDir> {
            let source = path.with_extension("d");
            if !source.is_dir() {
                return Err(Error::unavailable(path, "Failed to extract"));
            }
            let dest = tempdir()?;
            for entry in fs::read_dir(&source)? {
                let entry = entry?;
                fs::copy(entry.path(), dest.path().join(entry.file_name()))?;
            }
            Ok(dest)
        }
    }

    #[test]
    fn test_local_image_loads() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("wide.png");
        write_png(&path, 512, 256);

        let source = LocalImage::new(&path);
        assert_eq!(source.load_full()?.dimensions(), (512, 256));
        assert_eq!(source.load_thumbnail()?.dimensions(), (128, 64));

        let small = LocalImage::new(&path).with_thumbnail_size(32);
        assert_eq!(small.load_thumbnail()?.dimensions(), (32, 16));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let source = LocalImage::new("/definitely/not/here.png");
        assert!(source.load_full().is_err());
        assert!(source.load_thumbnail().is_err());
    }

    #[test]
    fn test_archive_outlives_controller_but_not_members() -> Result<()> {
        let dir = tempdir()?;
        write_png(&dir.path().join("book.d/01.png"), 4, 4);
        fs::write(dir.path().join("book.cbz"), b"")?;

        let archive = Archive::open(&dir.path().join("book.cbz"), &DirectoryExtractor)?;
        let extracted = archive.extracted_path().to_path_buf();
        let member = ArchiveImage::new(extracted.join("01.png"), Arc::clone(&archive));

        drop(archive);
        assert!(extracted.exists());
        assert_eq!(member.load_full()?.dimensions(), (4, 4));

        drop(member);
        assert!(!extracted.exists());
        Ok(())
    }

    #[test]
    fn test_failed_extraction_is_unavailable() {
        let result = Archive::open(Path::new("/nowhere/book.cbz"), &DirectoryExtractor);
        assert!(matches!(result, Err(Error::SourceUnavailable { .. })));
    }
}
