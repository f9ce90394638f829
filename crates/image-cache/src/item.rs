//! Collection items and the image source capability they wrap
//!
//! An [`Item`] owns two independent buffer slots, each behind its own mutex:
//! the full-resolution buffer (written only by the window loader and released
//! by the controller after the loader has been joined) and the thumbnail
//! (written only by the thumbnail pool, one worker per item). Decoding happens
//! outside the locks; a slot is locked only to swap its state.

use crate::error::{Error, Result};
use crate::generate::missing_placeholder;
use image::RgbaImage;
use parking_lot::Mutex;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Shared handle to a decoded RGBA buffer
pub type Pixels = Arc<RgbaImage>;

/// Something that can produce a full image and a thumbnail for one collection
/// member: a local file, an archive member, or a remote post.
///
/// `load_full` and `load_thumbnail` may block on disk or network I/O and are
/// only ever called from background threads.
pub trait ImageSource: Send + Sync {
    fn path(&self) -> &Path;

    fn load_full(&self) -> Result<RgbaImage>;

    fn load_thumbnail(&self) -> Result<RgbaImage>;

    /// Called after the item's full buffer has been dropped, so the source can
    /// free anything it keeps alongside it.
    fn release_full(&self) {}
}

/// State of an item's full-resolution slot
#[derive(Clone, Default)]
pub enum FullState {
    #[default]
    Unloaded,
    Loaded(Pixels),
    /// The last load failed; the viewer shows nothing for this slot
    Placeholder,
}

/// A thumbnail ready to be applied to the rendering model
#[derive(Clone)]
pub enum Thumbnail {
    Ready(Pixels),
    /// Loading failed; render the shared placeholder
    Missing,
}

impl Thumbnail {
    pub fn pixels(&self) -> Pixels {
        match self {
            Thumbnail::Ready(pixels) => pixels.clone(),
            Thumbnail::Missing => missing_placeholder(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Thumbnail::Missing)
    }
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Thumbnail::Ready(p) => write!(f, "Thumbnail::Ready({}x{})", p.width(), p.height()),
            Thumbnail::Missing => write!(f, "Thumbnail::Missing"),
        }
    }
}

/// One member of a collection
pub struct Item {
    source: Box<dyn ImageSource>,
    full: Mutex<FullState>,
    thumbnail: Mutex<Option<Thumbnail>>,
}

impl Item {
    pub fn new(source: impl ImageSource + 'static) -> Self {
        Self::from_boxed(Box::new(source))
    }

    pub fn from_boxed(source: Box<dyn ImageSource>) -> Self {
        Self {
            source,
            full: Mutex::new(FullState::Unloaded),
            thumbnail: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn source(&self) -> &dyn ImageSource {
        self.source.as_ref()
    }

    pub fn full_state(&self) -> FullState {
        self.full.lock().clone()
    }

    /// The decoded full image, if currently resident
    pub fn full(&self) -> Option<Pixels> {
        match &*self.full.lock() {
            FullState::Loaded(pixels) => Some(pixels.clone()),
            _ => None,
        }
    }

    pub fn is_full_loaded(&self) -> bool {
        matches!(*self.full.lock(), FullState::Loaded(_))
    }

    /// Load the full buffer unless already resident. On failure the slot is
    /// left in [`FullState::Placeholder`] and the error is returned.
    pub fn load_full(&self) -> Result<Pixels> {
        if let Some(pixels) = self.full() {
            return Ok(pixels);
        }

        match self.source.load_full() {
            Ok(img) => {
                let pixels = Arc::new(img);
                *self.full.lock() = FullState::Loaded(pixels.clone());
                Ok(pixels)
            }
            Err(e) => {
                *self.full.lock() = FullState::Placeholder;
                Err(e)
            }
        }
    }

    /// Drop the full buffer. Thumbnail state is untouched.
    pub fn release_full(&self) {
        *self.full.lock() = FullState::Unloaded;
        self.source.release_full();
    }

    pub fn thumbnail(&self) -> Option<Thumbnail> {
        self.thumbnail.lock().clone()
    }

    /// Load the thumbnail, substituting [`Thumbnail::Missing`] on failure.
    /// An already loaded thumbnail is returned as-is.
    pub fn load_thumbnail(&self) -> Thumbnail {
        if let Some(thumb) = self.thumbnail() {
            return thumb;
        }

        let thumb = match self.source.load_thumbnail() {
            Ok(img) => Thumbnail::Ready(Arc::new(img)),
            Err(Error::Cancelled) => return Thumbnail::Missing,
            Err(e) => {
                log::warn!("Thumbnail failed for {}: {}", self.path().display(), e);
                Thumbnail::Missing
            }
        };

        *self.thumbnail.lock() = Some(thumb.clone());
        thumb
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = match &*self.full.lock() {
            FullState::Unloaded => "unloaded",
            FullState::Loaded(_) => "loaded",
            FullState::Placeholder => "placeholder",
        };
        f.debug_struct("Item")
            .field("path", &self.path())
            .field("full", &full)
            .field("thumbnail", &*self.thumbnail.lock())
            .finish()
    }
}
