//! Notifications sent from the background pipelines to the single consumer
//!
//! Every event carries the epoch of the collection it was produced for; the
//! consumer drops events whose epoch no longer matches its current collection.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// At least one thumbnail was pushed onto the pending queue
    ThumbnailReady { epoch: u64 },
    /// Every item of every outstanding thumbnail batch has been processed
    AllThumbnailsReady { epoch: u64 },
    /// The window loader finished decoding `index`
    ImageLoaded { epoch: u64, index: usize },
    /// The window loader failed on `index`; the item shows a placeholder
    ImageFailed { epoch: u64, index: usize, message: String },
}

impl CacheEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            CacheEvent::ThumbnailReady { epoch }
            | CacheEvent::AllThumbnailsReady { epoch }
            | CacheEvent::ImageLoaded { epoch, .. }
            | CacheEvent::ImageFailed { epoch, .. } => *epoch,
        }
    }
}
