//! The collection controller
//!
//! Owns the ordered items and the current index, and drives both background
//! pipelines from the consumer thread:
//!
//! - `load` / `append` fill the collection and start thumbnails
//! - `set_current` and the navigation helpers move the prefetch window
//! - `clear` cancels and joins both pipelines before dropping the items
//!
//! Pipeline notifications are pumped with [`CollectionController::process_events`]
//! (or [`CollectionController::wait_events`]) and republished to the rendering
//! layer as [`CollectionEvent`]s. Events from a superseded collection are
//! dropped by epoch.

use crate::config::ViewerConfig;
use crate::enumerate::{natural_sort, sibling_archives, Enumerator, FsEnumerator};
use crate::remote::{Fetcher, HttpFetcher, PostEntry, RemoteImage};
use crate::sources::{Archive, ArchiveExtractor, ArchiveImage, LocalImage};
use crossbeam_channel::{unbounded, Receiver, Sender};
use image_cache::{
    is_image_path, CacheEvent, CacheWindow, Error, ImageSource, Item, PrefetchCache, Result,
    Thumbnail, ThumbnailPipeline, ThumbnailProgress, WindowProgress,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Notifications for the rendering layer
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    /// The current item changed
    Changed { index: usize, item: Arc<Item> },
    Cleared,
    ThumbnailReady { index: usize, thumbnail: Thumbnail },
    /// Every thumbnail has been delivered; `index` is the current position
    AllThumbnailsReady { index: usize },
    /// Opening an adjacent archive failed
    ArchiveError(String),
    SizeChanged(usize),
    /// `next()` at the last item with nowhere to advance to
    EndOfList,
    ImageLoaded { index: usize },
    ImageFailed { index: usize, message: String },
}

/// Where to start in a freshly loaded collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Index(usize),
    Last,
}

/// The ordered items, the current index and the archive they came from
#[derive(Debug, Default)]
pub struct Collection {
    items: Vec<Arc<Item>>,
    index: usize,
    archive: Option<Arc<Archive>>,
}

impl Collection {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current index; only meaningful when the collection is non-empty
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&Arc<Item>> {
        self.items.get(self.index)
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Item>> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[Arc<Item>] {
        &self.items
    }

    pub fn archive(&self) -> Option<&Arc<Archive>> {
        self.archive.as_ref()
    }

    pub fn from_archive(&self) -> bool {
        self.archive.is_some()
    }
}

/// A validated, enumerated source ready to replace the current collection
struct Resolved {
    entries: Vec<PathBuf>,
    archive: Option<Arc<Archive>>,
    /// The file the user opened, when it was a single image
    selected: Option<PathBuf>,
}

pub struct CollectionController {
    config: ViewerConfig,
    enumerator: Box<dyn Enumerator>,
    extractor: Option<Box<dyn ArchiveExtractor>>,
    fetcher: Arc<dyn Fetcher>,
    collection: Collection,
    epoch: u64,
    prefetch: PrefetchCache,
    thumbnails: ThumbnailPipeline,
    cache_events: Receiver<CacheEvent>,
    observers: Sender<CollectionEvent>,
}

impl CollectionController {
    /// Create an empty controller and the receiver its events are published on
    pub fn new(config: ViewerConfig) -> (Self, Receiver<CollectionEvent>) {
        let (cache_tx, cache_rx) = unbounded();
        let (observer_tx, observer_rx) = unbounded();

        let controller = Self {
            prefetch: PrefetchCache::new(config.cache.cache_size).with_events(cache_tx.clone()),
            thumbnails: ThumbnailPipeline::new(cache_tx),
            config,
            enumerator: Box::new(FsEnumerator),
            extractor: None,
            fetcher: Arc::new(HttpFetcher::new()),
            collection: Collection::default(),
            epoch: 0,
            cache_events: cache_rx,
            observers: observer_tx,
        };
        (controller, observer_rx)
    }

    pub fn with_enumerator(mut self, enumerator: impl Enumerator + 'static) -> Self {
        self.enumerator = Box::new(enumerator);
        self
    }

    pub fn with_extractor(mut self, extractor: impl ArchiveExtractor + 'static) -> Self {
        self.extractor = Some(Box::new(extractor));
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn window(&self) -> CacheWindow {
        self.prefetch.window()
    }

    pub fn thumbnail_progress(&self) -> ThumbnailProgress {
        self.thumbnails.progress()
    }

    /// Block until the window loader has finished its current window
    pub fn wait_for_window(&self) -> Option<WindowProgress> {
        self.prefetch.wait()
    }

    // -- Loading --

    /// Open a directory, an image file (its directory, positioned at the file)
    /// or an archive. On error the current collection is left untouched.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.load_at(path, Position::Index(0))
    }

    pub fn load_at(&mut self, path: &Path, position: Position) -> Result<()> {
        let resolved = self.resolve(path)?;
        let len = resolved.entries.len();

        let index = match (&resolved.selected, position) {
            (Some(selected), _) => position_of(&resolved.entries, selected).unwrap_or(0),
            (None, Position::Index(i)) => i.min(len - 1),
            (None, Position::Last) => len - 1,
        };

        self.teardown();

        let thumbnail_size = self.config.cache.thumbnail_size;
        let items = resolved
            .entries
            .into_iter()
            .map(|entry| {
                let item = match &resolved.archive {
                    Some(archive) => Item::new(
                        ArchiveImage::new(entry, Arc::clone(archive))
                            .with_thumbnail_size(thumbnail_size),
                    ),
                    None => Item::new(LocalImage::new(entry).with_thumbnail_size(thumbnail_size)),
                };
                Arc::new(item)
            })
            .collect();

        self.collection = Collection {
            items,
            index,
            archive: resolved.archive,
        };
        log::info!("Loaded {} images from {}", len, path.display());

        self.emit(CollectionEvent::SizeChanged(len));
        self.thumbnails
            .start(self.epoch, indexed(&self.collection.items, 0));
        self.set_current_from(index, false);
        Ok(())
    }

    fn resolve(&self, path: &Path) -> Result<Resolved> {
        if !path.exists() {
            return Err(Error::unavailable(path, "File or directory could not be opened"));
        }

        let (dir, mut resolved) = if path.is_dir() {
            let resolved = Resolved {
                entries: list_entries(path, |dir| self.enumerator.list_local_entries(dir))?,
                archive: None,
                selected: None,
            };
            (path.to_path_buf(), resolved)
        } else if is_image_path(path) {
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let resolved = Resolved {
                entries: list_entries(&dir, |dir| self.enumerator.list_local_entries(dir))?,
                archive: None,
                selected: Some(path.to_path_buf()),
            };
            (dir, resolved)
        } else if let Some(extractor) = self.extractor.as_deref().filter(|e| e.is_archive(path)) {
            let archive = Archive::open(path, extractor)?;
            let root = archive.extracted_path().to_path_buf();
            let resolved = Resolved {
                entries: list_entries(&root, |dir| self.enumerator.list_archive_entries(dir))?,
                archive: Some(archive),
                selected: None,
            };
            (path.to_path_buf(), resolved)
        } else {
            return Err(Error::unavailable(path, "File is invalid or not supported"));
        };

        if resolved.entries.is_empty() {
            return Err(Error::unavailable(dir, "No valid image files found"));
        }
        natural_sort(&mut resolved.entries);
        Ok(resolved)
    }

    /// Append items to the collection, e.g. the next page of a remote listing.
    ///
    /// Thumbnails start for the new indices only. The window is left alone
    /// unless the collection was empty, in which case the first item becomes
    /// current.
    pub fn append(&mut self, sources: Vec<Box<dyn ImageSource>>) {
        if sources.is_empty() {
            return;
        }

        let was_empty = self.collection.is_empty();
        if was_empty {
            self.collection.archive = None;
        }

        let start = self.collection.len();
        self.collection
            .items
            .extend(sources.into_iter().map(|s| Arc::new(Item::from_boxed(s))));
        let len = self.collection.len();
        log::debug!("Appended {} items ({} total)", len - start, len);

        self.emit(CollectionEvent::SizeChanged(len));
        self.thumbnails
            .start(self.epoch, indexed(&self.collection.items[start..], start));

        if was_empty {
            self.collection.index = 0;
            self.set_current_from(0, false);
        }
    }

    /// Append resolved remote posts, fetched through the controller's fetcher
    pub fn append_posts(&mut self, posts: Vec<PostEntry>) {
        let thumbnail_size = self.config.cache.thumbnail_size;
        let sources = posts
            .into_iter()
            .map(|post| {
                Box::new(
                    RemoteImage::new(post, Arc::clone(&self.fetcher))
                        .with_thumbnail_size(thumbnail_size),
                ) as Box<dyn ImageSource>
            })
            .collect();
        self.append(sources);
    }

    /// Cancel and join both pipelines, drop every item and reset the index
    pub fn clear(&mut self) {
        self.teardown();
        log::info!("Collection cleared");
        self.emit(CollectionEvent::Cleared);
    }

    fn teardown(&mut self) {
        self.prefetch.shutdown();
        self.thumbnails.cancel_and_join();
        self.collection = Collection::default();
        self.epoch += 1;
    }

    // -- Navigation --

    /// Make `index` current and move the prefetch window there
    pub fn set_current(&mut self, index: usize) -> bool {
        self.set_current_from(index, false)
    }

    /// Selection coming from the rendering widget; re-selecting the current
    /// index is ignored so the widget's own change does not echo back.
    pub fn select(&mut self, index: usize) -> bool {
        self.set_current_from(index, true)
    }

    fn set_current_from(&mut self, index: usize, from_widget: bool) -> bool {
        if index >= self.collection.len() {
            log::warn!(
                "Ignoring out of range index {} (collection has {})",
                index,
                self.collection.len()
            );
            return false;
        }
        if from_widget && index == self.collection.index {
            return false;
        }

        self.collection.index = index;
        let item = Arc::clone(&self.collection.items[index]);
        self.emit(CollectionEvent::Changed { index, item });
        self.prefetch
            .recompute(self.epoch, &self.collection.items, index);
        true
    }

    pub fn next(&mut self) -> bool {
        if self.collection.is_empty() {
            return false;
        }
        if self.collection.index + 1 < self.collection.len() {
            return self.set_current(self.collection.index + 1);
        }
        if self.collection.from_archive() && self.config.auto_open_archive {
            if let Some(moved) = self.open_adjacent_archive(true) {
                if moved {
                    return true;
                }
            }
        }
        self.emit(CollectionEvent::EndOfList);
        false
    }

    pub fn previous(&mut self) -> bool {
        if self.collection.is_empty() {
            return false;
        }
        if self.collection.index > 0 {
            return self.set_current(self.collection.index - 1);
        }
        if self.collection.from_archive() && self.config.auto_open_archive {
            return self.open_adjacent_archive(false).unwrap_or(false);
        }
        false
    }

    pub fn first(&mut self) -> bool {
        !self.collection.is_empty() && self.set_current(0)
    }

    pub fn last(&mut self) -> bool {
        match self.collection.len() {
            0 => false,
            len => self.set_current(len - 1),
        }
    }

    pub fn can_go_next(&self) -> bool {
        self.collection.index + 1 < self.collection.len()
            || (self.collection.from_archive() && self.config.auto_open_archive)
    }

    pub fn can_go_previous(&self) -> bool {
        (!self.collection.is_empty() && self.collection.index > 0)
            || (self.collection.from_archive() && self.config.auto_open_archive)
    }

    /// Open the archive after (or before) the current one. `None` when there
    /// is no adjacent archive; `Some(false)` when opening it failed, which is
    /// reported as an [`CollectionEvent::ArchiveError`].
    fn open_adjacent_archive(&mut self, forward: bool) -> Option<bool> {
        let current = self.collection.archive.as_ref()?.path().to_path_buf();
        let extractor = self.extractor.as_deref()?;

        let siblings = match sibling_archives(&current, extractor) {
            Ok(siblings) => siblings,
            Err(e) => {
                self.emit(CollectionEvent::ArchiveError(e.to_string()));
                return Some(false);
            }
        };
        let pos = position_of(&siblings, &current)?;
        let target = if forward {
            siblings.get(pos + 1)?
        } else {
            siblings.get(pos.checked_sub(1)?)?
        };

        let position = if forward { Position::Index(0) } else { Position::Last };
        match self.load_at(target, position) {
            Ok(()) => Some(true),
            Err(e) => {
                log::warn!("Failed to open adjacent archive: {}", e);
                self.emit(CollectionEvent::ArchiveError(e.to_string()));
                Some(false)
            }
        }
    }

    /// Change the window radius and recompute the window in place
    pub fn set_cache_size(&mut self, cache_size: usize) {
        self.config.cache.cache_size = cache_size;
        self.prefetch.set_cache_size(cache_size);
        if !self.collection.is_empty() {
            self.prefetch
                .recompute(self.epoch, &self.collection.items, self.collection.index);
        }
    }

    // -- Event pump --

    /// Handle every pending pipeline notification without blocking.
    /// Returns the number of notifications handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.cache_events.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for a notification, then handle everything pending
    pub fn wait_events(&mut self, timeout: Duration) -> usize {
        match self.cache_events.recv_timeout(timeout) {
            Ok(event) => {
                self.handle(event);
                1 + self.process_events()
            }
            Err(_) => 0,
        }
    }

    fn handle(&mut self, event: CacheEvent) {
        if event.epoch() != self.epoch {
            return;
        }

        match event {
            CacheEvent::ThumbnailReady { .. } => self.apply_thumbnails(),
            CacheEvent::AllThumbnailsReady { .. } => {
                self.apply_thumbnails();
                self.emit(CollectionEvent::AllThumbnailsReady {
                    index: self.collection.index,
                });
            }
            CacheEvent::ImageLoaded { index, .. } => {
                self.emit(CollectionEvent::ImageLoaded { index });
            }
            CacheEvent::ImageFailed { index, message, .. } => {
                self.emit(CollectionEvent::ImageFailed { index, message });
            }
        }
    }

    /// Drain the pending FIFO in one pass and publish each thumbnail in order
    fn apply_thumbnails(&self) {
        for (index, thumbnail) in self.thumbnails.drain() {
            self.emit(CollectionEvent::ThumbnailReady { index, thumbnail });
        }
    }

    fn emit(&self, event: CollectionEvent) {
        // Nobody listening is fine
        let _ = self.observers.send(event);
    }
}

impl Drop for CollectionController {
    fn drop(&mut self) {
        self.prefetch.shutdown();
        self.thumbnails.cancel_and_join();
    }
}

fn indexed(items: &[Arc<Item>], offset: usize) -> Vec<(usize, Arc<Item>)> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| (offset + i, Arc::clone(item)))
        .collect()
}

/// Listing failures other than an explicit unavailable source become one
fn list_entries(
    dir: &Path,
    list: impl Fn(&Path) -> Result<Vec<PathBuf>>,
) -> Result<Vec<PathBuf>> {
    list(dir).map_err(|e| match e {
        Error::SourceUnavailable { .. } => e,
        other => Error::unavailable(dir, format!("Failed to read directory ({})", other)),
    })
}

/// Index of `target` in `paths`, comparing whole paths first and then file names
fn position_of(paths: &[PathBuf], target: &Path) -> Option<usize> {
    paths.iter().position(|p| p == target).or_else(|| {
        let name = target.file_name()?;
        paths.iter().position(|p| p.file_name() == Some(name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::tests::FakeFetcher;
    use crate::remote::Site;
    use crate::sources::tests::{write_png, DirectoryExtractor};
    use image_cache::testing::{FakeSource, Probe};
    use std::fs;
    use std::thread;
    use std::time::Instant;
    use tempfile::{tempdir, TempDir};

    fn controller(cache_size: usize) -> (CollectionController, Receiver<CollectionEvent>) {
        let mut config = ViewerConfig::default();
        config.cache.cache_size = cache_size;
        CollectionController::new(config)
    }

    fn image_dir(count: usize) -> TempDir {
        let dir = tempdir().unwrap();
        for i in 1..=count {
            write_png(&dir.path().join(format!("img{}.png", i)), 32, 16);
        }
        dir
    }

    fn fakes(ids: std::ops::Range<usize>, probe: &Arc<Probe>) -> Vec<Box<dyn ImageSource>> {
        ids.map(|id| Box::new(FakeSource::new(id, probe)) as Box<dyn ImageSource>)
            .collect()
    }

    /// Pump pipeline events until `done` matches a published event
    fn pump_until(
        controller: &mut CollectionController,
        rx: &Receiver<CollectionEvent>,
        done: impl Fn(&CollectionEvent) -> bool,
    ) -> Vec<CollectionEvent> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            controller.wait_events(Duration::from_millis(20));
            for event in rx.try_iter() {
                let finished = done(&event);
                seen.push(event);
                if finished {
                    return seen;
                }
            }
        }
        panic!("timed out waiting for event; saw {:?}", seen);
    }

    fn all_ready(event: &CollectionEvent) -> bool {
        matches!(event, CollectionEvent::AllThumbnailsReady { .. })
    }

    fn thumbnail_indices(events: &[CollectionEvent]) -> Vec<usize> {
        let mut indices: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                CollectionEvent::ThumbnailReady { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        indices.sort_unstable();
        indices
    }

    fn archive_name(controller: &CollectionController) -> String {
        controller
            .collection()
            .archive()
            .and_then(|a| a.path().file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[test]
    fn test_load_directory_streams_every_thumbnail_once() {
        let dir = image_dir(6);
        let (mut controller, rx) = controller(1);

        controller.load(dir.path()).unwrap();
        let events = pump_until(&mut controller, &rx, all_ready);

        assert!(matches!(events[0], CollectionEvent::SizeChanged(6)));
        assert!(matches!(events[1], CollectionEvent::Changed { index: 0, .. }));
        assert_eq!(thumbnail_indices(&events), (0..6).collect::<Vec<_>>());
        assert_eq!(events.iter().filter(|e| all_ready(e)).count(), 1);

        let collection = controller.collection();
        assert!(!collection.from_archive());
        assert!(collection
            .items()
            .iter()
            .all(|item| matches!(item.thumbnail(), Some(Thumbnail::Ready(_)))));
    }

    #[test]
    fn test_load_file_starts_at_that_file() {
        let dir = image_dir(4);
        let (mut controller, rx) = controller(1);

        controller.load(&dir.path().join("img3.png")).unwrap();
        assert_eq!(controller.collection().len(), 4);
        assert_eq!(controller.collection().index(), 2);
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, CollectionEvent::Changed { index: 2, .. })));

        let current = controller.collection().current().unwrap();
        assert!(current.path().ends_with("img3.png"));
    }

    #[test]
    fn test_failed_load_keeps_current_collection() {
        let dir = image_dir(3);
        let empty = tempdir().unwrap();
        fs::write(empty.path().join("notes.txt"), b"hi").unwrap();
        let (mut controller, _rx) = controller(1);

        controller.load_at(dir.path(), Position::Index(1)).unwrap();

        let missing = controller.load(&dir.path().join("absent"));
        assert!(matches!(missing, Err(Error::SourceUnavailable { .. })));

        let no_images = controller.load(empty.path());
        assert!(matches!(no_images, Err(Error::SourceUnavailable { .. })));

        let unsupported = controller.load(&empty.path().join("notes.txt"));
        assert!(matches!(unsupported, Err(Error::SourceUnavailable { .. })));

        assert_eq!(controller.collection().len(), 3);
        assert_eq!(controller.collection().index(), 1);
    }

    #[test]
    fn test_navigation() {
        let dir = image_dir(3);
        let (mut controller, rx) = controller(1);
        controller.load(dir.path()).unwrap();

        assert!(!controller.can_go_previous());
        assert!(controller.next());
        assert!(controller.next());
        assert_eq!(controller.collection().index(), 2);
        assert!(!controller.can_go_next());

        rx.try_iter().for_each(drop);
        assert!(!controller.next());
        assert_eq!(controller.collection().index(), 2);
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, CollectionEvent::EndOfList)));

        assert!(controller.previous());
        assert_eq!(controller.collection().index(), 1);
        assert!(controller.first());
        assert_eq!(controller.collection().index(), 0);
        assert!(!controller.previous());
        assert!(controller.last());
        assert_eq!(controller.collection().index(), 2);
        assert!(!controller.set_current(3));
    }

    #[test]
    fn test_navigation_on_empty_collection_is_silent() {
        let dir = image_dir(2);
        let (mut controller, rx) = controller(1);
        controller.load(dir.path()).unwrap();
        controller.clear();
        rx.try_iter().for_each(drop);

        assert!(!controller.next());
        assert!(!controller.previous());
        assert!(!controller.first());
        assert!(!controller.last());
        assert!(!controller.can_go_next());
        assert!(!controller.can_go_previous());
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_widget_selection_is_not_echoed() {
        let dir = image_dir(3);
        let (mut controller, rx) = controller(1);
        controller.load(dir.path()).unwrap();
        rx.try_iter().for_each(drop);

        assert!(!controller.select(0));
        assert_eq!(rx.try_iter().count(), 0);

        assert!(controller.select(2));
        let changed: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                CollectionEvent::Changed { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(changed, [2]);
    }

    #[test]
    fn test_moving_releases_only_what_leaves_the_window() {
        let probe = Probe::new();
        let (mut controller, _rx) = controller(2);
        controller.append(fakes(0..11, &probe));
        controller.wait_for_window();

        controller.set_current(4);
        controller.wait_for_window();
        controller.set_current(9);
        controller.wait_for_window();

        for id in 0..=5 {
            assert_eq!(probe.release_count(id), 1, "item {}", id);
        }
        for id in 6..=10 {
            assert_eq!(probe.release_count(id), 0, "item {}", id);
            assert!(controller.collection().get(id).unwrap().is_full_loaded());
        }
        assert_eq!(controller.window().slots(), &[9, 10, 8, 7, 6]);
    }

    #[test]
    fn test_set_cache_size_shrinks_window_in_place() {
        let probe = Probe::new();
        let (mut controller, _rx) = controller(2);
        controller.append(fakes(0..11, &probe));
        controller.set_current(5);
        controller.wait_for_window();
        assert_eq!(probe.release_count(3), 0);
        assert_eq!(probe.release_count(7), 0);

        controller.set_cache_size(1);
        controller.wait_for_window();

        assert_eq!(controller.config().cache.cache_size, 1);
        assert_eq!(controller.window().slots(), &[5, 6, 4]);
        assert_eq!(probe.release_count(3), 1);
        assert_eq!(probe.release_count(7), 1);
        assert_eq!(controller.collection().index(), 5);
    }

    #[test]
    fn test_append_loads_thumbnails_for_new_items_only() {
        let probe = Probe::new();
        let (mut controller, rx) = controller(2);

        controller.append(fakes(0..3, &probe));
        pump_until(&mut controller, &rx, all_ready);
        controller.wait_for_window();
        assert_eq!(probe.full_loads().len(), 3);
        controller.process_events();
        rx.try_iter().for_each(drop);

        controller.append(fakes(3..5, &probe));
        let events = pump_until(&mut controller, &rx, all_ready);

        assert!(matches!(events[0], CollectionEvent::SizeChanged(5)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, CollectionEvent::Changed { .. })));
        assert_eq!(thumbnail_indices(&events), [3, 4]);
        for id in 0..5 {
            assert_eq!(probe.thumbnail_count(id), 1, "item {}", id);
        }
        // The window did not move
        assert_eq!(probe.full_loads().len(), 3);
        assert_eq!(controller.collection().index(), 0);
    }

    #[test]
    fn test_clear_stops_background_work() {
        let probe = Probe::new();
        let (mut controller, rx) = controller(2);
        let slow = (0..40)
            .map(|id| {
                Box::new(FakeSource::new(id, &probe).with_delay(Duration::from_millis(20)))
                    as Box<dyn ImageSource>
            })
            .collect();
        controller.append(slow);
        thread::sleep(Duration::from_millis(30));

        controller.clear();
        let thumbnails = probe.thumbnail_loads().len();
        let fulls = probe.full_loads().len();
        assert!(thumbnails < 40);

        thread::sleep(Duration::from_millis(150));
        assert_eq!(probe.thumbnail_loads().len(), thumbnails);
        assert_eq!(probe.full_loads().len(), fulls);
        assert!(controller.collection().is_empty());
        assert_eq!(controller.collection().index(), 0);

        // Anything produced for the old collection is dropped
        controller.process_events();
        let after: Vec<_> = rx
            .try_iter()
            .skip_while(|e| !matches!(e, CollectionEvent::Cleared))
            .collect();
        assert_eq!(after.len(), 1);
    }

    #[test]
    fn test_archive_auto_advance() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("vol1.d/a.png"), 8, 8);
        write_png(&dir.path().join("vol1.d/b.png"), 8, 8);
        write_png(&dir.path().join("vol2.d/c.png"), 8, 8);
        fs::write(dir.path().join("vol1.cbz"), b"").unwrap();
        fs::write(dir.path().join("vol2.cbz"), b"").unwrap();

        let (controller, rx) = controller(1);
        let mut controller = controller.with_extractor(DirectoryExtractor);

        controller.load(&dir.path().join("vol1.cbz")).unwrap();
        assert!(controller.collection().from_archive());
        assert_eq!(controller.collection().len(), 2);
        assert!(controller.can_go_previous());

        assert!(controller.next());
        assert!(controller.next());
        assert_eq!(archive_name(&controller), "vol2.cbz");
        assert_eq!(controller.collection().index(), 0);
        assert_eq!(controller.collection().len(), 1);

        assert!(controller.previous());
        assert_eq!(archive_name(&controller), "vol1.cbz");
        assert_eq!(controller.collection().index(), 1);

        controller.last();
        controller.next();
        rx.try_iter().for_each(drop);
        assert!(!controller.next());
        assert_eq!(archive_name(&controller), "vol2.cbz");
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, CollectionEvent::EndOfList)));
    }

    #[test]
    fn test_broken_adjacent_archive_reports_error() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("vol1.d/a.png"), 8, 8);
        fs::write(dir.path().join("vol1.cbz"), b"").unwrap();
        // No vol2.d, so extraction fails
        fs::write(dir.path().join("vol2.cbz"), b"").unwrap();

        let (controller, rx) = controller(1);
        let mut controller = controller.with_extractor(DirectoryExtractor);
        controller.load(&dir.path().join("vol1.cbz")).unwrap();
        rx.try_iter().for_each(drop);

        assert!(!controller.next());
        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events[0], CollectionEvent::ArchiveError(_)));
        assert!(matches!(events[1], CollectionEvent::EndOfList));
        assert_eq!(archive_name(&controller), "vol1.cbz");
        assert_eq!(controller.collection().len(), 1);
    }

    #[test]
    fn test_auto_open_disabled_stays_in_archive() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("vol1.d/a.png"), 8, 8);
        write_png(&dir.path().join("vol2.d/b.png"), 8, 8);
        fs::write(dir.path().join("vol1.cbz"), b"").unwrap();
        fs::write(dir.path().join("vol2.cbz"), b"").unwrap();

        let config = ViewerConfig {
            auto_open_archive: false,
            ..ViewerConfig::default()
        };
        let (controller, rx) = CollectionController::new(config);
        let mut controller = controller.with_extractor(DirectoryExtractor);
        controller.load(&dir.path().join("vol1.cbz")).unwrap();

        assert!(!controller.can_go_next());
        assert!(!controller.next());
        assert_eq!(archive_name(&controller), "vol1.cbz");
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, CollectionEvent::EndOfList)));
    }

    #[test]
    fn test_remote_posts() {
        let dir = tempdir().unwrap();
        let site = Site::new("demo", "https://example.org", dir.path());
        let posts = vec![
            PostEntry::resolve(&site, "/t/1.png", "/f/1.png", "sky"),
            PostEntry::resolve(&site, "/t/2.png", "/f/2.png", "sea"),
        ];
        let fetcher = Arc::new(FakeFetcher::default());

        let (controller, rx) = controller(1);
        let mut controller = controller.with_fetcher(fetcher.clone());
        controller.append_posts(posts);
        pump_until(&mut controller, &rx, all_ready);
        controller.wait_for_window();

        for item in controller.collection().items() {
            let thumbnail = item.thumbnail().unwrap();
            assert!(!thumbnail.is_missing());
            assert_eq!(thumbnail.pixels().dimensions(), (128, 64));
            assert!(item.is_full_loaded());
        }
        // Two thumbnails and two full images
        assert_eq!(fetcher.call_count(), 4);
    }
}
