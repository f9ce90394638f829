//! Background thumbnail pipeline
//!
//! The pipeline owns one fixed-size rayon pool for its whole lifetime; every
//! [`ThumbnailPipeline::start`] call queues one task per item on it, so
//! overlapping batches (an incremental append while an earlier page is still
//! loading) share the same [`THUMBNAIL_POOL_SIZE`] workers. A finished task
//! pushes `(index, thumbnail)` onto a mutex-guarded FIFO and sends a
//! [`CacheEvent::ThumbnailReady`]; the consumer drains the whole FIFO in one pass
//! on its own turn, so many completions may coalesce into one batch. When the
//! last outstanding item finishes, [`CacheEvent::AllThumbnailsReady`] is sent
//! exactly once.
//!
//! Cancellation stops tasks from starting; an item already in flight finishes
//! normally. [`ThumbnailPipeline::cancel_and_join`] returns only after every
//! queued task has run or been skipped.

use crate::cancel::CancellationToken;
use crate::events::CacheEvent;
use crate::item::{Item, Thumbnail};
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Number of thumbnail worker threads
pub const THUMBNAIL_POOL_SIZE: usize = 4;

/// Thumbnails produced by workers and not yet applied by the consumer
pub type PendingThumbnails = VecDeque<(usize, Thumbnail)>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThumbnailProgress {
    pub total: usize,
    pub completed: usize,
}

impl ThumbnailProgress {
    pub fn completion_percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }
}

pub struct ThumbnailPipeline {
    /// `None` only if the pool could not be built; items then load on one
    /// fallback thread per batch
    pool: Option<rayon::ThreadPool>,
    token: CancellationToken,
    events: Sender<CacheEvent>,
    shared: Arc<Shared>,
}

struct Shared {
    queue: Mutex<PendingThumbnails>,
    /// Items queued and not yet finished, across all batches
    outstanding: Mutex<usize>,
    idle: Condvar,
    total: AtomicUsize,
    completed: AtomicUsize,
}

impl Shared {
    /// Mark one item finished; the last one wakes joiners and reports all-ready
    fn finish(&self, epoch: u64, token: &CancellationToken, events: &Sender<CacheEvent>) {
        let mut outstanding = self.outstanding.lock();
        *outstanding -= 1;
        if *outstanding == 0 {
            self.idle.notify_all();
            if !token.is_cancelled() {
                let _ = events.send(CacheEvent::AllThumbnailsReady { epoch });
            }
        }
    }
}

impl ThumbnailPipeline {
    pub fn new(events: Sender<CacheEvent>) -> Self {
        Self::with_pool_size(events, THUMBNAIL_POOL_SIZE)
    }

    pub fn with_pool_size(events: Sender<CacheEvent>, pool_size: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(pool_size.max(1))
            .thread_name(|i| format!("thumbnail-{}", i))
            .build();
        let pool = match pool {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::error!("Failed to build thumbnail pool, loading sequentially: {}", e);
                None
            }
        };

        Self {
            pool,
            token: CancellationToken::new(),
            events,
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                outstanding: Mutex::new(0),
                idle: Condvar::new(),
                total: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue thumbnails for `items`, given as `(collection index, item)`.
    ///
    /// Batches may overlap; each index must belong to exactly one batch. An
    /// empty batch with nothing else outstanding reports all-ready at once.
    pub fn start(&self, epoch: u64, items: Vec<(usize, Arc<Item>)>) {
        {
            let mut outstanding = self.shared.outstanding.lock();
            if *outstanding == 0 {
                self.token.reset();
                if items.is_empty() {
                    let _ = self.events.send(CacheEvent::AllThumbnailsReady { epoch });
                    return;
                }
            }
            *outstanding += items.len();
        }
        self.shared.total.fetch_add(items.len(), Ordering::Relaxed);

        match &self.pool {
            Some(pool) => {
                for (index, item) in items {
                    let token = self.token.clone();
                    let events = self.events.clone();
                    let shared = Arc::clone(&self.shared);
                    pool.spawn(move || {
                        load_one(epoch, index, item, &token, &events, &shared);
                        shared.finish(epoch, &token, &events);
                    });
                }
            }
            None => {
                let token = self.token.clone();
                let events = self.events.clone();
                let shared = Arc::clone(&self.shared);
                thread::spawn(move || {
                    for (index, item) in items {
                        load_one(epoch, index, item, &token, &events, &shared);
                        shared.finish(epoch, &token, &events);
                    }
                });
            }
        }
    }

    /// Take every pending thumbnail, oldest first
    pub fn drain(&self) -> Vec<(usize, Thumbnail)> {
        self.shared.queue.lock().drain(..).collect()
    }

    /// Stop starting new items, wait for in-flight ones, and discard anything
    /// not yet applied.
    pub fn cancel_and_join(&self) {
        self.token.cancel();

        {
            let mut outstanding = self.shared.outstanding.lock();
            while *outstanding > 0 {
                self.shared.idle.wait(&mut outstanding);
            }
        }

        self.shared.queue.lock().clear();
        self.shared.total.store(0, Ordering::Relaxed);
        self.shared.completed.store(0, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        *self.shared.outstanding.lock() > 0
    }

    pub fn progress(&self) -> ThumbnailProgress {
        ThumbnailProgress {
            total: self.shared.total.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ThumbnailPipeline {
    fn drop(&mut self) {
        self.cancel_and_join();
    }
}

/// Load one thumbnail unless cancelled. Takes the item by value so the worker
/// holds no reference to it once the item is counted as finished.
fn load_one(
    epoch: u64,
    index: usize,
    item: Arc<Item>,
    token: &CancellationToken,
    events: &Sender<CacheEvent>,
    shared: &Shared,
) {
    if token.is_cancelled() {
        return;
    }

    let thumb = item.load_thumbnail();
    drop(item);
    shared.queue.lock().push_back((index, thumb));
    shared.completed.fetch_add(1, Ordering::Relaxed);

    if !token.is_cancelled() {
        let _ = events.send(CacheEvent::ThumbnailReady { epoch });
    }
}
