//! Windowed prefetch of full-resolution images
//!
//! On every position change the cache computes the new [`CacheWindow`], cancels
//! and joins the running loader, releases the items that fell out of the
//! window, and starts a fresh loader that walks the new window in priority
//! order. At most one loader thread exists at any time: the whole
//! recompute sequence runs under one lock.

use crate::cancel::CancellationToken;
use crate::events::CacheEvent;
use crate::item::Item;
use crate::window::CacheWindow;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

/// Progress of the current window load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowProgress {
    pub total: usize,
    pub loaded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub is_cancelled: bool,
    pub is_finished: bool,
}

impl WindowProgress {
    pub fn completion_percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            ((self.loaded + self.failed + self.skipped) as f64 / self.total as f64) * 100.0
        }
    }
}

/// Keeps the full buffers of the window around the current index resident
pub struct PrefetchCache {
    token: CancellationToken,
    events: Option<Sender<CacheEvent>>,
    state: Mutex<PrefetchState>,
}

struct PrefetchState {
    cache_size: usize,
    /// Intended membership of the last computed window
    window: CacheWindow,
    job: Option<LoaderHandle>,
}

struct LoaderHandle {
    progress: Arc<Mutex<WindowProgress>>,
    thread: thread::JoinHandle<()>,
}

impl PrefetchCache {
    pub fn new(cache_size: usize) -> Self {
        Self {
            token: CancellationToken::new(),
            events: None,
            state: Mutex::new(PrefetchState {
                cache_size,
                window: CacheWindow::default(),
                job: None,
            }),
        }
    }

    /// Report per-item results on `events`
    pub fn with_events(mut self, events: Sender<CacheEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn cache_size(&self) -> usize {
        self.state.lock().cache_size
    }

    /// Change the radius; takes effect on the next [`recompute`](Self::recompute)
    pub fn set_cache_size(&self, cache_size: usize) {
        self.state.lock().cache_size = cache_size;
    }

    /// The window as of the last recompute
    pub fn window(&self) -> CacheWindow {
        self.state.lock().window.clone()
    }

    /// Move the window to `index` and start loading it.
    ///
    /// Cancels and joins the previous loader (bounded by one in-flight item),
    /// calls `release_full` on every item that left the window, then spawns a
    /// new loader. Returns the evicted indices.
    pub fn recompute(&self, epoch: u64, items: &[Arc<Item>], index: usize) -> Vec<usize> {
        let mut state = self.state.lock();

        let window = CacheWindow::compute(index, state.cache_size, items.len());
        let evicted = state.window.evicted_by(&window);

        self.cancel_job(&mut state);

        for &i in &evicted {
            if let Some(item) = items.get(i) {
                item.release_full();
            }
        }

        log::debug!(
            "Cache window at {}: {:?} (evicted {:?})",
            index,
            window.slots(),
            evicted
        );

        if !window.is_empty() {
            let targets: Vec<(usize, Arc<Item>)> = window
                .slots()
                .iter()
                .filter_map(|&i| items.get(i).map(|item| (i, Arc::clone(item))))
                .collect();
            state.job = Some(self.spawn_loader(epoch, targets));
        }

        state.window = window;
        evicted
    }

    /// Cancel and join the running loader and forget the window. Items are not
    /// released; the caller is about to drop them.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        self.cancel_job(&mut state);
        state.window = CacheWindow::default();
    }

    /// Block until the current loader has visited its whole window
    pub fn wait(&self) -> Option<WindowProgress> {
        let mut state = self.state.lock();
        let job = state.job.take()?;
        if job.thread.join().is_err() {
            log::error!("Window loader thread panicked");
        }
        let progress = job.progress.lock().clone();
        Some(progress)
    }

    pub fn progress(&self) -> Option<WindowProgress> {
        let state = self.state.lock();
        state.job.as_ref().map(|job| job.progress.lock().clone())
    }

    pub fn is_loading(&self) -> bool {
        let state = self.state.lock();
        state
            .job
            .as_ref()
            .map(|job| !job.thread.is_finished())
            .unwrap_or(false)
    }

    fn cancel_job(&self, state: &mut PrefetchState) {
        if let Some(job) = state.job.take() {
            self.token.cancel();
            job.progress.lock().is_cancelled = true;

            if job.thread.join().is_err() {
                log::error!("Window loader thread panicked");
            }
        }
        self.token.reset();
    }

    fn spawn_loader(&self, epoch: u64, targets: Vec<(usize, Arc<Item>)>) -> LoaderHandle {
        let progress = Arc::new(Mutex::new(WindowProgress {
            total: targets.len(),
            ..WindowProgress::default()
        }));

        let token = self.token.clone();
        let events = self.events.clone();
        let progress_clone = Arc::clone(&progress);

        let thread = thread::spawn(move || {
            load_window(epoch, targets, token, events, progress_clone);
        });

        LoaderHandle { progress, thread }
    }
}

impl Drop for PrefetchCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Loader body: visit the window strictly in priority order, one item at a
/// time, checking for cancellation before each item.
fn load_window(
    epoch: u64,
    targets: Vec<(usize, Arc<Item>)>,
    token: CancellationToken,
    events: Option<Sender<CacheEvent>>,
    progress: Arc<Mutex<WindowProgress>>,
) {
    let send = |event: CacheEvent| {
        if let Some(tx) = &events {
            let _ = tx.send(event);
        }
    };

    for (index, item) in targets {
        if token.is_cancelled() {
            break;
        }

        if item.is_full_loaded() {
            progress.lock().skipped += 1;
            continue;
        }

        match item.load_full() {
            Ok(_) => {
                progress.lock().loaded += 1;
                send(CacheEvent::ImageLoaded { epoch, index });
            }
            Err(e) => {
                log::warn!("Failed to load {}: {}", item.path().display(), e);
                progress.lock().failed += 1;
                send(CacheEvent::ImageFailed {
                    epoch,
                    index,
                    message: e.to_string(),
                });
            }
        }
    }

    let mut progress = progress.lock();
    progress.is_finished = true;
    progress.is_cancelled = token.is_cancelled();
}
