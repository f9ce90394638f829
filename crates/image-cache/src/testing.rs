//! In-memory image sources that record every call, for tests
//!
//! A [`Probe`] is shared by all fake sources of one test and records the
//! order of loads, release counts and the peak number of concurrent full
//! and thumbnail loads.

use crate::error::{Error, Result};
use crate::item::{ImageSource, Item};
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Probe {
    full_loads: Mutex<Vec<usize>>,
    thumbnail_loads: Mutex<Vec<usize>>,
    releases: Mutex<HashMap<usize, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    thumbnails_in_flight: AtomicUsize,
    max_thumbnails_in_flight: AtomicUsize,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ids of completed full loads, in completion order
    pub fn full_loads(&self) -> Vec<usize> {
        self.full_loads.lock().clone()
    }

    /// Ids of completed thumbnail loads, in completion order
    pub fn thumbnail_loads(&self) -> Vec<usize> {
        self.thumbnail_loads.lock().clone()
    }

    pub fn thumbnail_count(&self, id: usize) -> usize {
        self.thumbnail_loads.lock().iter().filter(|&&i| i == id).count()
    }

    pub fn release_count(&self, id: usize) -> usize {
        self.releases.lock().get(&id).copied().unwrap_or(0)
    }

    pub fn total_releases(&self) -> usize {
        self.releases.lock().values().sum()
    }

    /// Highest number of `load_full` calls observed running at once
    pub fn max_concurrent_full_loads(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of `load_thumbnail` calls observed running at once
    pub fn max_concurrent_thumbnail_loads(&self) -> usize {
        self.max_thumbnails_in_flight.load(Ordering::SeqCst)
    }
}

/// A source that synthesises a tiny image, optionally slowly or failing
#[derive(Debug)]
pub struct FakeSource {
    id: usize,
    path: PathBuf,
    probe: Arc<Probe>,
    delay: Duration,
    fail_full: bool,
    fail_thumbnail: bool,
}

impl FakeSource {
    pub fn new(id: usize, probe: &Arc<Probe>) -> Self {
        Self {
            id,
            path: PathBuf::from(format!("fake/{id:04}.png")),
            probe: Arc::clone(probe),
            delay: Duration::ZERO,
            fail_full: false,
            fail_thumbnail: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_full(mut self) -> Self {
        self.fail_full = true;
        self
    }

    pub fn failing_thumbnail(mut self) -> Self {
        self.fail_thumbnail = true;
        self
    }

    fn pixel(&self) -> Rgba<u8> {
        Rgba([(self.id % 256) as u8, 0, 0, 255])
    }
}

impl ImageSource for FakeSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn load_full(&self) -> Result<RgbaImage> {
        let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.probe.full_loads.lock().push(self.id);

        if self.fail_full {
            return Err(Error::Decode {
                path: self.path.clone(),
                message: "synthetic failure".into(),
            });
        }
        Ok(RgbaImage::from_pixel(4, 4, self.pixel()))
    }

    fn load_thumbnail(&self) -> Result<RgbaImage> {
        let now = self.probe.thumbnails_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe
            .max_thumbnails_in_flight
            .fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.probe.thumbnails_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.probe.thumbnail_loads.lock().push(self.id);

        if self.fail_thumbnail {
            return Err(Error::Fetch {
                url: format!("https://example.invalid/{}", self.id),
                message: "synthetic failure".into(),
            });
        }
        Ok(RgbaImage::from_pixel(2, 2, self.pixel()))
    }

    fn release_full(&self) {
        *self.probe.releases.lock().entry(self.id).or_default() += 1;
    }
}

/// `count` fake items with ids `0..count`
pub fn fake_items(count: usize, probe: &Arc<Probe>) -> Vec<Arc<Item>> {
    fake_items_with(count, probe, |source| source)
}

/// Like [`fake_items`], letting the caller adjust each source
pub fn fake_items_with(
    count: usize,
    probe: &Arc<Probe>,
    configure: impl Fn(FakeSource) -> FakeSource,
) -> Vec<Arc<Item>> {
    (0..count)
        .map(|id| Arc::new(Item::new(configure(FakeSource::new(id, probe)))))
        .collect()
}
