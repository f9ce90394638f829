//! Image collections for Filmstrip
//!
//! A collection is an ordered list of images opened from a folder, an archive
//! or a remote post listing. [`CollectionController`] owns it, tracks the
//! current position, and keeps the prefetch window and thumbnail pipeline from
//! `image-cache` in step with navigation.

pub mod config;
pub mod controller;
pub mod enumerate;
pub mod remote;
pub mod sources;

pub use config::{ConfigError, ViewerConfig};
pub use controller::{Collection, CollectionController, CollectionEvent, Position};
pub use enumerate::{natural_cmp, natural_sort, sibling_archives, Enumerator, FsEnumerator};
pub use remote::{Fetcher, HttpFetcher, PostEntry, RemoteImage, Site};
pub use sources::{Archive, ArchiveExtractor, ArchiveImage, LocalImage};
