use std::path::PathBuf;
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image_cache::CacheWindow;
use image_list::{CollectionController, CollectionEvent, Position, ViewerConfig};
use crossbeam_channel::Receiver;

#[derive(Parser)]
#[command(name = "filmstrip")]
#[command(about = "Browse image folders with a windowed prefetch cache and background thumbnails")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a folder or image and preload its thumbnails
    Open {
        /// Folder, or an image inside the folder to start at
        path: PathBuf,

        /// Neighbours kept loaded on each side of the current image
        #[arg(long)]
        cache_size: Option<usize>,

        /// Long-edge bound for thumbnails, in pixels
        #[arg(long)]
        thumbnail_size: Option<u32>,

        /// Config file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Start position
        #[arg(long, conflicts_with = "last")]
        start: Option<usize>,

        /// Start at the last image
        #[arg(long)]
        last: bool,

        /// Step through every image after the thumbnails are ready
        #[arg(short, long)]
        walk: bool,

        /// Give up waiting for thumbnails after this many seconds
        #[arg(long, default_value = "60")]
        timeout_secs: u64,
    },

    /// Print the prefetch window for a position, in load order
    Window {
        #[arg(long)]
        index: usize,

        #[arg(long, default_value = "2")]
        cache_size: usize,

        /// Collection length
        #[arg(long)]
        len: usize,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Open { path, cache_size, thumbnail_size, config, start, last, walk, timeout_secs } => {
            let position = if last {
                Position::Last
            } else {
                Position::Index(start.unwrap_or(0))
            };
            let config = load_config(config, cache_size, thumbnail_size)?;
            open(path, config, position, walk, Duration::from_secs(timeout_secs))
        }
        Commands::Window { index, cache_size, len } => {
            let window = CacheWindow::compute(index, cache_size, len);
            println!("{}", describe(&window));
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>, cache_size: Option<usize>, thumbnail_size: Option<u32>) -> Result<ViewerConfig> {
    let path = path.unwrap_or_else(ViewerConfig::default_path);
    let mut config = ViewerConfig::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(cache_size) = cache_size {
        config.cache.cache_size = cache_size;
    }
    if let Some(thumbnail_size) = thumbnail_size {
        config.cache.thumbnail_size = thumbnail_size;
    }
    log::debug!("Using config {:?}", config);
    Ok(config)
}

fn open(path: PathBuf, config: ViewerConfig, position: Position, walk: bool, timeout: Duration) -> Result<()> {
    let (mut controller, events) = CollectionController::new(config);

    controller
        .load_at(&path, position)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let collection = controller.collection();
    println!("📂 Opened {} images from {}", collection.len(), path.display());
    if let Some(current) = collection.current() {
        println!("👉 Current: [{}] {}", collection.index(), current.path().display());
    }

    let started = Instant::now();
    let missing = wait_for_thumbnails(&mut controller, &events, timeout)?;
    let progress = controller.thumbnail_progress();
    println!(
        "🖼️  {} thumbnails in {:.1}s ({} missing)",
        progress.total,
        started.elapsed().as_secs_f64(),
        missing
    );

    report_window(&mut controller, &events);

    if walk {
        while controller.next() {
            report_window(&mut controller, &events);
        }
        println!("🏁 End of list");
    }

    Ok(())
}

/// Pump events until every thumbnail has been delivered; returns how many
/// fell back to the missing placeholder.
fn wait_for_thumbnails(
    controller: &mut CollectionController,
    events: &Receiver<CollectionEvent>,
    timeout: Duration,
) -> Result<usize> {
    let deadline = Instant::now() + timeout;
    let mut missing = 0;

    while Instant::now() < deadline {
        controller.wait_events(Duration::from_millis(50));
        for event in events.try_iter() {
            match event {
                CollectionEvent::ThumbnailReady { thumbnail, .. } if thumbnail.is_missing() => missing += 1,
                CollectionEvent::AllThumbnailsReady { .. } => return Ok(missing),
                CollectionEvent::ImageFailed { index, message } => {
                    println!("⚠️  Image {} failed: {}", index, message);
                }
                _ => {}
            }
        }
    }

    anyhow::bail!("Timed out after {}s waiting for thumbnails", timeout.as_secs())
}

/// Wait for the window loader, then print the current position and window
fn report_window(controller: &mut CollectionController, events: &Receiver<CollectionEvent>) {
    let progress = controller.wait_for_window();
    controller.process_events();
    for event in events.try_iter() {
        if let CollectionEvent::ImageFailed { index, message } = event {
            println!("⚠️  Image {} failed: {}", index, message);
        }
    }

    let collection = controller.collection();
    let name = collection
        .current()
        .and_then(|item| item.path().file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default();
    let loaded = progress.map(|p| p.loaded).unwrap_or(0);

    println!(
        "  [{}/{}] {}  window {}  ({} decoded)",
        collection.index() + 1,
        collection.len(),
        name,
        describe(&controller.window()),
        loaded
    );
}

fn describe(window: &CacheWindow) -> String {
    let slots: Vec<String> = window.slots().iter().map(|i| i.to_string()).collect();
    format!("[{}]", slots.join(", "))
}
