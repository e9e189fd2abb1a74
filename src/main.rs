use std::cell::Cell;
use std::fs::File;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use wview::panic_handler::initialize_panic_handler;
use wview::pdf::{
    BackendKind, LogTiming, PageStatus, ReadingDirection, RenderError, RenderedBitmap, Step,
    Viewer, ViewerConfig, ViewerObserver,
};
use wview::settings::{load_settings, load_settings_from_path};

/// Walk the pages of a document through the page cache and report how each
/// request was served
#[derive(Parser, Debug)]
#[command(name = "wview", version, about)]
struct Args {
    /// Document to open
    path: PathBuf,

    /// Rendering engine (mupdf or pdfium)
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Settings file to use instead of the user config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show the first page alone, as a cover
    #[arg(long)]
    cover: bool,

    /// Read right to left
    #[arg(long)]
    rtl: bool,

    /// Pixels per PDF point
    #[arg(long)]
    scale: Option<f32>,

    /// Number of pages to walk (default: all)
    #[arg(long)]
    pages: Option<usize>,

    /// Walk from the last page towards the first
    #[arg(long)]
    backward: bool,

    /// Pause between page requests, giving prefetch time to run
    #[arg(long, default_value_t = 50)]
    pause_ms: u64,

    #[arg(long, default_value = "wview.log")]
    log_file: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Default)]
struct WalkStats {
    foreground_renders: Cell<usize>,
    failures: Cell<usize>,
}

struct WalkObserver(Rc<WalkStats>);

impl ViewerObserver for WalkObserver {
    fn page_ready(&self, index: usize, image: &Arc<RenderedBitmap>) {
        info!("Page {index} ready: {image:?}");
    }

    fn page_failed(&self, index: usize, error: &RenderError) {
        self.0.failures.set(self.0.failures.get() + 1);
        error!("Page {index} failed: {error}");
    }

    fn busy(&self, busy: bool) {
        if busy {
            let renders = &self.0.foreground_renders;
            renders.set(renders.get() + 1);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    WriteLogger::init(
        if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        Config::default(),
        File::create(&args.log_file)
            .with_context(|| format!("Failed to create log file {}", args.log_file.display()))?,
    )?;
    initialize_panic_handler();

    info!("Starting wview");

    let settings = match &args.config {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    };
    let mut config = ViewerConfig::from(&settings);
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(scale) = args.scale.filter(|s| s.is_finite() && *s > 0.0) {
        config.render_scale = scale;
    }
    if args.cover {
        config.display.cover_offset = true;
    }
    if args.rtl {
        config.display.reading_direction = ReadingDirection::RightToLeft;
    }

    let stats = Rc::new(WalkStats::default());
    let mut viewer = Viewer::new(config)
        .with_context(|| format!("{} backend is not available", config.backend.as_str()))?
        .with_timing(Arc::new(LogTiming))
        .with_observer(Box::new(WalkObserver(Rc::clone(&stats))));

    let handle = viewer
        .open_document(&args.path)
        .with_context(|| format!("Failed to open {}", args.path.display()))?;

    let page_count = viewer.page_count();
    println!(
        "{}: {page_count} pages ({} backend)",
        handle.path.display(),
        config.backend.as_str()
    );
    for index in 0..page_count {
        match viewer.page_size(index) {
            Ok(size) => println!("  page {index}: {:.1} x {:.1} pt", size.width, size.height),
            Err(e) => println!("  page {index}: size unavailable ({e})"),
        }
    }

    let walk = args.pages.unwrap_or(page_count).min(page_count);
    let (first, step) = if args.backward {
        (page_count.saturating_sub(1), Step::Previous)
    } else {
        (0, Step::Next)
    };

    let mut hits = 0;
    for n in 0..walk {
        let index = if n == 0 {
            first
        } else {
            match step {
                Step::Next => viewer.current_page() + 1,
                Step::Previous => viewer.current_page().saturating_sub(1),
            }
        };
        let hit = viewer.page_status(index) == PageStatus::Ready;
        if hit {
            hits += 1;
        }

        let started = Instant::now();
        let result = if n == 0 {
            viewer.request_page(index)
        } else {
            viewer.advance(step)
        };
        let elapsed = started.elapsed();

        match result {
            Ok(image) => println!(
                "page {index}: {}x{} px in {:.3}ms ({})",
                image.width_px,
                image.height_px,
                elapsed.as_secs_f64() * 1000.0,
                if hit { "hit" } else { "miss" }
            ),
            Err(e) => println!("page {index}: [unavailable: {e}]"),
        }

        if args.pause_ms > 0 {
            thread::sleep(Duration::from_millis(args.pause_ms));
        }
    }

    println!(
        "{walk} requests: {hits} hits, {} foreground renders, {} failures",
        stats.foreground_renders.get(),
        stats.failures.get()
    );

    viewer.close_document();
    info!("Shutting down wview");
    Ok(())
}
