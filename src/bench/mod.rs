//! Headless scroll benchmark.
//!
//! Drives a [`GridEngine`] the way a host would: one scroll step per frame,
//! pages delivered as the window nears the end, then a resize sweep.
//! Each frame also builds the LOD overlay frames of every visible cell.

use std::cell::RefCell;
use std::env;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::{GridPreferences, ZoomLevel};
use crate::engine::GridEngine;
use crate::feed::{page_channel, DirectoryFeed, PageSource, SyntheticFeed};
use crate::layout::ManualFrameScheduler;
use crate::overlay::OverlayFrame;

/// Scroll frames stop here even if the content never ends.
const MAX_FRAMES: usize = 200_000;
const RESIZE_STEPS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkArgs {
    /// Image directory; a synthetic feed is used when absent.
    pub path: Option<PathBuf>,
    pub images: usize,
    pub page_size: usize,
    pub boxes_per_image: usize,
    pub width: f32,
    pub viewport_height: f32,
    pub zoom: ZoomLevel,
    pub runs: usize,
}

impl Default for BenchmarkArgs {
    fn default() -> Self {
        Self {
            path: None,
            images: 10_000,
            page_size: 500,
            boxes_per_image: 8,
            width: 1920.0,
            viewport_height: 1080.0,
            zoom: ZoomLevel::Medium,
            runs: 1,
        }
    }
}

#[derive(Debug, Default)]
struct BenchmarkRun {
    run_index: usize,
    elapsed_ms: u128,
    images: usize,
    rows: usize,
    frames: usize,
    frame_p50_ms: f64,
    frame_p95_ms: f64,
    frames_over_16ms: usize,
    fetches: u64,
    cells_drawn: usize,
    reduced_cells: usize,
    boxes_drawn: usize,
    resize_p95_ms: f64,
}

/// `JGRID_WIDTH` / `JGRID_ZOOM` overrides for the defaults.
fn env_defaults() -> Result<BenchmarkArgs> {
    let mut args = BenchmarkArgs::default();
    if let Ok(value) = env::var("JGRID_WIDTH") {
        args.width = value
            .parse::<f32>()
            .context("Failed to parse JGRID_WIDTH as a number")?;
    }
    if let Ok(value) = env::var("JGRID_ZOOM") {
        args.zoom = ZoomLevel::from_name(&value)
            .with_context(|| format!("Unknown JGRID_ZOOM value: {value}"))?;
    }
    Ok(args)
}

pub fn maybe_parse_args() -> Result<Option<BenchmarkArgs>> {
    parse_args(env::args().skip(1), env_defaults()?)
}

fn parse_args(
    args: impl IntoIterator<Item = String>,
    defaults: BenchmarkArgs,
) -> Result<Option<BenchmarkArgs>> {
    let mut benchmark = false;
    let mut out = defaults;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .with_context(|| format!("Missing value for {flag} in benchmark mode"))
        };
        match arg.as_str() {
            "--benchmark" => benchmark = true,
            "--path" => out.path = Some(PathBuf::from(value("--path")?)),
            "--images" => {
                out.images = value("--images")?
                    .parse::<usize>()
                    .context("Failed to parse --images as a non-negative integer")?;
            }
            "--page-size" => {
                out.page_size = value("--page-size")?
                    .parse::<usize>()
                    .context("Failed to parse --page-size as a positive integer")?;
            }
            "--boxes" => {
                out.boxes_per_image = value("--boxes")?
                    .parse::<usize>()
                    .context("Failed to parse --boxes as a non-negative integer")?;
            }
            "--width" => {
                out.width = value("--width")?
                    .parse::<f32>()
                    .context("Failed to parse --width as a number")?;
            }
            "--height" => {
                out.viewport_height = value("--height")?
                    .parse::<f32>()
                    .context("Failed to parse --height as a number")?;
            }
            "--zoom" => {
                let name = value("--zoom")?;
                out.zoom = ZoomLevel::from_name(&name)
                    .with_context(|| format!("Unknown --zoom value: {name}"))?;
            }
            "--runs" => {
                out.runs = value("--runs")?
                    .parse::<usize>()
                    .context("Failed to parse --runs as a positive integer")?;
            }
            _ => {
                if benchmark && out.path.is_none() && !arg.starts_with('-') {
                    out.path = Some(PathBuf::from(arg));
                }
            }
        }
    }

    if !benchmark {
        return Ok(None);
    }
    if out.runs == 0 {
        bail!("--runs must be greater than 0");
    }
    if out.page_size == 0 {
        bail!("--page-size must be greater than 0");
    }
    if !(out.width > 0.0 && out.viewport_height > 0.0) {
        bail!("--width and --height must be positive");
    }
    Ok(Some(out))
}

/// Keeps a handle on whichever feed the engine was given.
enum FeedHandle {
    Synthetic(Rc<RefCell<SyntheticFeed>>),
    Directory(Rc<RefCell<DirectoryFeed>>),
}

impl FeedHandle {
    /// Lets any in-flight fetch finish so its page is waiting in the channel.
    fn settle(&self) {
        match self {
            FeedHandle::Synthetic(feed) => {
                feed.borrow_mut().complete_pending();
            }
            FeedHandle::Directory(feed) => {
                while feed.borrow().state().is_fetching {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    fn exhausted(&self) -> bool {
        let state = match self {
            FeedHandle::Synthetic(feed) => feed.borrow().state(),
            FeedHandle::Directory(feed) => feed.borrow().state(),
        };
        !state.has_more && !state.is_fetching
    }
}

pub fn run_benchmark(args: BenchmarkArgs) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime for benchmark")?;

    let mut runs = Vec::with_capacity(args.runs);
    for run_index in 1..=args.runs {
        println!("run={} phase=begin", run_index);
        let run = run_once(&args, run_index, runtime.handle())?;
        println!(
            "run={} phase=end images={} rows={} frames={}",
            run_index, run.images, run.rows, run.frames
        );
        runs.push(run);
    }

    let p95s: Vec<f64> = runs.iter().map(|r| r.frame_p95_ms).collect();
    let resize: Vec<f64> = runs.iter().map(|r| r.resize_p95_ms).collect();
    println!(
        "runs={} avg_frame_p95_ms={:.3} avg_resize_p95_ms={:.3}",
        runs.len(),
        average(&p95s),
        average(&resize)
    );
    for run in &runs {
        println!(
            "run={} elapsed_ms={} images={} rows={} frames(p50/p95/over16)={:.3}/{:.3}/{} fetches={} lod(cells/reduced/boxes)={}/{}/{}",
            run.run_index,
            run.elapsed_ms,
            run.images,
            run.rows,
            run.frame_p50_ms,
            run.frame_p95_ms,
            run.frames_over_16ms,
            run.fetches,
            run.cells_drawn,
            run.reduced_cells,
            run.boxes_drawn
        );
    }

    Ok(0)
}

fn run_once(
    args: &BenchmarkArgs,
    run_index: usize,
    runtime: &tokio::runtime::Handle,
) -> Result<BenchmarkRun> {
    let start = Instant::now();
    let prefs = GridPreferences {
        zoom: args.zoom,
        ..GridPreferences::default()
    };
    let config = prefs.to_config(args.width);
    let mut engine = GridEngine::new(config, Box::new(ManualFrameScheduler::new()));

    let (tx, rx) = page_channel();
    let feed = match &args.path {
        Some(path) => {
            let feed = DirectoryFeed::new(path.clone(), args.page_size, runtime.clone(), tx)
                .with_context(|| format!("Failed to open benchmark directory {}", path.display()))?;
            let feed = Rc::new(RefCell::new(feed));
            engine.attach_source(Box::new(Rc::clone(&feed)), rx);
            FeedHandle::Directory(feed)
        }
        None => {
            let feed = SyntheticFeed::new(args.images, args.page_size, tx)
                .context("Failed to create synthetic feed")?
                .with_boxes(args.boxes_per_image)
                .with_seed(run_index as u64);
            let feed = Rc::new(RefCell::new(feed));
            engine.attach_source(Box::new(Rc::clone(&feed)), rx);
            FeedHandle::Synthetic(feed)
        }
    };
    engine.set_container_size(args.width, args.viewport_height);

    let mut run = BenchmarkRun {
        run_index,
        ..BenchmarkRun::default()
    };
    let mut frame_times_ms = Vec::new();
    let mut fetches = 0u64;
    let step = args.viewport_height / 3.0;
    let mut offset = 0.0f32;

    for _ in 0..MAX_FRAMES {
        let fired_before = engine.pagination().fired();
        feed.settle();

        let frame_start = Instant::now();
        engine.on_frame();
        engine.set_scroll_offset(offset);
        draw_overlays(&engine, &mut run);
        frame_times_ms.push(frame_start.elapsed().as_secs_f64() * 1000.0);

        fetches += engine.pagination().fired() - fired_before;
        let at_bottom = engine.scroll_offset() + args.viewport_height >= engine.total_height();
        if at_bottom && feed.exhausted() && !engine.has_pending_work() {
            break;
        }
        offset = engine.scroll_offset() + step;
    }

    let mut resize_ms = Vec::with_capacity(RESIZE_STEPS);
    for i in 1..=RESIZE_STEPS {
        let width = args.width * (1.0 - 0.5 * i as f32 / RESIZE_STEPS as f32);
        engine.set_container_size(width, args.viewport_height);
        let frame_start = Instant::now();
        engine.on_frame();
        resize_ms.push(frame_start.elapsed().as_secs_f64() * 1000.0);
    }

    run.elapsed_ms = start.elapsed().as_millis();
    run.images = engine.images().len();
    run.rows = engine.rows().len();
    run.frames = frame_times_ms.len();
    run.frame_p50_ms = percentile_ms(&frame_times_ms, 0.50);
    run.frame_p95_ms = percentile_ms(&frame_times_ms, 0.95);
    run.frames_over_16ms = frame_times_ms.iter().filter(|t| **t > 16.67).count();
    run.fetches = fetches;
    run.resize_p95_ms = percentile_ms(&resize_ms, 0.95);
    info!(
        run = run_index,
        images = run.images,
        rows = run.rows,
        frames = run.frames,
        "Benchmark run finished"
    );
    Ok(run)
}

fn draw_overlays(engine: &GridEngine, run: &mut BenchmarkRun) {
    let lod = engine.lod_settings();
    for cell in engine.visible_cells() {
        let Some(image) = engine.images().get(cell.image_index) else {
            continue;
        };
        let frame = OverlayFrame::build(image.boxes(), cell.width, cell.height, lod);
        run.cells_drawn += 1;
        run.boxes_drawn += frame.boxes.len();
        if frame.reduced {
            run.reduced_cells += 1;
        }
    }
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn percentile_ms(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let clamped = p.clamp(0.0, 1.0);
    let idx = ((sorted.len() - 1) as f64 * clamped).round() as usize;
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Option<BenchmarkArgs>> {
        parse_args(
            list.iter().map(|s| s.to_string()),
            BenchmarkArgs::default(),
        )
    }

    #[test]
    fn test_not_benchmark_mode() {
        assert_eq!(args(&["--width", "800"]).unwrap(), None);
    }

    #[test]
    fn test_parses_flags_and_positional_path() {
        let parsed = args(&[
            "--benchmark",
            "/tmp/photos",
            "--images",
            "250",
            "--zoom",
            "few",
            "--runs",
            "3",
        ])
        .unwrap()
        .unwrap();
        assert_eq!(parsed.path, Some(PathBuf::from("/tmp/photos")));
        assert_eq!(parsed.images, 250);
        assert_eq!(parsed.zoom, ZoomLevel::Few);
        assert_eq!(parsed.runs, 3);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(args(&["--benchmark", "--runs", "0"]).is_err());
        assert!(args(&["--benchmark", "--width"]).is_err());
        assert!(args(&["--benchmark", "--zoom", "huge"]).is_err());
    }

    #[test]
    fn test_percentiles() {
        let values = [5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(percentile_ms(&values, 0.5), 3.0);
        assert_eq!(percentile_ms(&values, 1.0), 5.0);
        assert_eq!(percentile_ms(&[], 0.5), 0.0);
        assert_eq!(average(&[1.0, 3.0]), 2.0);
    }

    #[test]
    fn test_synthetic_run_loads_every_image() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let bench = BenchmarkArgs {
            images: 300,
            page_size: 50,
            boxes_per_image: 30,
            width: 800.0,
            viewport_height: 600.0,
            ..BenchmarkArgs::default()
        };
        let run = run_once(&bench, 1, runtime.handle()).unwrap();
        assert_eq!(run.images, 300);
        assert_eq!(run.fetches, 6);
        assert!(run.rows > 0);
        assert!(run.cells_drawn > 0);
    }
}
