//! detect_once - run the configured detector on a single still.
//!
//! Reads an image file, or fetches one from IMAGE_URL, and prints the raw
//! detections and the subjects that would trigger a notification as JSON.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use litterwatch::config::NotifierConfig;
use litterwatch::detect::{build_backend, Detection, SubjectFilter};
use litterwatch::media::{annotate, encode_jpeg};
use litterwatch::{logging, HttpStillSource, StillSource};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run litter tray detection on one image")]
struct Args {
    /// Image file to analyse. Fetches IMAGE_URL when omitted.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Optional JSON or TOML config file.
    #[arg(long, env = "LITTERWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Write a copy with detection boxes drawn to this path.
    #[arg(long)]
    annotate: Option<PathBuf>,
}

#[derive(Serialize)]
struct Report<'a> {
    backend: &'a str,
    width: u32,
    height: u32,
    threshold: f32,
    detections: &'a [Detection],
    subjects: Vec<&'a str>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(None)?;
    let cfg = NotifierConfig::load_from(args.config.as_deref())?;

    let image = match &args.image {
        Some(path) => image::open(path)
            .with_context(|| format!("open image {}", path.display()))?
            .into_rgb8(),
        None => {
            if cfg.camera.image_url.is_empty() {
                return Err(anyhow!("pass --image or set IMAGE_URL"));
            }
            HttpStillSource::new(&cfg.camera.image_url, cfg.camera.fetch_timeout)?.fetch_still()?
        }
    };

    let mut detector = build_backend(&cfg.detection)?;
    let detections = detector.detect(&image)?;
    let filter = SubjectFilter::new(cfg.detection.subjects.clone(), cfg.detection.confidence);
    let subjects = filter.select(&detections);

    if let Some(path) = &args.annotate {
        let annotated = annotate(&image, &detections, &filter);
        std::fs::write(path, encode_jpeg(&annotated)?)
            .with_context(|| format!("write {}", path.display()))?;
        log::info!("Annotated image written to {}", path.display());
    }

    let (width, height) = image.dimensions();
    let report = Report {
        backend: detector.name(),
        width,
        height,
        threshold: filter.threshold(),
        detections: &detections,
        subjects: subjects.iter().map(String::as_str).collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
