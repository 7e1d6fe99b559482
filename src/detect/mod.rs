//! Object detection.
//!
//! Backends turn a decoded still into labelled detections; `SubjectFilter`
//! reduces those to the set of configured subjects worth notifying about.

mod backend;
mod backends;
mod filter;
pub mod labels;
mod result;

use anyhow::{anyhow, Result};

use crate::config::{DetectionSettings, DetectorKind};

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use filter::SubjectFilter;
pub use result::{non_max_suppression, BoundingBox, Detection};

/// Build the backend selected by the detection settings.
pub fn build_backend(settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend {
        DetectorKind::Stub => {
            log::warn!("Using stub detector backend: no detections will be reported");
            Ok(Box::new(StubBackend::new()))
        }
        DetectorKind::Tract => build_tract(settings),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    let model_path = settings
        .model_path
        .as_deref()
        .ok_or_else(|| anyhow!("YOLO_MODEL_PATH is required for the tract detector backend"))?;
    log::info!("Loading detector model...");
    let backend = TractBackend::new(model_path, settings.labels_path.as_deref(), settings.input_size)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "detector backend 'tract' requires the 'backend-tract' feature.\n\
         Recompile with: cargo build --features backend-tract\n\
         Or set DETECTOR_BACKEND=stub for a dry run."
    ))
}
