use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::StorageSettings;
use crate::media::gif::{assemble_gif, encode_jpeg};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Local wall-clock timestamp used in capture file names.
pub fn capture_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureKind {
    /// Still taken for detection after a motion trigger.
    Motion,
    /// The motion still with detection boxes drawn on it.
    MotionAnnotated,
    /// Still taken during an activity re-check.
    Activity,
}

impl CaptureKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Motion => "motion",
            Self::MotionAnnotated => "motion-annotated",
            Self::Activity => "activity",
        }
    }
}

/// Persists captures under the save folder and owns the animation paths.
#[derive(Clone, Debug)]
pub struct CaptureStore {
    save_dir: PathBuf,
    scratch_dir: PathBuf,
    animation_path: PathBuf,
}

impl CaptureStore {
    pub fn new(settings: &StorageSettings) -> Self {
        Self {
            save_dir: settings.save_dir.clone(),
            scratch_dir: settings.scratch_dir.clone(),
            animation_path: settings.animation_path.clone(),
        }
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub fn animation_path(&self) -> &Path {
        &self.animation_path
    }

    /// Create the save folder if it does not exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.save_dir)
            .with_context(|| format!("create save folder {}", self.save_dir.display()))
    }

    pub fn capture_path(&self, kind: CaptureKind, timestamp: &str) -> PathBuf {
        self.save_dir
            .join(format!("{}-{}.jpg", kind.prefix(), timestamp))
    }

    /// Write `image` as `<kind>-<timestamp>.jpg` and return its path.
    pub fn save_capture(&self, kind: CaptureKind, image: &RgbImage, timestamp: &str) -> Result<PathBuf> {
        self.ensure_dirs()?;
        let path = self.capture_path(kind, timestamp);
        let bytes = encode_jpeg(image)?;
        std::fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        log::info!("Saved {} capture to: {}", kind.prefix(), path.display());
        Ok(path)
    }

    /// Fresh scratch directory for the sampled frames of one animation.
    pub fn scratch(&self) -> Result<ScratchDir> {
        ScratchDir::create(&self.scratch_dir)
    }

    /// Encode `frames` into the configured animation file.
    pub fn assemble_animation(&self, frames: &[RgbImage], frame_delay: Duration) -> Result<PathBuf> {
        assemble_gif(frames, frame_delay, &self.animation_path)?;
        Ok(self.animation_path.clone())
    }
}

/// Scratch directory removed again on drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("create scratch dir {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write sampled frame `index` as `frame_<index>.jpg`.
    pub fn write_frame(&self, index: usize, image: &RgbImage) -> Result<PathBuf> {
        let path = self.path.join(format!("frame_{}.jpg", index));
        std::fs::write(&path, encode_jpeg(image)?)
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            log::warn!("Failed to remove scratch dir {}: {}", self.path.display(), e);
        }
    }
}
