use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Stub backend for testing and dry runs.
///
/// Replays scripted results in order; once the script is exhausted every
/// call reports no detections.
#[derive(Default)]
pub struct StubBackend {
    script: VecDeque<Result<Vec<Detection>, String>>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the detections returned by the next unanswered call.
    pub fn push(&mut self, detections: Vec<Detection>) -> &mut Self {
        self.script.push_back(Ok(detections));
        self
    }

    /// Queue a failing call.
    pub fn push_failure(&mut self, message: &str) -> &mut Self {
        self.script.push_back(Err(message.to_string()));
        self
    }

    pub fn with_script<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Vec<Detection>>,
    {
        Self {
            script: script.into_iter().map(Ok).collect(),
            calls: 0,
        }
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
        self.calls += 1;
        match self.script.pop_front() {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }
}
