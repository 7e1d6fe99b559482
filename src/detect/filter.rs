use std::collections::BTreeSet;

use crate::detect::result::Detection;

/// Allow-list of subject names plus the confidence a detection must exceed.
#[derive(Clone, Debug)]
pub struct SubjectFilter {
    subjects: BTreeSet<String>,
    threshold: f32,
}

impl SubjectFilter {
    pub fn new<I>(subjects: I, threshold: f32) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            subjects: subjects.into_iter().collect(),
            threshold,
        }
    }

    pub fn subjects(&self) -> &BTreeSet<String> {
        &self.subjects
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_subject(&self, label: &str) -> bool {
        self.subjects.contains(label)
    }

    /// Whether `detection` is an allow-listed subject strictly above the
    /// threshold.
    pub fn accepts(&self, detection: &Detection) -> bool {
        self.is_subject(&detection.label) && detection.confidence > self.threshold
    }

    /// Subjects present in `detections`.
    ///
    /// Every allow-listed detection is logged, including those rejected for
    /// low confidence.
    pub fn select(&self, detections: &[Detection]) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        for detection in detections {
            if !self.is_subject(&detection.label) {
                continue;
            }
            if detection.confidence > self.threshold {
                log::info!(
                    "Detected {} with confidence {:.2}",
                    detection.label,
                    detection.confidence
                );
                found.insert(detection.label.clone());
            } else {
                log::info!(
                    "Detected {} with confidence {:.2}, too low to notify.",
                    detection.label,
                    detection.confidence
                );
            }
        }
        found
    }
}
