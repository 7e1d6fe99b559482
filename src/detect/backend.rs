use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Object detector backend.
///
/// Implementations return every detection they consider valid; subject
/// filtering and thresholds are applied by the caller.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a decoded RGB image.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: DetectorBackend + ?Sized> DetectorBackend for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        (**self).detect(image)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
