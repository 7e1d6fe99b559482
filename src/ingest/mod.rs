//! Still image sources.
//!
//! The camera exposes a single JPEG snapshot endpoint. Every call to
//! [`StillSource::fetch_still`] performs a fresh request and returns the
//! decoded frame.

mod crop;
mod http;

use anyhow::Result;
use image::RgbImage;

pub use crop::CropRect;
pub use http::HttpStillSource;

/// Anything that can produce a current still frame.
pub trait StillSource: Send {
    fn fetch_still(&mut self) -> Result<RgbImage>;

    /// One animation frame. Sources with a tighter per-frame budget override this.
    fn fetch_frame(&mut self) -> Result<RgbImage> {
        self.fetch_still()
    }
}

impl<T: StillSource + ?Sized> StillSource for Box<T> {
    fn fetch_still(&mut self) -> Result<RgbImage> {
        (**self).fetch_still()
    }

    fn fetch_frame(&mut self) -> Result<RgbImage> {
        (**self).fetch_frame()
    }
}
