//! Animation assembly and on-disk captures.

mod annotate;
mod gif;
mod store;

pub use annotate::{annotate, draw_rect};
pub use gif::{assemble_gif, encode_jpeg};
pub use store::{capture_timestamp, CaptureKind, CaptureStore, ScratchDir};
