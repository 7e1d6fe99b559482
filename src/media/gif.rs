use anyhow::{anyhow, Context, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::{Delay, DynamicImage, Frame, RgbImage};
use std::path::Path;
use std::time::Duration;

const GIF_ENCODE_SPEED: i32 = 10;
const JPEG_QUALITY: u8 = 90;

/// Encode `frames` as an infinitely looping GIF at `out_path`.
///
/// The file is only written once the whole animation has been encoded, so a
/// failure never leaves a truncated GIF behind.
pub fn assemble_gif(frames: &[RgbImage], frame_delay: Duration, out_path: &Path) -> Result<()> {
    if frames.is_empty() {
        return Err(anyhow!("no frames to assemble"));
    }
    let delay = Delay::from_saturating_duration(frame_delay);
    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut bytes, GIF_ENCODE_SPEED);
        encoder
            .set_repeat(Repeat::Infinite)
            .context("set GIF repeat")?;
        for frame in frames {
            let rgba = DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
            encoder
                .encode_frame(Frame::from_parts(rgba, 0, 0, delay))
                .context("encode GIF frame")?;
        }
    }
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(out_path, &bytes)
        .with_context(|| format!("write animation to {}", out_path.display()))?;
    log::info!(
        "Assembled {} frame animation at {} ({} bytes)",
        frames.len(),
        out_path.display(),
        bytes.len()
    );
    Ok(())
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(image)
        .context("encode JPEG")?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifDecoder;
    use image::AnimationDecoder;
    use image::Rgb;

    #[test]
    fn writes_looping_gif_with_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("tray.gif");
        let frames = vec![
            RgbImage::from_pixel(16, 12, Rgb([255, 0, 0])),
            RgbImage::from_pixel(16, 12, Rgb([0, 255, 0])),
            RgbImage::from_pixel(16, 12, Rgb([0, 0, 255])),
        ];
        assemble_gif(&frames, Duration::from_millis(500), &out).unwrap();

        let file = std::io::BufReader::new(std::fs::File::open(&out).unwrap());
        let decoded = GifDecoder::new(file).unwrap().into_frames().collect_frames().unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].buffer().dimensions(), (16, 12));
        let (num, den) = decoded[0].delay().numer_denom_ms();
        assert_eq!(num / den, 500);
    }

    #[test]
    fn refuses_empty_animation() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tray.gif");
        assert!(assemble_gif(&[], Duration::from_millis(500), &out).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn jpeg_starts_with_soi_marker() {
        let bytes = encode_jpeg(&RgbImage::new(4, 4)).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
