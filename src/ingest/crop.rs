use anyhow::{anyhow, Context, Result};
use image::{imageops, RgbImage};
use std::str::FromStr;

/// Region of interest in source pixels, parsed from `"x,y,w,h"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Crop `image` to this region, clamped to the image bounds.
    ///
    /// A region lying entirely outside the image leaves it untouched.
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let (w, h) = image.dimensions();
        if self.x >= w || self.y >= h {
            log::warn!(
                "Crop {:?} lies outside {}x{} frame; using full frame",
                self,
                w,
                h
            );
            return image.clone();
        }
        let width = self.width.min(w - self.x);
        let height = self.height.min(h - self.y);
        imageops::crop_imm(image, self.x, self.y, width, height).to_image()
    }
}

impl FromStr for CropRect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(anyhow!("crop must be 'x,y,w,h' (got '{}')", s));
        }
        let mut values = [0u32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .with_context(|| format!("invalid crop component '{}'", part))?;
        }
        let [x, y, width, height] = values;
        if width == 0 || height == 0 {
            return Err(anyhow!("crop width and height must be non-zero"));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_four_components() {
        let crop: CropRect = " 10, 20,300 ,200".parse().unwrap();
        assert_eq!(
            crop,
            CropRect {
                x: 10,
                y: 20,
                width: 300,
                height: 200
            }
        );
    }

    #[test]
    fn rejects_malformed_crops() {
        assert!("10,20,300".parse::<CropRect>().is_err());
        assert!("a,b,c,d".parse::<CropRect>().is_err());
        assert!("0,0,0,10".parse::<CropRect>().is_err());
    }

    #[test]
    fn apply_clamps_to_image() {
        let image = RgbImage::new(100, 80);
        let crop = CropRect {
            x: 60,
            y: 40,
            width: 100,
            height: 100,
        };
        assert_eq!(crop.apply(&image).dimensions(), (40, 40));
    }

    #[test]
    fn out_of_bounds_crop_keeps_full_frame() {
        let image = RgbImage::new(100, 80);
        let crop = CropRect {
            x: 200,
            y: 0,
            width: 10,
            height: 10,
        };
        assert_eq!(crop.apply(&image).dimensions(), (100, 80));
    }
}
