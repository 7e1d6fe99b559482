#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::{label_for, load_labels_file, parse_names_metadata};
use crate::detect::result::{non_max_suppression, BoundingBox, Detection};

/// Candidates below this score are dropped before NMS.
const SCORE_FLOOR: f32 = 0.25;
const NMS_IOU_THRESHOLD: f32 = 0.45;
const LETTERBOX_FILL: u8 = 114;

/// Tract-based backend for YOLO-style ONNX object detectors.
///
/// Expects a single output of shape `[1, 4 + classes, anchors]` (or its
/// transpose) with `cx, cy, w, h` boxes in input pixel units followed by
/// per-class scores.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    class_names: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model and prepare it for square `input_size` inputs.
    ///
    /// Class names come from the model's `names` metadata, falling back to
    /// `labels_path` when the metadata is missing.
    pub fn new(model_path: &Path, labels_path: Option<&Path>, input_size: u32) -> Result<Self> {
        let onnx = tract_onnx::onnx();
        let proto = onnx
            .proto_model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?;

        let metadata_names = proto
            .metadata_props
            .iter()
            .find(|entry| entry.key == "names")
            .map(|entry| parse_names_metadata(&entry.value));
        let class_names = match (metadata_names, labels_path) {
            (_, Some(path)) => load_labels_file(path)?,
            (Some(names), None) => names?,
            (None, None) => {
                return Err(anyhow!(
                    "model {} has no class names metadata; set YOLO_LABELS_PATH",
                    model_path.display()
                ))
            }
        };

        let size = input_size as usize;
        let model = onnx
            .model_for_proto_model(&proto)
            .context("failed to build ONNX inference model")?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "Loaded detector model {} ({} classes, input {}x{})",
            model_path.display(),
            class_names.len(),
            input_size,
            input_size
        );

        Ok(Self {
            model,
            input_size,
            class_names,
        })
    }

    fn build_input(&self, image: &RgbImage) -> Result<(Tensor, Letterbox)> {
        let (canvas, letterbox) = letterbox(image, self.input_size)?;
        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok((input.into_tensor(), letterbox))
    }

    fn decode(&self, outputs: TVec<TValue>, letterbox: &Letterbox) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not rank 3")?;

        let (_, d1, d2) = view.dim();
        // Channels are the short axis: [1, 4 + classes, anchors] or its transpose.
        let (channels, anchors, transposed) = if d1 <= d2 {
            (d1, d2, false)
        } else {
            (d2, d1, true)
        };
        if channels < 5 {
            return Err(anyhow!(
                "unexpected model output shape [1, {}, {}]",
                d1,
                d2
            ));
        }
        let at = |channel: usize, anchor: usize| -> f32 {
            if transposed {
                view[(0, anchor, channel)]
            } else {
                view[(0, channel, anchor)]
            }
        };

        let classes = channels - 4;
        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, score) = (0..classes)
                .map(|c| (c, at(4 + c, anchor)))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < SCORE_FLOOR {
                continue;
            }
            let bbox = letterbox.map_box(
                at(0, anchor),
                at(1, anchor),
                at(2, anchor),
                at(3, anchor),
            );
            candidates.push(Detection {
                label: label_for(&self.class_names, class_id),
                class_id,
                confidence: score,
                bbox,
            });
        }

        Ok(non_max_suppression(candidates, NMS_IOU_THRESHOLD))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (input, letterbox) = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, &letterbox)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::from_pixel(
            self.input_size,
            self.input_size,
            Rgb([LETTERBOX_FILL; 3]),
        );
        self.detect(&blank).map(|_| ())
    }
}

/// Scale and padding applied when fitting a source image into the model input.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    source_w: f32,
    source_h: f32,
}

impl Letterbox {
    /// Map a centre-format box from model input space back to the source image.
    fn map_box(&self, cx: f32, cy: f32, w: f32, h: f32) -> BoundingBox {
        let x0 = ((cx - w / 2.0 - self.pad_x) / self.scale).clamp(0.0, self.source_w);
        let y0 = ((cy - h / 2.0 - self.pad_y) / self.scale).clamp(0.0, self.source_h);
        let x1 = ((cx + w / 2.0 - self.pad_x) / self.scale).clamp(0.0, self.source_w);
        let y1 = ((cy + h / 2.0 - self.pad_y) / self.scale).clamp(0.0, self.source_h);
        BoundingBox {
            x: x0,
            y: y0,
            w: x1 - x0,
            h: y1 - y0,
        }
    }
}

fn letterbox(image: &RgbImage, size: u32) -> Result<(RgbImage, Letterbox)> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(anyhow!("cannot run detection on an empty image"));
    }
    let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    Ok((
        canvas,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            source_w: w as f32,
            source_h: h as f32,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_pads_wide_image_vertically() {
        let image = RgbImage::new(1280, 720);
        let (canvas, lb) = letterbox(&image, 640).unwrap();
        assert_eq!(canvas.dimensions(), (640, 640));
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 140.0);
        assert_eq!(canvas.get_pixel(0, 0), &Rgb([LETTERBOX_FILL; 3]));
    }

    #[test]
    fn boxes_map_back_to_source_coordinates() {
        let image = RgbImage::new(1280, 720);
        let (_, lb) = letterbox(&image, 640).unwrap();
        // A 100x50 box centred at (320, 320) in model space.
        let bbox = lb.map_box(320.0, 320.0, 100.0, 50.0);
        assert!((bbox.x - 540.0).abs() < 1e-3);
        assert!((bbox.y - 310.0).abs() < 1e-3);
        assert!((bbox.w - 200.0).abs() < 1e-3);
        assert!((bbox.h - 100.0).abs() < 1e-3);
    }

    #[test]
    fn boxes_are_clamped_to_the_image() {
        let image = RgbImage::new(640, 640);
        let (_, lb) = letterbox(&image, 640).unwrap();
        let bbox = lb.map_box(5.0, 5.0, 40.0, 40.0);
        assert_eq!(bbox.x, 0.0);
        assert_eq!(bbox.y, 0.0);
        assert!((bbox.w - 25.0).abs() < 1e-3);
    }

    #[test]
    fn empty_image_is_rejected() {
        assert!(letterbox(&RgbImage::new(0, 0), 640).is_err());
    }
}
