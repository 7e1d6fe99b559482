use image::{Rgb, RgbImage};

use crate::detect::{Detection, SubjectFilter};

const BOX_THICKNESS: u32 = 3;
const ACCEPTED: Rgb<u8> = Rgb([0, 200, 0]);
const LOW_CONFIDENCE: Rgb<u8> = Rgb([255, 165, 0]);

/// Copy of `image` with boxes around every allow-listed detection.
///
/// Detections that pass the confidence threshold are drawn green, the rest
/// orange.
pub fn annotate(image: &RgbImage, detections: &[Detection], filter: &SubjectFilter) -> RgbImage {
    let mut out = image.clone();
    for detection in detections {
        if !filter.is_subject(&detection.label) {
            continue;
        }
        let colour = if filter.accepts(detection) {
            ACCEPTED
        } else {
            LOW_CONFIDENCE
        };
        let b = &detection.bbox;
        draw_rect(&mut out, [b.x, b.y, b.x + b.w, b.y + b.h], colour, BOX_THICKNESS);
    }
    out
}

/// Draw an `[x0, y0, x1, y1]` outline, clamped to the image.
pub fn draw_rect(img: &mut RgbImage, bbox: [f32; 4], colour: Rgb<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32) as u32 };
    let x0 = clamp(bbox[0], w);
    let y0 = clamp(bbox[1], h);
    let x1 = clamp(bbox[2], w);
    let y1 = clamp(bbox[3], h);
    for t in 0..thickness {
        let xx0 = x0 + t;
        let yy0 = y0 + t;
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, colour);
            img.put_pixel(x, yy1, colour);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, colour);
            img.put_pixel(xx1, y, colour);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn detection(label: &str, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox {
                x: 10.0,
                y: 10.0,
                w: 20.0,
                h: 20.0,
            },
            ..Detection::labelled(label, confidence)
        }
    }

    #[test]
    fn draws_outline_only() {
        let mut img = RgbImage::new(50, 50);
        draw_rect(&mut img, [10.0, 10.0, 30.0, 30.0], ACCEPTED, 1);
        assert_eq!(img.get_pixel(10, 10), &ACCEPTED);
        assert_eq!(img.get_pixel(30, 20), &ACCEPTED);
        assert_eq!(img.get_pixel(20, 20), &Rgb([0, 0, 0]));
    }

    #[test]
    fn boxes_outside_image_are_clamped() {
        let mut img = RgbImage::new(20, 20);
        draw_rect(&mut img, [-5.0, -5.0, 100.0, 100.0], ACCEPTED, 2);
        assert_eq!(img.get_pixel(0, 0), &ACCEPTED);
        assert_eq!(img.get_pixel(19, 19), &ACCEPTED);
    }

    #[test]
    fn annotates_subjects_by_confidence() {
        let filter = SubjectFilter::new(vec!["Tom".to_string(), "Jerry".to_string()], 0.7);
        let img = RgbImage::new(50, 50);

        let out = annotate(&img, &[detection("Tom", 0.9)], &filter);
        assert_eq!(out.get_pixel(10, 10), &ACCEPTED);

        let out = annotate(&img, &[detection("Jerry", 0.5)], &filter);
        assert_eq!(out.get_pixel(10, 10), &LOW_CONFIDENCE);

        let out = annotate(&img, &[detection("dog", 0.99)], &filter);
        assert_eq!(out.get_pixel(10, 10), &Rgb([0, 0, 0]));
    }
}
