//! Conversion from detector-native boxes to pixel crop rectangles.
//!
//! Detectors report boxes as fractions of the image with the origin at the bottom-left and y
//! growing upward. Cropping needs pixel rectangles with the origin at the top-left and y growing
//! downward. [`to_pixel_rect`] performs the flip, scales to pixels, optionally enlarges the rect
//! about its center, and intersects it with the image bounds.

use serde::{Deserialize, Serialize};

/// Bounding box in normalized image space, bottom-left origin.
///
/// Components are expected in `[0, 1]` with `x + width <= 1` and `y + height <= 1`, but nothing
/// enforces it; [`to_pixel_rect`] clamps whatever it is given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The unit square covering the whole image.
    pub const fn full() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// `[x, y, width, height]`, the layout used in detection manifests.
    pub fn to_array(&self) -> [f64; 4] {
        [self.x, self.y, self.width, self.height]
    }

    /// Build a normalized box from a top-left-origin pixel rectangle.
    ///
    /// This is the inverse of [`to_pixel_rect`] with no padding, for detectors whose raw output
    /// is in pixel space.
    pub fn from_top_left_pixels(
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let img_w = f64::from(image_width.max(1));
        let img_h = f64::from(image_height.max(1));
        let norm_h = height / img_h;
        Self {
            x: x / img_w,
            y: 1.0 - y / img_h - norm_h,
            width: width / img_w,
            height: norm_h,
        }
    }
}

impl From<[f64; 4]> for NormalizedBox {
    fn from(values: [f64; 4]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }
}

/// Rectangle in pixel space, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whole-image bounds.
    pub fn bounds(image_width: u32, image_height: u32) -> Self {
        Self::new(0.0, 0.0, f64::from(image_width), f64::from(image_height))
    }

    /// True when no crop can be produced from this rect (non-positive or non-finite extent).
    pub fn is_empty(&self) -> bool {
        !(self.is_finite() && self.width > 0.0 && self.height > 0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.width.mul_add(0.5, self.x),
            self.height.mul_add(0.5, self.y),
        )
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with `other`, `0.0` when they do not overlap.
    pub fn iou(&self, other: &Self) -> f64 {
        let intersection = self.intersect(other).area();
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Grow the rect symmetrically about its center so each side becomes
    /// `(1 + pad_factor)` times longer. Non-positive factors return the rect unchanged.
    pub fn padded(&self, pad_factor: f64) -> Self {
        if !(pad_factor > 0.0) {
            return *self;
        }
        let dx = self.width * pad_factor / 2.0;
        let dy = self.height * pad_factor / 2.0;
        Self::new(
            self.x - dx,
            self.y - dy,
            self.width + 2.0 * dx,
            self.height + 2.0 * dy,
        )
    }

    /// Intersection with `other`. Disjoint or non-finite inputs yield a zero-sized rect.
    pub fn intersect(&self, other: &Self) -> Self {
        if !self.is_finite() || !other.is_finite() {
            return Self::new(0.0, 0.0, 0.0, 0.0);
        }
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return Self::new(x0.min(x1), y0.min(y1), 0.0, 0.0);
        }
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Integer `(x, y, width, height)` inside a `image_width` x `image_height` image.
    ///
    /// Each edge is rounded to the nearest pixel and clamped to the image. Returns `None` when
    /// the rounded rect has no area or lies entirely outside the image.
    pub fn to_pixel_bounds(
        &self,
        image_width: u32,
        image_height: u32,
    ) -> Option<(u32, u32, u32, u32)> {
        if self.is_empty() {
            return None;
        }
        let max_w = f64::from(image_width);
        let max_h = f64::from(image_height);
        let x0 = self.x.round().clamp(0.0, max_w);
        let y0 = self.y.round().clamp(0.0, max_h);
        let x1 = self.right().round().clamp(0.0, max_w);
        let y1 = self.bottom().round().clamp(0.0, max_h);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

/// Map a normalized bottom-left box to a pixel rect for an `image_width` x `image_height` image.
///
/// 1. Flip and scale: `x = nx * W`, `y = (1 - ny - nh) * H`, `w = nw * W`, `h = nh * H`.
/// 2. When `pad_factor > 0`, enlarge each side by `pad_factor` around the center.
/// 3. Intersect with `[0, W] x [0, H]`.
///
/// The result may be empty (see [`PixelRect::is_empty`]); callers treat that as "no crop".
///
/// ```rust
/// # use imagextract_core::geometry::{NormalizedBox, PixelRect, to_pixel_rect};
/// let rect = to_pixel_rect(NormalizedBox::new(0.25, 0.5, 0.5, 0.25), 400, 200, 0.0);
/// assert_eq!(rect, PixelRect::new(100.0, 50.0, 200.0, 50.0));
/// ```
pub fn to_pixel_rect(
    bbox: NormalizedBox,
    image_width: u32,
    image_height: u32,
    pad_factor: f64,
) -> PixelRect {
    let width = f64::from(image_width);
    let height = f64::from(image_height);
    let raw = PixelRect::new(
        bbox.x * width,
        (1.0 - bbox.y - bbox.height) * height,
        bbox.width * width,
        bbox.height * height,
    );
    raw.padded(pad_factor)
        .intersect(&PixelRect::bounds(image_width, image_height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn full_box_maps_to_image_bounds() {
        let rect = to_pixel_rect(NormalizedBox::full(), 640, 480, 0.0);
        assert_eq!(rect, PixelRect::new(0.0, 0.0, 640.0, 480.0));
    }

    #[test]
    fn full_vertical_extent_starts_at_top() {
        let rect = to_pixel_rect(NormalizedBox::new(0.1, 0.0, 0.3, 1.0), 200, 300, 0.0);
        assert_close(rect.y, 0.0);
        assert_close(rect.height, 300.0);
    }

    #[test]
    fn bottom_left_origin_is_flipped() {
        // A box hugging the bottom edge in detector space sits at the bottom in pixel space.
        let rect = to_pixel_rect(NormalizedBox::new(0.0, 0.0, 0.5, 0.25), 100, 100, 0.0);
        assert_close(rect.y, 75.0);
        assert_close(rect.bottom(), 100.0);
    }

    #[test]
    fn padding_grows_each_side_about_center() {
        // 100x100 px box centered at (250, 250) in a 500x500 image.
        let bbox = NormalizedBox::new(0.4, 0.4, 0.2, 0.2);
        let plain = to_pixel_rect(bbox, 500, 500, 0.0);
        let padded = to_pixel_rect(bbox, 500, 500, 0.25);
        assert_close(padded.width, 125.0);
        assert_close(padded.height, 125.0);
        let (cx, cy) = plain.center();
        let (pcx, pcy) = padded.center();
        assert_close(pcx, cx);
        assert_close(pcy, cy);
    }

    #[test]
    fn out_of_range_boxes_are_clipped() {
        let rect = to_pixel_rect(NormalizedBox::new(-0.2, -0.1, 1.5, 1.4), 300, 200, 0.25);
        assert_eq!(rect, PixelRect::bounds(300, 200));

        let right_edge = to_pixel_rect(NormalizedBox::new(0.9, 0.4, 0.3, 0.2), 100, 100, 0.0);
        assert_close(right_edge.x, 90.0);
        assert_close(right_edge.width, 10.0);
    }

    #[test]
    fn fully_outside_boxes_are_empty() {
        let rect = to_pixel_rect(NormalizedBox::new(1.2, 0.2, 0.3, 0.3), 100, 100, 0.0);
        assert!(rect.is_empty());
        assert_eq!(rect.to_pixel_bounds(100, 100), None);
    }

    #[test]
    fn nan_boxes_never_cover_the_image() {
        let rect = to_pixel_rect(NormalizedBox::new(f64::NAN, 0.2, 0.3, 0.3), 100, 100, 0.25);
        assert!(rect.is_empty());
    }

    #[test]
    fn iou_of_identical_and_disjoint_rects() {
        let a = PixelRect::new(0.0, 0.0, 10.0, 10.0);
        assert_close(a.iou(&a), 1.0);
        assert_close(a.iou(&PixelRect::new(20.0, 0.0, 5.0, 5.0)), 0.0);
        assert_close(a.iou(&PixelRect::new(5.0, 0.0, 10.0, 10.0)), 50.0 / 150.0);
    }

    #[test]
    fn pixel_bounds_round_edges() {
        let rect = PixelRect::new(187.5, 110.0, 125.0, 100.0);
        assert_eq!(rect.to_pixel_bounds(500, 400), Some((188, 110, 125, 100)));
        // Sub-pixel slivers vanish after rounding.
        assert_eq!(
            PixelRect::new(10.2, 10.0, 0.2, 5.0).to_pixel_bounds(50, 50),
            None
        );
    }

    #[test]
    fn pixel_box_round_trips_through_normalized_space() {
        let bbox = NormalizedBox::from_top_left_pixels(50.0, 20.0, 100.0, 40.0, 200, 100);
        assert_close(bbox.x, 0.25);
        assert_close(bbox.y, 0.4);
        assert_close(bbox.width, 0.5);
        assert_close(bbox.height, 0.4);
        let rect = to_pixel_rect(bbox, 200, 100, 0.0);
        assert_close(rect.x, 50.0);
        assert_close(rect.y, 20.0);
        assert_close(rect.width, 100.0);
        assert_close(rect.height, 40.0);
    }
}
