//! Score ordering and non-maximum suppression shared by the box detectors.

use std::cmp::Ordering;

use crate::geometry::PixelRect;

/// A scored box in source-image pixels.
pub trait Scored {
    fn rect(&self) -> &PixelRect;
    fn score(&self) -> f32;
    /// Boxes in different groups never suppress each other.
    fn group(&self) -> usize {
        0
    }
}

/// Sort by descending score. NaN scores sort last.
pub fn sort_by_score<T: Scored>(items: &mut [T]) {
    items.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or_else(|| a.score().is_nan().cmp(&b.score().is_nan()))
    });
}

/// Greedy non-maximum suppression over `items` already sorted by descending score.
///
/// A box is dropped when its IoU with an already kept box of the same group exceeds
/// `threshold`.
pub fn non_max_suppression<T: Scored>(items: Vec<T>, threshold: f32) -> Vec<T> {
    let threshold = f64::from(threshold);
    let mut kept: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        let suppressed = kept
            .iter()
            .any(|k| k.group() == item.group() && item.rect().iou(k.rect()) > threshold);
        if !suppressed {
            kept.push(item);
        }
    }
    kept
}

/// Descending `(index, value)` pairs for the `k` largest values.
pub fn top_k(values: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, value)| value.is_finite())
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(k);
    ranked
}
