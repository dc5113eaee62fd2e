//! What detectors report back to the pipeline.

use std::cmp::Ordering;

use crate::geometry::NormalizedBox;

/// One detector finding for a region or for the whole image.
///
/// Confidences are in `[0, 1]`. Boxes use the detector-native normalized, bottom-left
/// convention; see [`crate::geometry::to_pixel_rect`].
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// A detected face.
    Face { bbox: NormalizedBox, confidence: f32 },
    /// The top recognition candidate for one text region.
    Text { text: String, confidence: f32 },
    /// A whole-image label.
    Classification { label: String, confidence: f32 },
    /// A located object with its best label.
    Object {
        label: String,
        confidence: f32,
        bbox: NormalizedBox,
    },
}

impl Observation {
    pub fn confidence(&self) -> f32 {
        match self {
            Self::Face { confidence, .. }
            | Self::Text { confidence, .. }
            | Self::Classification { confidence, .. }
            | Self::Object { confidence, .. } => *confidence,
        }
    }

    /// Short variant name for log messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Face { .. } => "face",
            Self::Text { .. } => "text",
            Self::Classification { .. } => "classification",
            Self::Object { .. } => "object",
        }
    }

    /// Build a text observation from a region's recognition candidates, keeping only the most
    /// confident one. Returns `None` when there are no candidates.
    pub fn text_from_candidates<I>(candidates: I) -> Option<Self>
    where
        I: IntoIterator<Item = (String, f32)>,
    {
        candidates
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .map(|(text, confidence)| Self::Text { text, confidence })
    }

    /// Build an object observation from a region's ranked labels, keeping only the most
    /// confident one. Returns `None` for a region without labels.
    pub fn object_from_labels<I>(labels: I, bbox: NormalizedBox) -> Option<Self>
    where
        I: IntoIterator<Item = (String, f32)>,
    {
        labels
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .map(|(label, confidence)| Self::Object {
                label,
                confidence,
                bbox,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_top_text_candidate() {
        let obs = Observation::text_from_candidates(vec![
            ("He1lo".to_string(), 0.4),
            ("Hello".to_string(), 0.9),
            ("Hallo".to_string(), 0.6),
        ])
        .expect("candidate");
        assert_eq!(
            obs,
            Observation::Text {
                text: "Hello".into(),
                confidence: 0.9
            }
        );
        assert!(Observation::text_from_candidates(Vec::new()).is_none());
    }

    #[test]
    fn keeps_only_the_top_object_label() {
        let bbox = NormalizedBox::new(0.1, 0.2, 0.3, 0.4);
        let obs = Observation::object_from_labels(
            vec![("cat".to_string(), 0.3), ("dog".to_string(), 0.7)],
            bbox,
        )
        .expect("label");
        match obs {
            Observation::Object {
                label,
                confidence,
                bbox: b,
            } => {
                assert_eq!(label, "dog");
                assert_eq!(confidence, 0.7);
                assert_eq!(b, bbox);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Observation::object_from_labels(Vec::new(), bbox).is_none());
    }

    #[test]
    fn exposes_confidence_for_every_variant() {
        let face = Observation::Face {
            bbox: NormalizedBox::full(),
            confidence: 0.95,
        };
        assert_eq!(face.confidence(), 0.95);
        assert_eq!(face.kind_name(), "face");
    }
}
