//! Per-view detections and the keys that identify them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::features::FeatureVector;
use crate::{Error, Result};

/// View-local track id assigned by one camera's tracker.
///
/// Not comparable across cameras.
pub type TrackId = u32;

/// One of the two camera views being fused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum View {
    /// The reference stream (offset is measured against it).
    #[serde(rename = "view1")]
    First,
    /// The stream whose offset relative to the first is estimated.
    #[serde(rename = "view2")]
    Second,
}

impl View {
    /// Stable tag used in logs and serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            View::First => "view1",
            View::Second => "view2",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (view, view-local track id) pair.
///
/// Stable only while that camera's track persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub view: View,
    pub track_id: TrackId,
}

impl IdentityKey {
    pub fn new(view: View, track_id: TrackId) -> Self {
        Self { view, track_id }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.view, self.track_id)
    }
}

/// Axis-aligned pixel bounding box in `[x1, y1, x2, y2]` (min/max corner) form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    /// Create a box from two corners; the corners are reordered into min/max form.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Create a box from an `[x1, y1, x2, y2]` array.
    pub fn from_xyxy(xyxy: [f64; 4]) -> Self {
        Self::new(xyxy[0], xyxy[1], xyxy[2], xyxy[3])
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// True when the box encloses no area.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// Bottom-centre point, where the object touches the ground plane.
    pub fn foot_point(&self) -> [f64; 2] {
        [(self.x1 + self.x2) / 2.0, self.y2]
    }
}

/// A detection as produced by an external detector/tracker for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub track_id: TrackId,
    pub confidence: f64,
}

impl RawDetection {
    pub fn new(bbox: BoundingBox, track_id: TrackId, confidence: f64) -> Self {
        Self { bbox, track_id, confidence }
    }
}

/// A per-view object instance with its feature vector attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// View this detection was observed in.
    pub view: View,

    /// View-local track id.
    pub track_id: TrackId,

    /// Pixel bounding box.
    pub bbox: BoundingBox,

    /// Detector confidence.
    pub confidence: f64,

    /// Features consumed by the cross-view matcher (zero fallbacks by default).
    pub features: FeatureVector,
}

impl Detection {
    /// Create a detection with zero-valued features.
    ///
    /// # Errors
    /// `InvalidDetection` if the box has non-finite coordinates.
    pub fn new(view: View, track_id: TrackId, bbox: BoundingBox, confidence: f64) -> Result<Self> {
        if !bbox.is_finite() {
            return Err(Error::InvalidDetection(format!(
                "bounding box for {}:{} has non-finite coordinates",
                view, track_id
            )));
        }

        Ok(Self {
            view,
            track_id,
            bbox,
            confidence,
            features: FeatureVector::zeros(),
        })
    }

    /// Create a detection from a raw detector output.
    pub fn from_raw(view: View, raw: &RawDetection) -> Result<Self> {
        Self::new(view, raw.track_id, raw.bbox, raw.confidence)
    }

    /// Attach a feature vector.
    pub fn with_features(mut self, features: FeatureVector) -> Self {
        self.features = features;
        self
    }

    /// Identity key of this detection.
    pub fn key(&self) -> IdentityKey {
        IdentityKey::new(self.view, self.track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bbox_reorders_corners() {
        let b = BoundingBox::new(10.0, 20.0, 0.0, 5.0);
        assert_eq!(b, BoundingBox::from_xyxy([0.0, 5.0, 10.0, 20.0]));
        assert_relative_eq!(b.width(), 10.0);
        assert_relative_eq!(b.height(), 15.0);
    }

    #[test]
    fn test_bbox_foot_point() {
        let b = BoundingBox::new(10.0, 20.0, 30.0, 80.0);
        assert_eq!(b.foot_point(), [20.0, 80.0]);
    }

    #[test]
    fn test_bbox_empty() {
        assert!(BoundingBox::new(5.0, 5.0, 5.0, 10.0).is_empty());
        assert!(!BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_empty());
    }

    #[test]
    fn test_detection_new() {
        let det = Detection::new(View::First, 3, BoundingBox::new(0.0, 0.0, 4.0, 8.0), 0.9).unwrap();
        assert_eq!(det.key(), IdentityKey::new(View::First, 3));
        assert_eq!(det.features, FeatureVector::zeros());
    }

    #[test]
    fn test_detection_rejects_non_finite_box() {
        let bbox = BoundingBox { x1: 0.0, y1: f64::NAN, x2: 1.0, y2: 1.0 };
        assert!(matches!(
            Detection::new(View::Second, 1, bbox, 0.5),
            Err(Error::InvalidDetection(_))
        ));
    }

    #[test]
    fn test_view_serialization() {
        assert_eq!(serde_json::to_string(&View::First).unwrap(), "\"view1\"");
        assert_eq!(serde_json::from_str::<View>("\"view2\"").unwrap(), View::Second);
        assert_eq!(IdentityKey::new(View::Second, 7).to_string(), "view2:7");
    }
}
