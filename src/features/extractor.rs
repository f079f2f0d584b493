//! Feature providers.
//!
//! [`GeometricFeatureProvider`] computes the features that need no learned
//! model (torso color histogram and field coordinates) and delegates the
//! appearance embedding and pose keypoints to optional pluggable models.

use image::{imageops, RgbImage};
use tracing::debug;

use super::{FeatureVector, APPEARANCE_DIM, COLOR_HIST_BINS, COLOR_HIST_DIM, POSE_DIM};
use crate::detection::BoundingBox;
use crate::projection::PlaneProjection;

/// Top of the torso band as a fraction of box height.
const TORSO_TOP: f64 = 0.2;

/// Bottom of the torso band as a fraction of box height.
const TORSO_BOTTOM: f64 = 0.6;

/// Builds the feature vector for one detection.
pub trait FeatureProvider {
    /// Extract features for `bbox` in `frame`.
    ///
    /// Sub-vectors that cannot be computed fall back to zeros; extraction
    /// never fails a frame.
    fn extract(
        &mut self,
        frame: &RgbImage,
        bbox: &BoundingBox,
        projector: &dyn PlaneProjection,
    ) -> FeatureVector;
}

/// Re-identification network producing a fixed-length embedding from a crop.
pub trait AppearanceEmbedder: Send {
    /// Return `None` when no embedding can be produced.
    fn embed(&mut self, crop: &RgbImage) -> Option<Vec<f64>>;
}

/// Pose network producing normalized keypoints for the object inside `bbox`.
pub trait PoseEstimator: Send {
    /// Return `[x0, y0, x1, y1, ...]` in normalized image coordinates, or
    /// `None` when no pose is found.
    fn keypoints(&mut self, frame: &RgbImage, bbox: &BoundingBox) -> Option<Vec<f64>>;
}

/// Default feature provider.
#[derive(Default)]
pub struct GeometricFeatureProvider {
    embedder: Option<Box<dyn AppearanceEmbedder>>,
    pose: Option<Box<dyn PoseEstimator>>,
}

impl GeometricFeatureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedder(mut self, embedder: Box<dyn AppearanceEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_pose_estimator(mut self, pose: Box<dyn PoseEstimator>) -> Self {
        self.pose = Some(pose);
        self
    }
}

impl FeatureProvider for GeometricFeatureProvider {
    fn extract(
        &mut self,
        frame: &RgbImage,
        bbox: &BoundingBox,
        projector: &dyn PlaneProjection,
    ) -> FeatureVector {
        let crop = crop_region(frame, bbox);

        let appearance = match (&mut self.embedder, &crop) {
            (Some(embedder), Some(crop)) => embedder
                .embed(crop)
                .filter(|v| v.len() == APPEARANCE_DIM)
                .unwrap_or_else(|| vec![0.0; APPEARANCE_DIM]),
            _ => vec![0.0; APPEARANCE_DIM],
        };

        let color_hist = torso_band(bbox)
            .and_then(|torso| crop_region(frame, &torso))
            .map(|torso| color_histogram(&torso))
            .unwrap_or_else(|| vec![0.0; COLOR_HIST_DIM]);

        let pose = match &mut self.pose {
            Some(estimator) if crop.is_some() => estimator
                .keypoints(frame, bbox)
                .filter(|v| v.len() == POSE_DIM)
                .unwrap_or_else(|| vec![0.0; POSE_DIM]),
            _ => vec![0.0; POSE_DIM],
        };

        if crop.is_none() {
            debug!(?bbox, "empty crop, using zero appearance features");
        }

        FeatureVector {
            appearance,
            color_hist,
            field_coords: projector.project(bbox.foot_point()),
            pose,
        }
    }
}

/// Torso band of a box (20% to 60% of its height).
fn torso_band(bbox: &BoundingBox) -> Option<BoundingBox> {
    let h = bbox.height();
    if bbox.is_empty() {
        return None;
    }
    Some(BoundingBox::new(
        bbox.x1,
        bbox.y1 + TORSO_TOP * h,
        bbox.x2,
        bbox.y1 + TORSO_BOTTOM * h,
    ))
}

/// Crop `bbox` out of `frame`, clipped to the image. `None` if nothing remains.
fn crop_region(frame: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    if !bbox.is_finite() {
        return None;
    }
    let (w, h) = frame.dimensions();
    let x1 = bbox.x1.max(0.0).min(w as f64) as u32;
    let y1 = bbox.y1.max(0.0).min(h as f64) as u32;
    let x2 = bbox.x2.max(0.0).min(w as f64) as u32;
    let y2 = bbox.y2.max(0.0).min(h as f64) as u32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(imageops::crop_imm(frame, x1, y1, x2 - x1, y2 - y1).to_image())
}

/// Convert an 8-bit RGB pixel to 8-bit HSV with hue in `[0, 180)`.
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0.0 { diff / v * 255.0 } else { 0.0 };

    let mut h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    ((h / 2.0).min(179.0), s, v)
}

fn bin_index(value: f64, upper: f64) -> usize {
    ((value / upper * COLOR_HIST_BINS as f64) as usize).min(COLOR_HIST_BINS - 1)
}

/// HSV color histogram of an image: 16 bins per channel, each channel
/// L2-normalized independently, concatenated as `[H | S | V]`.
pub fn color_histogram(image: &RgbImage) -> Vec<f64> {
    let mut hist = vec![0.0; COLOR_HIST_DIM];

    for pixel in image.pixels() {
        let [r, g, b] = pixel.0;
        let (h, s, v) = rgb_to_hsv(r, g, b);
        hist[bin_index(h, 180.0)] += 1.0;
        hist[COLOR_HIST_BINS + bin_index(s, 256.0)] += 1.0;
        hist[2 * COLOR_HIST_BINS + bin_index(v, 256.0)] += 1.0;
    }

    for channel in hist.chunks_mut(COLOR_HIST_BINS) {
        let norm = channel.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            channel.iter_mut().for_each(|x| *x /= norm);
        }
    }

    hist
}
