//! Frame-by-frame orchestration of the two views.
//!
//! The pipeline synchronizes the streams once, then for every aligned frame
//! pair runs detection and feature extraction per view, matches the two
//! detection lists, and resolves global identities. Each fused frame is
//! handed to a caller-supplied sink; the pipeline itself renders and writes
//! nothing.

use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::detection::{BoundingBox, Detection, RawDetection, TrackId, View};
use crate::features::FeatureProvider;
use crate::identity::{ConflictPolicy, GlobalId, IdentityRegistry};
use crate::matching::{CorrespondenceMatcher, MatcherConfig};
use crate::projection::PlaneProjection;
use crate::sync::{SyncConfig, SyncState, TemporalAligner};
use crate::video::{FrameSource, SampledFrames, SourceGuard, SynchronizedFrames};
use crate::{Error, Result};

/// Per-frame object detector and tracker for one view.
pub trait DetectionProvider {
    /// Detections with view-local track ids for one frame.
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<RawDetection>>;
}

/// Pipeline configuration, usually loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub matcher: MatcherConfig,

    pub sync: SyncConfig,

    /// Rate frame pairs are processed at.
    pub processing_fps: f64,

    /// Detections below this confidence are dropped before matching.
    pub detection_confidence: f64,

    pub conflict_policy: ConflictPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig::default(),
            sync: SyncConfig::default(),
            processing_fps: 5.0,
            detection_confidence: 0.4,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn validate(&self) -> Result<()> {
        self.matcher.validate()?;
        self.sync.validate()?;
        if !self.processing_fps.is_finite() || self.processing_fps <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "processing_fps must be finite and positive, got {}",
                self.processing_fps
            )));
        }
        if !(0.0..=1.0).contains(&self.detection_confidence) {
            return Err(Error::InvalidConfig(format!(
                "detection_confidence must be in [0, 1], got {}",
                self.detection_confidence
            )));
        }
        Ok(())
    }
}

/// The external collaborators of one view.
pub struct ViewComponents {
    pub detector: Box<dyn DetectionProvider>,
    pub features: Box<dyn FeatureProvider>,
    pub projector: Box<dyn PlaneProjection>,
}

impl ViewComponents {
    pub fn new(
        detector: Box<dyn DetectionProvider>,
        features: Box<dyn FeatureProvider>,
        projector: Box<dyn PlaneProjection>,
    ) -> Self {
        Self {
            detector,
            features,
            projector,
        }
    }
}

/// A detection resolved to a global identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedDetection {
    pub global_id: GlobalId,
    pub view: View,
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub field_coords: [f64; 2],
}

/// An accepted cross-view correspondence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedPair {
    /// Identity returned by registration.
    pub global_id: GlobalId,
    pub cost: f64,
    pub first: FusedDetection,
    pub second: FusedDetection,
}

/// Fused output for one synchronized frame pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameFusion {
    pub frame_index: usize,
    pub matched: Vec<FusedPair>,
    pub unmatched_first: Vec<FusedDetection>,
    pub unmatched_second: Vec<FusedDetection>,
}

impl FrameFusion {
    /// Global ids present in this frame, ascending and deduplicated.
    pub fn global_ids(&self) -> Vec<GlobalId> {
        let mut ids: Vec<GlobalId> = self
            .matched
            .iter()
            .flat_map(|p| [p.first.global_id, p.second.global_id])
            .chain(self.unmatched_first.iter().map(|d| d.global_id))
            .chain(self.unmatched_second.iter().map(|d| d.global_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Totals of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub sync: SyncState,
    pub frames: usize,
    pub matched_pairs: usize,
    pub identities: usize,
}

/// Two-view identity fusion pipeline.
///
/// Processes one frame pair at a time; the registry is owned here and
/// written only from the thread driving the pipeline.
pub struct CrossViewPipeline {
    config: PipelineConfig,
    aligner: TemporalAligner,
    matcher: CorrespondenceMatcher,
    registry: IdentityRegistry,
    first: ViewComponents,
    second: ViewComponents,
    sync: Option<SyncState>,
    frame_index: usize,
}

impl CrossViewPipeline {
    /// Build a pipeline; configuration errors fail here, before any stream is read.
    pub fn new(config: PipelineConfig, first: ViewComponents, second: ViewComponents) -> Result<Self> {
        config.validate()?;
        let aligner = TemporalAligner::new(config.sync.clone())?;
        let matcher = CorrespondenceMatcher::new(config.matcher.clone())?;
        let registry = IdentityRegistry::with_policy(config.conflict_policy);

        Ok(Self {
            config,
            aligner,
            matcher,
            registry,
            first,
            second,
            sync: None,
            frame_index: 0,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Result of the last synchronization, if any.
    pub fn sync_state(&self) -> Option<&SyncState> {
        self.sync.as_ref()
    }

    /// Align the two streams and remember the result.
    pub fn synchronize(&mut self, first: &mut dyn FrameSource, second: &mut dyn FrameSource) -> Result<SyncState> {
        let state = self.aligner.synchronize(first, second)?;
        self.sync = Some(state.clone());
        Ok(state)
    }

    /// Detect, gate by confidence and extract features for one view.
    pub fn detect_view(&mut self, view: View, frame: &RgbImage) -> Result<Vec<Detection>> {
        let threshold = self.config.detection_confidence;
        let components = match view {
            View::First => &mut self.first,
            View::Second => &mut self.second,
        };

        let raw = components.detector.detect(frame)?;
        let total = raw.len();

        let mut detections = Vec::with_capacity(total);
        for r in raw.iter().filter(|r| r.confidence >= threshold) {
            let features = components.features.extract(frame, &r.bbox, components.projector.as_ref());
            detections.push(Detection::from_raw(view, r)?.with_features(features));
        }

        debug!(%view, total, kept = detections.len(), "detections");
        Ok(detections)
    }

    /// Match two detection lists and resolve every detection to a global id.
    pub fn fuse_detections(&mut self, first: &[Detection], second: &[Detection]) -> Result<FrameFusion> {
        let matches = self.matcher.match_frame(first, second)?;

        let mut matched = Vec::with_capacity(matches.pairs.len());
        for pair in &matches.pairs {
            let a = &first[pair.first];
            let b = &second[pair.second];
            let global_id = self.registry.register(a.key(), b.key());
            matched.push(FusedPair {
                global_id,
                cost: pair.cost,
                first: self.fused(a),
                second: self.fused(b),
            });
        }

        let unmatched_first = matches.unmatched_first.iter().map(|&i| self.fused(&first[i])).collect();
        let unmatched_second = matches.unmatched_second.iter().map(|&i| self.fused(&second[i])).collect();

        let fusion = FrameFusion {
            frame_index: self.frame_index,
            matched,
            unmatched_first,
            unmatched_second,
        };
        self.frame_index += 1;
        Ok(fusion)
    }

    fn fused(&mut self, det: &Detection) -> FusedDetection {
        FusedDetection {
            global_id: self.registry.lookup(det.key()),
            view: det.view,
            track_id: det.track_id,
            bbox: det.bbox,
            confidence: det.confidence,
            field_coords: det.features.field_coords,
        }
    }

    /// Run one synchronized frame pair through the whole pipeline.
    pub fn process_frame(&mut self, first: &RgbImage, second: &RgbImage) -> Result<FrameFusion> {
        let a = self.detect_view(View::First, first)?;
        let b = self.detect_view(View::Second, second)?;
        self.fuse_detections(&a, &b)
    }

    /// Synchronize, then process every aligned frame pair until either
    /// stream ends, passing each fused frame to `sink`.
    pub fn run<F>(&mut self, first: &mut dyn FrameSource, second: &mut dyn FrameSource, mut sink: F) -> Result<RunSummary>
    where
        F: FnMut(&FrameFusion) -> Result<()>,
    {
        let sync = self.synchronize(first, second)?;
        let fps = self.config.processing_fps;

        let mut first = SourceGuard::open(first)?;
        let mut second = SourceGuard::open(second)?;
        let first_frames = SampledFrames::new(&mut *first, fps)?;
        let second_frames = SampledFrames::new(&mut *second, fps)?;
        let offset = sync.offset_at(second_frames.effective_fps());
        info!(
            offset,
            effective_fps = second_frames.effective_fps(),
            "skipping leading frames of second stream"
        );
        let frames = SynchronizedFrames::new(first_frames, second_frames, offset);

        let mut count = 0;
        let mut matched_pairs = 0;
        for pair in frames {
            let (a, b) = pair?;
            let fusion = self.process_frame(&a, &b)?;
            matched_pairs += fusion.matched.len();
            count += 1;
            sink(&fusion)?;
        }

        let summary = RunSummary {
            sync,
            frames: count,
            matched_pairs,
            identities: self.registry.identity_count(),
        };
        info!(
            frames = summary.frames,
            matched_pairs = summary.matched_pairs,
            identities = summary.identities,
            "run complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureKind, FeatureVector};
    use crate::matching::FeatureWeights;
    use crate::projection::IdentityProjection;

    /// Detector that returns the same detections for every frame.
    struct FixedDetector(Vec<RawDetection>);

    impl DetectionProvider for FixedDetector {
        fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<RawDetection>> {
            Ok(self.0.clone())
        }
    }

    /// Field coordinates from the projected foot point, nothing else.
    struct FootPoint;

    impl FeatureProvider for FootPoint {
        fn extract(&mut self, _frame: &RgbImage, bbox: &BoundingBox, projector: &dyn PlaneProjection) -> FeatureVector {
            FeatureVector::zeros().with_field_coords(projector.project(bbox.foot_point()))
        }
    }

    fn view(dets: Vec<RawDetection>) -> ViewComponents {
        ViewComponents::new(Box::new(FixedDetector(dets)), Box::new(FootPoint), Box::new(IdentityProjection))
    }

    fn field_config() -> PipelineConfig {
        PipelineConfig {
            matcher: MatcherConfig {
                weights: FeatureWeights::new([(FeatureKind::FieldCoords, 1.0)]).unwrap(),
                ..MatcherConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    fn raw(x: f64, track_id: u32, confidence: f64) -> RawDetection {
        RawDetection::new(BoundingBox::new(x - 5.0, 0.0, x + 5.0, 100.0), track_id, confidence)
    }

    #[test]
    fn test_invalid_weights_fail_construction() {
        let mut config = PipelineConfig::default();
        config.matcher.weights = serde_json::from_str(r#"{"appearance": 0.9}"#).unwrap();
        assert!(matches!(
            CrossViewPipeline::new(config, view(vec![]), view(vec![])),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_confidence_gating() {
        let mut pipeline = CrossViewPipeline::new(
            field_config(),
            view(vec![raw(10.0, 1, 0.9), raw(50.0, 2, 0.39), raw(90.0, 3, 0.4)]),
            view(vec![]),
        )
        .unwrap();

        let dets = pipeline.detect_view(View::First, &RgbImage::new(4, 4)).unwrap();
        let ids: Vec<u32> = dets.iter().map(|d| d.track_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(dets[0].features.field_coords, [10.0, 100.0]);
    }

    #[test]
    fn test_process_frame_matches_and_registers() {
        let mut pipeline = CrossViewPipeline::new(
            field_config(),
            view(vec![raw(100.0, 1, 0.9), raw(400.0, 2, 0.9)]),
            view(vec![raw(101.0, 7, 0.9)]),
        )
        .unwrap();
        let frame = RgbImage::new(4, 4);

        let fusion = pipeline.process_frame(&frame, &frame).unwrap();
        assert_eq!(fusion.frame_index, 0);
        assert_eq!(fusion.matched.len(), 1);

        let pair = &fusion.matched[0];
        assert_eq!((pair.first.track_id, pair.second.track_id), (1, 7));
        assert_eq!(pair.first.global_id, pair.global_id);
        assert_eq!(pair.second.global_id, pair.global_id);

        assert_eq!(fusion.unmatched_first.len(), 1);
        assert_ne!(fusion.unmatched_first[0].global_id, pair.global_id);

        // Same ids on the next frame
        let next = pipeline.process_frame(&frame, &frame).unwrap();
        assert_eq!(next.frame_index, 1);
        assert_eq!(next.global_ids(), fusion.global_ids());
    }

    #[test]
    fn test_config_json_defaults() {
        let config = PipelineConfig::from_json_str(r#"{"processing_fps": 10}"#).unwrap();
        assert_eq!(config.processing_fps, 10.0);
        assert_eq!(config.detection_confidence, 0.4);
        assert_eq!(config.sync, SyncConfig::default());

        assert!(PipelineConfig::from_json_str(r#"{"processing_fps": -1}"#).is_err());
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{"matcher": {"weights": {"field_coords": 0.5, "color_hist": 0.5}, "max_cost": 0.3},
                "conflict_policy": "merge_lowest"}"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.matcher.max_cost, 0.3);
        assert_eq!(config.matcher.weights.get(FeatureKind::ColorHist), 0.5);
        assert_eq!(config.conflict_policy, ConflictPolicy::MergeLowest);

        assert!(matches!(
            PipelineConfig::from_json_file(dir.path().join("missing.json")),
            Err(Error::IoError(_))
        ));
    }
}
