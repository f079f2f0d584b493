//! # crossview - Cross-camera identity fusion
//!
//! Fuses two unsynchronized, differently-angled camera streams of the same
//! event into a single stream of globally-consistent object identities.
//!
//! ## Features
//!
//! - Blind temporal alignment of two frame sequences (mean SSIM offset search)
//! - Pixel-to-field homography estimation with RANSAC
//! - Weighted multi-feature cost matrices solved by optimal bipartite assignment
//! - Persistent cross-camera identity bookkeeping
//!
//! Object detection, re-identification networks, video decoding and rendering
//! are external collaborators plugged in through the [`pipeline::DetectionProvider`],
//! [`features::FeatureProvider`] and [`video::FrameSource`] traits.
//!
//! ## Example
//!
//! ```rust,ignore
//! use crossview_rs::{CorrespondenceMatcher, MatcherConfig, IdentityRegistry};
//!
//! let matcher = CorrespondenceMatcher::new(MatcherConfig::default())?;
//! let mut registry = IdentityRegistry::new();
//!
//! let matches = matcher.match_frame(&view1_detections, &view2_detections)?;
//! for pair in &matches.pairs {
//!     let a = view1_detections[pair.first].key();
//!     let b = view2_detections[pair.second].key();
//!     let global_id = registry.register(a, b);
//! }
//! ```

// Internal modules (ports of scipy/numpy routines)
pub(crate) mod internal;

// Public modules
pub mod detection;
pub mod features;
pub mod distances;
pub mod matching;
pub mod identity;
pub mod projection;
pub mod sync;
pub mod video;
pub mod pipeline;

// Re-exports for convenience
pub use detection::{BoundingBox, Detection, IdentityKey, RawDetection, TrackId, View};
pub use features::{FeatureKind, FeatureProvider, FeatureVector};
pub use distances::{distance_by_name, FeatureDistance, FeatureDistanceFunction};
pub use matching::{CorrespondenceMatcher, FeatureWeights, FrameMatches, MatchedPair, MatcherConfig};
pub use identity::{ConflictPolicy, GlobalId, IdentityRegistry};
pub use projection::{GeometricProjector, PlaneProjection};
pub use sync::{SyncConfig, SyncState, TemporalAligner};
pub use video::FrameSource;
pub use pipeline::{CrossViewPipeline, DetectionProvider, FrameFusion, PipelineConfig};

// Error types
pub use crate::error::{Error, Result};

mod error {
    use thiserror::Error;

    /// Errors that can occur in the crossview library
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Invalid detection: {0}")]
        InvalidDetection(String),

        #[error("Invalid points shape: expected {expected}, got {got}")]
        InvalidPointsShape { expected: String, got: String },

        #[error("Calibration error: {0}")]
        CalibrationError(String),

        #[error("Stream error: {0}")]
        StreamError(String),

        #[error("Synchronization confidence {confidence:.3} is below the required {threshold:.3}")]
        LowSyncConfidence { confidence: f64, threshold: f64 },

        #[error("Assignment error: {0}")]
        AssignmentError(String),

        #[error("Unknown distance function: {0}")]
        UnknownDistance(String),

        #[error("Image error: {0}")]
        ImageError(#[from] image::ImageError),

        #[error("JSON error: {0}")]
        JsonError(#[from] serde_json::Error),

        #[error("IO error: {0}")]
        IoError(#[from] std::io::Error),
    }

    /// Result type for crossview operations
    pub type Result<T> = std::result::Result<T, Error>;
}
