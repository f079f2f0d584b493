//! Blind temporal alignment of two video streams.
//!
//! A short reference window from the first stream is slid over a longer
//! search window from the second stream; the offset with the highest mean
//! structural similarity wins and that similarity is reported as the
//! confidence.

mod aligner;
mod ssim;

pub use aligner::{best_offset, mean_ssim_at, score_offsets, SsimSynchronization, SynchronizationStrategy, TemporalAligner};
pub use ssim::{ssim, FrameSample, WINDOW};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How candidate offsets are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Score every offset.
    Exhaustive,

    /// Score every `stride`-th offset, then every offset around the best one.
    CoarseToFine { stride: usize },
}

impl Default for SearchStrategy {
    fn default() -> Self {
        SearchStrategy::Exhaustive
    }
}

/// Configuration for [`TemporalAligner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Length of the reference window sampled from the first stream.
    pub reference_seconds: f64,

    /// Length of the search window sampled from the second stream.
    pub search_seconds: f64,

    /// Rate both windows are sampled at; offsets are counted in these frames.
    pub comparison_fps: f64,

    /// Width frames are downsampled to before scoring.
    pub sample_width: u32,

    /// Height frames are downsampled to before scoring.
    pub sample_height: u32,

    /// Below this confidence the offset is reported as untrustworthy.
    pub min_confidence: f64,

    /// Fail with `LowSyncConfidence` instead of warning.
    pub strict: bool,

    pub search: SearchStrategy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reference_seconds: 5.0,
            search_seconds: 10.0,
            comparison_fps: 15.0,
            sample_width: 320,
            sample_height: 180,
            min_confidence: 0.5,
            strict: false,
            search: SearchStrategy::Exhaustive,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(Error::InvalidConfig(format!("{} must be finite and positive, got {}", name, v)))
            }
        };
        positive("reference_seconds", self.reference_seconds)?;
        positive("search_seconds", self.search_seconds)?;
        positive("comparison_fps", self.comparison_fps)?;

        if self.search_seconds <= self.reference_seconds {
            return Err(Error::InvalidConfig(format!(
                "search window ({}s) must be longer than the reference window ({}s)",
                self.search_seconds, self.reference_seconds
            )));
        }
        if (self.sample_width as usize) < WINDOW || (self.sample_height as usize) < WINDOW {
            return Err(Error::InvalidConfig(format!(
                "sample size must be at least {}x{}, got {}x{}",
                WINDOW, WINDOW, self.sample_width, self.sample_height
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(Error::InvalidConfig(format!(
                "min_confidence must be in [0, 1], got {}",
                self.min_confidence
            )));
        }
        if let SearchStrategy::CoarseToFine { stride: 0 } = self.search {
            return Err(Error::InvalidConfig("coarse-to-fine stride must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Frames in the reference window.
    pub fn reference_frames(&self) -> usize {
        (self.reference_seconds * self.comparison_fps).ceil() as usize
    }

    /// Frames in the search window.
    pub fn search_frames(&self) -> usize {
        (self.search_seconds * self.comparison_fps).ceil() as usize
    }
}

/// Why alignment could not produce an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFailure {
    /// No frames could be read from the first stream.
    EmptyReference,

    /// No frames could be read from the second stream.
    EmptySearch,

    /// The second stream ended before covering the reference window.
    SearchShorterThanReference { reference: usize, search: usize },
}

/// Outcome of temporal alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Frames (at `comparison_fps`) the second stream leads the first.
    pub offset_frames: i64,

    /// Mean similarity at the chosen offset, clamped to [0, 1].
    pub confidence: f64,

    /// Rate the second stream was actually sampled at during the search, and
    /// so the rate `offset_frames` is counted at. Equals the configured
    /// comparison rate only when the native rate divides evenly.
    pub comparison_fps: f64,

    /// Set when alignment failed; offset and confidence are then 0.
    pub failure: Option<SyncFailure>,
}

impl SyncState {
    pub fn aligned(offset_frames: i64, confidence: f64, comparison_fps: f64) -> Self {
        Self {
            offset_frames,
            confidence,
            comparison_fps,
            failure: None,
        }
    }

    pub fn failed(failure: SyncFailure, comparison_fps: f64) -> Self {
        Self {
            offset_frames: 0,
            confidence: 0.0,
            comparison_fps,
            failure: Some(failure),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// The offset rescaled to a stream sampled at `fps`, rounded to the
    /// nearest frame and never negative.
    ///
    /// `fps` must be the effective rate of that stream (see
    /// [`SampledFrames::effective_fps`](crate::video::SampledFrames::effective_fps)),
    /// not the requested one.
    pub fn offset_at(&self, fps: f64) -> usize {
        if self.comparison_fps <= 0.0 || !fps.is_finite() || fps <= 0.0 {
            return 0;
        }
        (self.offset_frames as f64 * fps / self.comparison_fps).round().max(0.0) as usize
    }
}
