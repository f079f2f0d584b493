//! Offset search between a reference and a search window.

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use super::ssim::{ssim, FrameSample};
use super::{SearchStrategy, SyncConfig, SyncFailure, SyncState};
use crate::video::{FrameSource, SampledFrames, SourceGuard};
use crate::{Error, Result};

/// Finds the frame offset between two streams.
///
/// Implementations open and close the sources themselves and must leave both
/// closed on return, whether they succeed or fail.
pub trait SynchronizationStrategy {
    fn find_offset(&self, first: &mut dyn FrameSource, second: &mut dyn FrameSource) -> Result<SyncState>;
}

/// Mean SSIM of `reference[i]` against `search[i + offset]` over the whole reference.
pub fn mean_ssim_at(reference: &[FrameSample], search: &[FrameSample], offset: usize) -> Result<f64> {
    let mut total = 0.0;
    for (i, r) in reference.iter().enumerate() {
        total += ssim(r, &search[i + offset])?;
    }
    Ok(total / reference.len() as f64)
}

/// Mean SSIM for every offset in `0..=search.len() - reference.len()`.
pub fn score_offsets(reference: &[FrameSample], search: &[FrameSample]) -> Result<Vec<f64>> {
    if reference.is_empty() || search.len() < reference.len() {
        return Ok(Vec::new());
    }
    (0..=search.len() - reference.len())
        .map(|o| mean_ssim_at(reference, search, o))
        .collect()
}

/// First offset with the highest score among those evaluated.
fn first_max(scores: &BTreeMap<usize, f64>) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (&offset, &score) in scores {
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((offset, score));
        }
    }
    best
}

/// Offset with the highest mean SSIM and that score.
///
/// Ties resolve to the smallest offset. `None` when the reference is empty or
/// longer than the search window.
pub fn best_offset(
    reference: &[FrameSample],
    search: &[FrameSample],
    strategy: SearchStrategy,
) -> Result<Option<(usize, f64)>> {
    if reference.is_empty() || search.len() < reference.len() {
        return Ok(None);
    }
    let max_offset = search.len() - reference.len();
    let mut scores = BTreeMap::new();

    match strategy {
        SearchStrategy::Exhaustive => {
            for (o, s) in score_offsets(reference, search)?.into_iter().enumerate() {
                scores.insert(o, s);
            }
        }
        SearchStrategy::CoarseToFine { stride } => {
            let stride = stride.max(1);
            let mut coarse: Vec<usize> = (0..=max_offset).step_by(stride).collect();
            if coarse.last() != Some(&max_offset) {
                coarse.push(max_offset);
            }
            for o in coarse {
                scores.insert(o, mean_ssim_at(reference, search, o)?);
            }

            if let Some((center, _)) = first_max(&scores) {
                let lo = center.saturating_sub(stride - 1);
                let hi = (center + stride - 1).min(max_offset);
                for o in lo..=hi {
                    if !scores.contains_key(&o) {
                        scores.insert(o, mean_ssim_at(reference, search, o)?);
                    }
                }
            }
        }
    }

    Ok(first_max(&scores))
}

/// Alignment by mean structural similarity over sliding windows.
#[derive(Debug, Clone)]
pub struct SsimSynchronization {
    config: SyncConfig,
}

impl SsimSynchronization {
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Open `source`, read up to `frames` samples at the comparison rate and close it.
    ///
    /// Also returns the rate the samples were actually taken at.
    fn sample_window(&self, source: &mut dyn FrameSource, frames: usize) -> Result<(Vec<FrameSample>, f64)> {
        let mut guard = SourceGuard::open(source)?;
        let sampled = SampledFrames::new(&mut *guard, self.config.comparison_fps)?;
        let effective_fps = sampled.effective_fps();

        let (width, height) = (self.config.sample_width, self.config.sample_height);
        let window: Result<Vec<FrameSample>> = sampled
            .take(frames)
            .map(|frame| frame.map(|f| FrameSample::from_rgb(&f, width, height)))
            .collect();
        Ok((window?, effective_fps))
    }
}

impl SynchronizationStrategy for SsimSynchronization {
    fn find_offset(&self, first: &mut dyn FrameSource, second: &mut dyn FrameSource) -> Result<SyncState> {
        let fps = self.config.comparison_fps;

        info!(seconds = self.config.reference_seconds, "sampling reference window from first stream");
        let (reference, _) = self.sample_window(first, self.config.reference_frames())?;
        if reference.is_empty() {
            error!("could not read any frames from the first stream");
            return Ok(SyncState::failed(SyncFailure::EmptyReference, fps));
        }

        info!(seconds = self.config.search_seconds, "sampling search window from second stream");
        let (search, fps) = self.sample_window(second, self.config.search_frames())?;
        if search.is_empty() {
            error!("could not read any frames from the second stream");
            return Ok(SyncState::failed(SyncFailure::EmptySearch, fps));
        }
        if fps != self.config.comparison_fps {
            warn!(
                requested = self.config.comparison_fps,
                effective = fps,
                "second stream sampled at a different rate than requested"
            );
        }

        if search.len() < reference.len() {
            error!(
                reference = reference.len(),
                search = search.len(),
                "search window is shorter than the reference window"
            );
            return Ok(SyncState::failed(
                SyncFailure::SearchShorterThanReference {
                    reference: reference.len(),
                    search: search.len(),
                },
                fps,
            ));
        }

        info!(
            max_offset = search.len() - reference.len(),
            strategy = ?self.config.search,
            "comparing sequences"
        );

        match best_offset(&reference, &search, self.config.search)? {
            Some((offset, confidence)) => Ok(SyncState::aligned(offset as i64, confidence.clamp(0.0, 1.0), fps)),
            None => Ok(SyncState::failed(
                SyncFailure::SearchShorterThanReference {
                    reference: reference.len(),
                    search: search.len(),
                },
                fps,
            )),
        }
    }
}

/// Runs synchronization once, before the main loop, and judges the result.
pub struct TemporalAligner {
    config: SyncConfig,
    strategy: Box<dyn SynchronizationStrategy>,
}

impl TemporalAligner {
    /// Aligner using SSIM window search.
    ///
    /// # Errors
    /// `InvalidConfig` if the configuration is invalid.
    pub fn new(config: SyncConfig) -> Result<Self> {
        let strategy = SsimSynchronization::new(config.clone())?;
        Ok(Self {
            config,
            strategy: Box::new(strategy),
        })
    }

    /// Aligner with a custom strategy; `config` still governs the confidence check.
    pub fn with_strategy(config: SyncConfig, strategy: Box<dyn SynchronizationStrategy>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, strategy })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Estimate how many frames `second` leads `first`.
    ///
    /// Both sources are closed when this returns. A failed alignment is
    /// reported through [`SyncState::failure`] with offset 0 and confidence 0.
    /// Confidence below `min_confidence` is a warning, or an error in strict mode.
    ///
    /// # Errors
    /// Stream errors from either source, and `LowSyncConfidence` in strict mode.
    pub fn synchronize(&self, first: &mut dyn FrameSource, second: &mut dyn FrameSource) -> Result<SyncState> {
        let state = self.strategy.find_offset(first, second)?;

        if state.is_failure() {
            warn!(failure = ?state.failure, "synchronization failed, falling back to offset 0");
        } else {
            info!(
                offset = state.offset_frames,
                confidence = state.confidence,
                "synchronization complete"
            );
        }

        if state.confidence < self.config.min_confidence {
            if self.config.strict {
                return Err(Error::LowSyncConfidence {
                    confidence: state.confidence,
                    threshold: self.config.min_confidence,
                });
            }
            warn!(
                confidence = state.confidence,
                threshold = self.config.min_confidence,
                "sync confidence is low"
            );
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::MemoryFrameSource;
    use approx::assert_relative_eq;
    use image::{Rgb, RgbImage};

    /// Frames whose texture changes with `t`, so every frame is distinct.
    fn scene(t: u32) -> RgbImage {
        RgbImage::from_fn(32, 18, |x, y| {
            let v = ((x * 7 + y * 13 + t * 29) ^ (t * 3 + x * y)) % 256;
            Rgb([v as u8, (v / 2) as u8, (255 - v) as u8])
        })
    }

    fn stream(range: std::ops::Range<u32>) -> Vec<RgbImage> {
        range.map(scene).collect()
    }

    fn small_config() -> SyncConfig {
        SyncConfig {
            reference_seconds: 1.0,
            search_seconds: 2.0,
            comparison_fps: 5.0,
            sample_width: 32,
            sample_height: 18,
            ..SyncConfig::default()
        }
    }

    fn samples(frames: &[RgbImage]) -> Vec<FrameSample> {
        frames.iter().map(|f| FrameSample::from_rgb(f, 32, 18)).collect()
    }

    #[test]
    fn test_identical_sequences_offset_zero() {
        let mut a = MemoryFrameSource::new(stream(0..10), 5.0);
        let mut b = MemoryFrameSource::new(stream(0..10), 5.0);
        let aligner = TemporalAligner::new(small_config()).unwrap();

        let state = aligner.synchronize(&mut a, &mut b).unwrap();
        assert_eq!(state.offset_frames, 0);
        assert_relative_eq!(state.confidence, 1.0, epsilon = 1e-9);
        assert!(!a.is_open() && !b.is_open());
    }

    #[test]
    fn test_detects_known_offset() {
        // Second stream starts 3 frames earlier, so it leads by 3
        let mut a = MemoryFrameSource::new(stream(3..20), 5.0);
        let mut b = MemoryFrameSource::new(stream(0..20), 5.0);
        let aligner = TemporalAligner::new(small_config()).unwrap();

        let state = aligner.synchronize(&mut a, &mut b).unwrap();
        assert_eq!(state.offset_frames, 3);
        assert_relative_eq!(state.confidence, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_offset_counted_at_effective_rate() {
        // 25 fps sampled "at 15 fps" keeps every frame, so the window really
        // runs at 25 fps and the offset must be rescaled from there.
        let mut a = MemoryFrameSource::new(stream(10..60), 25.0);
        let mut b = MemoryFrameSource::new(stream(0..60), 25.0);
        let config = SyncConfig {
            comparison_fps: 15.0,
            ..small_config()
        };
        let aligner = TemporalAligner::new(config).unwrap();

        let state = aligner.synchronize(&mut a, &mut b).unwrap();
        assert_eq!(state.offset_frames, 10);
        assert_relative_eq!(state.comparison_fps, 25.0);
        assert_eq!(state.offset_at(5.0), 2);
        assert_eq!(state.offset_at(25.0), 10);
    }

    #[test]
    fn test_confidence_never_negative() {
        // Inverted frames correlate negatively with the reference
        let inverted: Vec<RgbImage> = stream(0..10)
            .into_iter()
            .map(|mut f| {
                image::imageops::invert(&mut f);
                f
            })
            .collect();
        let mut a = MemoryFrameSource::new(stream(0..10), 5.0);
        let mut b = MemoryFrameSource::new(inverted, 5.0);
        let aligner = TemporalAligner::new(small_config()).unwrap();

        let state = aligner.synchronize(&mut a, &mut b).unwrap();
        assert!((0.0..=1.0).contains(&state.confidence));
    }

    #[test]
    fn test_coarse_to_fine_matches_exhaustive() {
        let reference = samples(&stream(4..9));
        let search = samples(&stream(0..10));

        let exhaustive = best_offset(&reference, &search, SearchStrategy::Exhaustive).unwrap();
        let coarse = best_offset(&reference, &search, SearchStrategy::CoarseToFine { stride: 2 }).unwrap();
        assert_eq!(exhaustive.map(|b| b.0), Some(4));
        assert_eq!(coarse.map(|b| b.0), Some(4));
    }

    #[test]
    fn test_score_offsets_inclusive_range() {
        let reference = samples(&stream(0..3));
        let search = samples(&stream(0..5));
        assert_eq!(score_offsets(&reference, &search).unwrap().len(), 3);

        // Equal lengths still evaluate offset 0
        assert_eq!(score_offsets(&reference, &reference).unwrap().len(), 1);
    }

    #[test]
    fn test_ties_pick_first_offset() {
        let frame = scene(0);
        let reference = samples(&[frame.clone(), frame.clone()]);
        let search = samples(&[frame.clone(), frame.clone(), frame.clone(), frame]);
        let best = best_offset(&reference, &search, SearchStrategy::Exhaustive).unwrap();
        assert_eq!(best.map(|b| b.0), Some(0));
    }

    #[test]
    fn test_empty_reference_is_soft_failure() {
        let mut a = MemoryFrameSource::new(Vec::new(), 5.0);
        let mut b = MemoryFrameSource::new(stream(0..10), 5.0);
        let aligner = TemporalAligner::new(small_config()).unwrap();

        let state = aligner.synchronize(&mut a, &mut b).unwrap();
        assert_eq!(state.failure, Some(SyncFailure::EmptyReference));
        assert_eq!((state.offset_frames, state.confidence), (0, 0.0));
        assert!(!a.is_open() && !b.is_open());
    }

    #[test]
    fn test_short_search_is_soft_failure() {
        let mut a = MemoryFrameSource::new(stream(0..10), 5.0);
        let mut b = MemoryFrameSource::new(stream(0..2), 5.0);
        let aligner = TemporalAligner::new(small_config()).unwrap();

        let state = aligner.synchronize(&mut a, &mut b).unwrap();
        assert_eq!(
            state.failure,
            Some(SyncFailure::SearchShorterThanReference { reference: 5, search: 2 })
        );
    }

    #[test]
    fn test_strict_mode_rejects_low_confidence() {
        let mut a = MemoryFrameSource::new(Vec::new(), 5.0);
        let mut b = MemoryFrameSource::new(stream(0..10), 5.0);
        let config = SyncConfig {
            strict: true,
            ..small_config()
        };
        let aligner = TemporalAligner::new(config).unwrap();

        assert!(matches!(
            aligner.synchronize(&mut a, &mut b),
            Err(Error::LowSyncConfidence { .. })
        ));
    }

    #[test]
    fn test_unknown_rate_is_stream_error_and_closes() {
        let mut a = MemoryFrameSource::new(stream(0..5), 0.0);
        let mut b = MemoryFrameSource::new(stream(0..10), 5.0);
        let aligner = TemporalAligner::new(small_config()).unwrap();

        assert!(matches!(aligner.synchronize(&mut a, &mut b), Err(Error::StreamError(_))));
        assert!(!a.is_open());
    }
}
