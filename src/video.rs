//! Frame sources and pull-based frame sequences.
//!
//! A [`FrameSource`] is an opened, single-pass stream of decoded frames.
//! [`SampledFrames`] pulls from it at a requested rate and
//! [`SynchronizedFrames`] pairs two sampled streams after skipping the
//! synchronization offset in the second. Exhaustion of either stream ends
//! iteration cleanly.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// File extensions picked up by [`ImageSequenceSource`].
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// A decoded video stream.
///
/// Frames can only be read while the source is open. Reopening a source
/// restarts it from the first frame.
pub trait FrameSource {
    /// Open (or reopen) the source at its first frame.
    fn open(&mut self) -> Result<()>;

    /// Release decoding resources. Closing a closed source does nothing.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Native frame rate, or 0.0 when unknown.
    fn native_fps(&self) -> f64;

    /// Read the next frame; `Ok(None)` at end of stream.
    ///
    /// # Errors
    /// `StreamError` when the source is not open or decoding fails.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Keeps a source open for its lifetime and closes it on drop, on every exit path.
pub struct SourceGuard<'a> {
    source: &'a mut dyn FrameSource,
}

impl<'a> SourceGuard<'a> {
    pub fn open(source: &'a mut dyn FrameSource) -> Result<Self> {
        source.open()?;
        Ok(Self { source })
    }
}

impl<'a> Deref for SourceGuard<'a> {
    type Target = dyn FrameSource + 'a;

    fn deref(&self) -> &Self::Target {
        self.source
    }
}

impl<'a> DerefMut for SourceGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.source
    }
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        debug!("closing frame source");
        self.source.close();
    }
}

/// Number of native frames per sampled frame.
///
/// Truncates `native / requested` and never goes below 1, so requesting more
/// than the native rate yields every frame.
pub fn frame_interval(native_fps: f64, requested_fps: f64) -> usize {
    ((native_fps / requested_fps) as usize).max(1)
}

/// Frames of one source sampled at a requested rate.
pub struct SampledFrames<'a> {
    source: &'a mut dyn FrameSource,
    native_fps: f64,
    interval: usize,
    counter: usize,
    done: bool,
}

impl<'a> SampledFrames<'a> {
    /// Start sampling an open source.
    ///
    /// # Errors
    /// - `StreamError` if the source is not open or its native rate is unknown
    /// - `InvalidConfig` if `fps` is not positive
    pub fn new(source: &'a mut dyn FrameSource, fps: f64) -> Result<Self> {
        if !source.is_open() {
            return Err(Error::StreamError("frame source is not open".to_string()));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(Error::InvalidConfig(format!("sampling rate must be positive, got {}", fps)));
        }
        let native = source.native_fps();
        if !native.is_finite() || native <= 0.0 {
            return Err(Error::StreamError(format!(
                "native frame rate of source is unknown ({})",
                native
            )));
        }

        let interval = frame_interval(native, fps);
        debug!(native, fps, interval, "sampling frames");

        Ok(Self {
            source,
            native_fps: native,
            interval,
            counter: 0,
            done: false,
        })
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Rate frames are actually yielded at, `native / interval`.
    ///
    /// Differs from the requested rate whenever the native rate is not an
    /// exact multiple of it.
    pub fn effective_fps(&self) -> f64 {
        self.native_fps / self.interval as f64
    }
}

impl Iterator for SampledFrames<'_> {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.source.read_frame() {
                Ok(Some(frame)) => {
                    let keep = self.counter % self.interval == 0;
                    self.counter += 1;
                    if keep {
                        return Some(Ok(frame));
                    }
                }
                Ok(None) => {
                    debug!(frames = self.counter, "end of stream");
                    self.done = true;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Pairs of frames from two sampled streams, the second advanced by an offset.
pub struct SynchronizedFrames<'a> {
    first: SampledFrames<'a>,
    second: SampledFrames<'a>,
    pending_skip: usize,
    done: bool,
}

impl<'a> SynchronizedFrames<'a> {
    /// `offset` sampled frames are dropped from `second` before pairing.
    pub fn new(first: SampledFrames<'a>, second: SampledFrames<'a>, offset: usize) -> Self {
        info!(offset, "starting synchronized frame stream");
        Self {
            first,
            second,
            pending_skip: offset,
            done: false,
        }
    }

    fn skip_offset(&mut self) -> Option<Result<()>> {
        while self.pending_skip > 0 {
            match self.second.next() {
                Some(Ok(_)) => self.pending_skip -= 1,
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    warn!(
                        remaining = self.pending_skip,
                        "offset is larger than the second stream, no frames to pair"
                    );
                    return None;
                }
            }
        }
        Some(Ok(()))
    }
}

impl Iterator for SynchronizedFrames<'_> {
    type Item = Result<(RgbImage, RgbImage)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.skip_offset() {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                self.done = true;
                return Some(Err(e));
            }
            None => {
                self.done = true;
                return None;
            }
        }

        let pair = match (self.first.next(), self.second.next()) {
            (Some(Ok(a)), Some(Ok(b))) => Some(Ok((a, b))),
            (Some(Err(e)), _) | (_, Some(Err(e))) => Some(Err(e)),
            _ => {
                info!("end of one or both streams reached");
                None
            }
        };
        if !matches!(pair, Some(Ok(_))) {
            self.done = true;
        }
        pair
    }
}

/// In-memory frame source.
#[derive(Debug, Clone)]
pub struct MemoryFrameSource {
    frames: Vec<RgbImage>,
    fps: f64,
    cursor: usize,
    open: bool,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        Self {
            frames,
            fps,
            cursor: 0,
            open: false,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for MemoryFrameSource {
    fn open(&mut self) -> Result<()> {
        self.cursor = 0;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn native_fps(&self) -> f64 {
        self.fps
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if !self.open {
            return Err(Error::StreamError("frame source is not open".to_string()));
        }
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }
}

/// A directory of image files decoded in file-name order.
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    dir: PathBuf,
    fps: f64,
    paths: Vec<PathBuf>,
    cursor: usize,
    open: bool,
}

impl ImageSequenceSource {
    /// `fps` is the rate the sequence was captured at.
    pub fn new(dir: impl AsRef<Path>, fps: f64) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            fps,
            paths: Vec::new(),
            cursor: 0,
            open: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<()> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();

        info!(dir = %self.dir.display(), frames = paths.len(), "opened image sequence");
        self.paths = paths;
        self.cursor = 0;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.paths.clear();
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn native_fps(&self) -> f64 {
        self.fps
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if !self.open {
            return Err(Error::StreamError(format!(
                "image sequence {} is not open",
                self.dir.display()
            )));
        }
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        let frame = image::open(path)?.to_rgb8();
        self.cursor += 1;
        Ok(Some(frame))
    }
}
