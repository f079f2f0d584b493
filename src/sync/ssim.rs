//! Structural similarity between downsampled grayscale frames.
//!
//! Scores follow the usual reference defaults for 8-bit images: a 7×7
//! uniform window, K1 = 0.01, K2 = 0.03, a data range of 255 and
//! sample (N - 1) covariance. The score is the mean of the per-window
//! similarity over all windows that lie fully inside the image. Window sums
//! come from integral images, so each frame's own sums are computed once.

use image::{imageops, GrayImage, RgbImage};

use crate::{Error, Result};

/// Side length of the square comparison window.
pub const WINDOW: usize = 7;

const K1: f64 = 0.01;
const K2: f64 = 0.03;
const DATA_RANGE: f64 = 255.0;

/// A grayscale, downsampled frame used only for alignment scoring.
#[derive(Debug, Clone)]
pub struct FrameSample {
    width: usize,
    height: usize,
    pixels: Vec<f64>,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl FrameSample {
    /// Convert a color frame to grayscale and resize it to `width × height`.
    pub fn from_rgb(frame: &RgbImage, width: u32, height: u32) -> Self {
        let gray = GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
            let [r, g, b] = frame.get_pixel(x, y).0;
            let luma = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
            image::Luma([luma.round().clamp(0.0, 255.0) as u8])
        });
        let resized = if gray.dimensions() == (width, height) {
            gray
        } else {
            imageops::resize(&gray, width, height, imageops::FilterType::Triangle)
        };
        Self::from_gray(&resized)
    }

    pub fn from_gray(image: &GrayImage) -> Self {
        let pixels = image.pixels().map(|p| p.0[0] as f64).collect();
        Self::from_values(image.width() as usize, image.height() as usize, pixels)
    }

    /// Build from row-major intensity values.
    pub fn from_values(width: usize, height: usize, pixels: Vec<f64>) -> Self {
        debug_assert_eq!(pixels.len(), width * height);
        let sum = integral(width, height, |i| pixels[i]);
        let sum_sq = integral(width, height, |i| pixels[i] * pixels[i]);
        Self {
            width,
            height,
            pixels,
            sum,
            sum_sq,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

/// Integral image of size `(width + 1) × (height + 1)`.
fn integral(width: usize, height: usize, value: impl Fn(usize) -> f64) -> Vec<f64> {
    let stride = width + 1;
    let mut out = vec![0.0; stride * (height + 1)];
    for y in 0..height {
        let mut row = 0.0;
        for x in 0..width {
            row += value(y * width + x);
            out[(y + 1) * stride + x + 1] = out[y * stride + x + 1] + row;
        }
    }
    out
}

#[inline]
fn window_sum(table: &[f64], stride: usize, x: usize, y: usize) -> f64 {
    let (x1, y1) = (x + WINDOW, y + WINDOW);
    table[y1 * stride + x1] - table[y * stride + x1] - table[y1 * stride + x] + table[y * stride + x]
}

/// Mean structural similarity of two samples.
///
/// Identical samples score 1.0.
///
/// # Errors
/// `InvalidConfig` if the samples differ in size or are smaller than the window.
pub fn ssim(a: &FrameSample, b: &FrameSample) -> Result<f64> {
    if a.width != b.width || a.height != b.height {
        return Err(Error::InvalidConfig(format!(
            "cannot compare {}x{} sample with {}x{} sample",
            a.width, a.height, b.width, b.height
        )));
    }
    if a.width < WINDOW || a.height < WINDOW {
        return Err(Error::InvalidConfig(format!(
            "samples must be at least {}x{}, got {}x{}",
            WINDOW, WINDOW, a.width, a.height
        )));
    }

    let (w, h) = (a.width, a.height);
    let stride = w + 1;
    let cross = integral(w, h, |i| a.pixels[i] * b.pixels[i]);

    let np = (WINDOW * WINDOW) as f64;
    let cov_norm = np / (np - 1.0);
    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);

    let mut total = 0.0;
    for y in 0..=(h - WINDOW) {
        for x in 0..=(w - WINDOW) {
            let ux = window_sum(&a.sum, stride, x, y) / np;
            let uy = window_sum(&b.sum, stride, x, y) / np;
            let uxx = window_sum(&a.sum_sq, stride, x, y) / np;
            let uyy = window_sum(&b.sum_sq, stride, x, y) / np;
            let uxy = window_sum(&cross, stride, x, y) / np;

            let vx = cov_norm * (uxx - ux * ux);
            let vy = cov_norm * (uyy - uy * uy);
            let vxy = cov_norm * (uxy - ux * uy);

            let num = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
            let den = (ux * ux + uy * uy + c1) * (vx + vy + c2);
            total += num / den;
        }
    }

    let windows = ((w - WINDOW + 1) * (h - WINDOW + 1)) as f64;
    Ok(total / windows)
}
