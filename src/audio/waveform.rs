// Waveform rendering
// Peak envelope of the first channel drawn as a mirrored filled shape

use image::{ImageFormat, Rgba, RgbaImage};
use std::path::Path;

/// Normalization floor so a silent buffer still renders a flat line
const MIN_PEAK: f32 = 0.01;

const FILL: Rgba<u8> = Rgba([255, 0, 0, 255]);
const DEFAULT_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Per-column peak magnitudes in [0, 1], normalized against the loudest sample
///
/// Columns are handled in adjacent pairs; both columns of a pair take the
/// largest magnitude found in the input range the pair covers.
pub fn compute_envelope(samples: &[f32], width: usize) -> Vec<f32> {
    let mut envelope = vec![0.0; width];
    if width == 0 || samples.is_empty() {
        return envelope;
    }

    let len = samples.len();
    let max_peak = samples
        .iter()
        .fold(0.0f32, |acc, s| acc.max(s.abs()))
        .max(MIN_PEAK);

    for i in (0..width).step_by(2) {
        let start = i * len / width;
        if start >= len {
            break;
        }
        let end = ((i + 2).min(width) * len / width).clamp(start + 1, len);

        let peak = samples[start..end]
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        let normalized = (peak / max_peak).min(1.0);

        envelope[i] = normalized;
        if i + 1 < width {
            envelope[i + 1] = normalized;
        }
    }

    envelope
}

/// Bitmap surface the waveform is drawn onto
pub struct WaveformCanvas {
    layout_width: u32,
    layout_height: u32,
    image: RgbaImage,
    background: Rgba<u8>,
    allocations: usize,
}

impl WaveformCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            layout_width: width,
            layout_height: height,
            image: RgbaImage::new(width, height),
            background: DEFAULT_BACKGROUND,
            allocations: 1,
        }
    }

    /// Record the size the surface is currently displayed at
    pub fn set_layout_size(&mut self, width: u32, height: u32) {
        self.layout_width = width;
        self.layout_height = height;
    }

    pub fn layout_size(&self) -> (u32, u32) {
        (self.layout_width, self.layout_height)
    }

    /// How many times the backing bitmap has been allocated
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Draw the envelope of `samples`, matching the backing bitmap to the layout size first
    pub fn render(&mut self, samples: &[f32]) {
        if self.image.dimensions() != (self.layout_width, self.layout_height) {
            self.image = RgbaImage::new(self.layout_width, self.layout_height);
            self.allocations += 1;
        }

        let (width, height) = self.image.dimensions();
        for pixel in self.image.pixels_mut() {
            *pixel = self.background;
        }
        if width == 0 || height == 0 {
            return;
        }

        let envelope = compute_envelope(samples, width as usize);
        let mid = height as f32 * 0.5;

        for (x, &peak) in envelope.iter().enumerate() {
            let amplitude = peak * mid;
            let top = (mid - amplitude).floor().max(0.0) as u32;
            let bottom = ((mid + amplitude).ceil() as u32).min(height);
            // Always at least the centre row
            let bottom = bottom.max(top + 1).min(height);

            for y in top..bottom {
                self.image.put_pixel(x as u32, y, FILL);
            }
        }
    }

    pub fn save_png(&self, path: &Path) -> Result<(), String> {
        self.image
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| format!("Failed to write waveform image: {}", e))
    }
}
