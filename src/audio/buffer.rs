// Decoded PCM held in memory for the lifetime of a playback session

/// Interleaved f32 samples plus the format needed to interpret them
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTrack {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

impl DecodedTrack {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            samples,
            sample_rate: sample_rate.max(1),
            channels,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of complete frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Total length in seconds
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Iterate over a single channel's samples
    pub fn channel(&self, index: usize) -> impl Iterator<Item = f32> + '_ {
        let index = index.min(self.channels - 1);
        self.samples
            .iter()
            .skip(index)
            .step_by(self.channels)
            .copied()
    }

    /// First channel collected into a contiguous buffer
    pub fn first_channel(&self) -> Vec<f32> {
        self.channel(0).collect()
    }

    /// Frame index for a position in seconds, clamped to the track
    pub fn frame_at(&self, seconds: f64) -> usize {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        let frame = (seconds * self.sample_rate as f64).floor() as usize;
        frame.min(self.frames())
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}
