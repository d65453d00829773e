#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use podsloth_lib::audio::{
    AudioContext, DecodedTrack, GainStage, Player, PlayerEvent, PlayerOptions, SilentContext,
    SourceNode,
};
use podsloth_lib::fetch::{FetchError, TrackFetcher};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

pub const RATE: u32 = 8000;

/// Mono 440 Hz sine at half scale
pub fn sine_wav(seconds: f64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let frames = (seconds * RATE as f64).round() as usize;
        for i in 0..frames {
            let t = i as f32 / RATE as f32;
            let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5;
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Serves registered byte blobs, 404 for everything else
#[derive(Default)]
pub struct MemoryFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
    pub requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn with(self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.lock().insert(url.to_string(), bytes);
        self
    }
}

#[async_trait]
impl TrackFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.lock().push(url.to_string());
        self.files
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

pub const TEN_SECONDS: &str = "https://cdn.example.com/ten.wav";
pub const TWO_SECONDS: &str = "https://cdn.example.com/two.wav";
pub const GARBAGE: &str = "https://cdn.example.com/garbage.mp3";

pub fn fixtures() -> MemoryFetcher {
    MemoryFetcher::default()
        .with(TEN_SECONDS, sine_wav(10.0))
        .with(TWO_SECONDS, sine_wav(2.0))
        .with(GARBAGE, b"definitely not audio".to_vec())
}

/// Silent clock whose sources report completion as soon as they start
pub struct EarlyCompletionContext {
    clock: SilentContext,
}

impl EarlyCompletionContext {
    pub fn new() -> Self {
        Self {
            clock: SilentContext::new().unwrap(),
        }
    }
}

impl AudioContext for EarlyCompletionContext {
    fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    fn suspend(&self) {
        self.clock.suspend()
    }

    fn resume(&self) {
        self.clock.resume()
    }

    fn is_suspended(&self) -> bool {
        self.clock.is_suspended()
    }

    fn start_source(
        &self,
        _track: Arc<DecodedTrack>,
        _offset: f64,
        _gain: GainStage,
    ) -> Result<SourceNode, String> {
        let (tx, rx) = tokio::sync::watch::channel(true);
        Ok(SourceNode::new(rx, move || drop(tx)))
    }
}

pub fn silent_player(fetcher: MemoryFetcher) -> Player {
    player_with(Arc::new(SilentContext::new().unwrap()), fetcher)
}

pub fn player_with(context: Arc<dyn AudioContext>, fetcher: MemoryFetcher) -> Player {
    Player::new(
        context,
        Arc::new(fetcher),
        PlayerOptions {
            poll_interval: Duration::from_millis(200),
            volume: 1.0,
        },
    )
    .unwrap()
}

/// Everything published so far
pub fn drain(events: &mut podsloth_lib::audio::EventSubscription) -> Vec<PlayerEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.try_recv() {
        out.push(event);
    }
    out
}

pub fn offsets(events: &[PlayerEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match event {
            PlayerEvent::TimestampChange { offset, .. } => Some(*offset),
            PlayerEvent::Ended => None,
        })
        .collect()
}

pub fn ended_count(events: &[PlayerEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, PlayerEvent::Ended))
        .count()
}

pub fn approx(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() <= tolerance
}
