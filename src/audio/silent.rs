// Context without an output device
// Keeps the same clock and source semantics as the real output, driven by tokio time

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;

use super::buffer::DecodedTrack;
use super::context::{AudioContext, GainStage, SourceNode};

#[derive(Debug)]
struct ClockState {
    /// Seconds accumulated across previous running spans
    elapsed: f64,
    /// Start of the current running span, None while suspended
    running_since: Option<Instant>,
}

impl ClockState {
    fn now(&self) -> f64 {
        self.elapsed
            + self
                .running_since
                .map(|since| since.elapsed().as_secs_f64())
                .unwrap_or(0.0)
    }
}

/// Context used for headless playback and tests
#[derive(Clone)]
pub struct SilentContext {
    clock: Arc<Mutex<ClockState>>,
    runtime: Handle,
}

impl SilentContext {
    /// Must be called from within a tokio runtime
    pub fn new() -> Result<Self, String> {
        let runtime = Handle::try_current()
            .map_err(|e| format!("Silent output needs a tokio runtime: {}", e))?;
        Ok(Self {
            clock: Arc::new(Mutex::new(ClockState {
                elapsed: 0.0,
                running_since: Some(Instant::now()),
            })),
            runtime,
        })
    }
}

impl AudioContext for SilentContext {
    fn current_time(&self) -> f64 {
        self.clock.lock().now()
    }

    fn suspend(&self) {
        let mut clock = self.clock.lock();
        if let Some(since) = clock.running_since.take() {
            clock.elapsed += since.elapsed().as_secs_f64();
        }
    }

    fn resume(&self) {
        let mut clock = self.clock.lock();
        if clock.running_since.is_none() {
            clock.running_since = Some(Instant::now());
        }
    }

    fn is_suspended(&self) -> bool {
        self.clock.lock().running_since.is_none()
    }

    fn start_source(
        &self,
        track: Arc<DecodedTrack>,
        offset: f64,
        _gain: GainStage,
    ) -> Result<SourceNode, String> {
        let (tx, rx) = watch::channel(false);
        let remaining = (track.duration() - offset.max(0.0)).max(0.0);
        let clock = self.clock.clone();
        let end = clock.lock().now() + remaining;

        let task = self.runtime.spawn(async move {
            loop {
                let left = end - clock.lock().now();
                if left <= 1e-6 {
                    let _ = tx.send(true);
                    return;
                }
                // While suspended the clock is frozen and this simply re-checks
                tokio::time::sleep(std::time::Duration::from_secs_f64(left.max(0.001))).await;
            }
        });

        Ok(SourceNode::new(rx, move || task.abort()))
    }
}
