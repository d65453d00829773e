// Playback context abstraction
// A context owns the output clock and turns decoded tracks into playing sources

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

use super::buffer::DecodedTrack;

/// Output destination with its own clock
///
/// The clock only advances while the context is running, so suspending the
/// context freezes every offset derived from it.
pub trait AudioContext: Send + Sync + 'static {
    /// Seconds of output rendered since the context was created
    fn current_time(&self) -> f64;

    fn suspend(&self);

    fn resume(&self);

    fn is_suspended(&self) -> bool;

    /// Convert a freshly decoded track into the format the context plays
    fn prepare(&self, track: DecodedTrack) -> Result<DecodedTrack, String> {
        Ok(track)
    }

    /// Start playing `track` from `offset` seconds through `gain`
    fn start_source(
        &self,
        track: Arc<DecodedTrack>,
        offset: f64,
        gain: GainStage,
    ) -> Result<SourceNode, String>;
}

/// Shared gain factor read by the output on every buffer
#[derive(Debug, Clone)]
pub struct GainStage {
    value: Arc<Mutex<f32>>,
}

impl GainStage {
    pub fn new(value: f32) -> Self {
        Self {
            value: Arc::new(Mutex::new(value)),
        }
    }

    pub fn set(&self, value: f32) {
        *self.value.lock() = value;
    }

    pub fn get(&self) -> f32 {
        *self.value.lock()
    }
}

impl Default for GainStage {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Handle to a single playing source
///
/// Dropping the handle stops the source.
pub struct SourceNode {
    completion: watch::Receiver<bool>,
    stopper: Option<Box<dyn FnOnce() + Send>>,
}

impl SourceNode {
    pub fn new(completion: watch::Receiver<bool>, stopper: impl FnOnce() + Send + 'static) -> Self {
        Self {
            completion,
            stopper: Some(Box::new(stopper)),
        }
    }

    /// Flips to `true` once the source has played to its natural end
    pub fn completion(&self) -> watch::Receiver<bool> {
        self.completion.clone()
    }

    pub fn stop(&mut self) {
        if let Some(stop) = self.stopper.take() {
            stop();
        }
    }
}

impl Drop for SourceNode {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SourceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceNode")
            .field("completed", &*self.completion.borrow())
            .field("stopped", &self.stopper.is_none())
            .finish()
    }
}
