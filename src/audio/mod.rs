// Audio playback module
// Uses Symphonia for decoding and cpal for output

pub mod buffer;
pub mod context;
pub mod decoder;
pub mod events;
pub mod output;
pub mod player;
pub mod resampler;
pub mod silent;
pub mod waveform;

pub use buffer::DecodedTrack;
pub use context::{AudioContext, GainStage, SourceNode};
pub use events::{EventSubscription, PlayerEvent};
pub use output::CpalContext;
pub use player::{Player, PlayerOptions, TransportState};
pub use silent::SilentContext;
pub use waveform::WaveformCanvas;
