// Error types for the playback controller
use thiserror::Error;

use crate::fetch::FetchError;

#[derive(Error, Debug)]
pub enum PlayerError {
    /// Fetching or decoding the track failed; nothing was committed
    #[error("Failed to load track {url}: {reason}")]
    TrackLoad { url: String, reason: String },

    /// A playback control was used before any track was loaded
    #[error("No track loaded")]
    NotReady,

    /// A newer switch_track call started while this one was loading
    #[error("Load of {0} was superseded by a newer track")]
    Superseded(String),

    /// The audio output rejected the operation
    #[error("Audio output error: {0}")]
    Output(String),
}

impl PlayerError {
    pub(crate) fn track_load(url: &str, reason: impl ToString) -> Self {
        Self::TrackLoad {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn from_fetch(url: &str, err: FetchError) -> Self {
        Self::track_load(url, err)
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
