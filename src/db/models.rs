// Data models
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedEpisode {
    pub id: i64,
    pub url: String,
    /// Unix timestamp (seconds)
    pub played_at: i64,
}
