use std::collections::VecDeque;

use crate::feed::Episode;

/// Episodes lined up after the current one, played in insertion order
#[derive(Debug, Default, Clone)]
pub struct EpisodeQueue {
    episodes: VecDeque<Episode>,
}

impl EpisodeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, episode: Episode) {
        self.episodes.push_back(episode);
    }

    pub fn enqueue_all<I: IntoIterator<Item = Episode>>(&mut self, episodes: I) {
        self.episodes.extend(episodes);
    }

    /// Take the next episode to play
    pub fn advance(&mut self) -> Option<Episode> {
        self.episodes.pop_front()
    }

    pub fn peek(&self) -> Option<&Episode> {
        self.episodes.front()
    }

    pub fn clear(&mut self) {
        self.episodes.clear();
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Episode> {
        self.episodes.iter()
    }
}
