// Queue management module
// This module handles the episodes waiting to be played

pub mod manager;

pub use manager::EpisodeQueue;
