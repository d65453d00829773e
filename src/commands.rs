// Command handlers for the front end
// Every handler reports failures as a displayable String
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::audio::{TransportState, WaveformCanvas};
use crate::db::operations::DbOperations;
use crate::feed::{fetch_feed, Episode, FeedSource};
use crate::state::AppState;

/// Episode row shown in the episode list
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeListing {
    #[serde(flatten)]
    pub episode: Episode,
    pub formatted_duration: String,
    pub played: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatus {
    pub url: Option<String>,
    pub offset: f64,
    pub duration: f64,
    pub transport: Option<TransportState>,
    pub volume: f32,
}

pub fn list_feeds(state: &AppState) -> Result<Vec<FeedSource>, String> {
    Ok(state.settings.lock().feeds.clone())
}

pub fn add_feed(state: &AppState, name: &str, url: &str) -> Result<(), String> {
    state.settings.lock().add_feed(name, url)?;
    state.save_settings()
}

pub fn remove_feed(state: &AppState, index: usize) -> Result<FeedSource, String> {
    let removed = state.settings.lock().remove_feed(index)?;
    state.save_settings()?;
    Ok(removed)
}

/// Download a feed and annotate its episodes with their played status
pub async fn fetch_episodes(state: &AppState, feed_index: usize) -> Result<Vec<EpisodeListing>, String> {
    let source = state
        .settings
        .lock()
        .feeds
        .get(feed_index)
        .cloned()
        .ok_or_else(|| format!("No feed at index {}", feed_index))?;

    let feed = fetch_feed(state.fetcher.as_ref(), &source)
        .await
        .map_err(|e| e.to_string())?;

    let played = DbOperations::played_urls(&state.db)
        .map_err(|e| format!("Failed to read played episodes: {}", e))?;

    Ok(feed
        .episodes
        .into_iter()
        .map(|episode| EpisodeListing {
            formatted_duration: episode.formatted_duration(),
            played: played.contains(&episode.audio_url),
            episode,
        })
        .collect())
}

/// Start playing `url`; returns the track duration in seconds
pub async fn play_episode(state: &AppState, url: &str, start_fraction: f64) -> Result<f64, String> {
    state
        .player
        .switch_track(url, start_fraction)
        .await
        .map_err(|e| e.to_string())
}

pub fn toggle_pause(state: &AppState) -> Result<TransportState, String> {
    let player = &state.player;
    match player.transport() {
        None => Err("Nothing is playing".to_string()),
        Some(TransportState::Playing) => {
            player.pause().map_err(|e| e.to_string())?;
            Ok(TransportState::Paused)
        }
        Some(TransportState::Paused) => {
            player.unpause().map_err(|e| e.to_string())?;
            Ok(player.transport().unwrap_or(TransportState::Paused))
        }
    }
}

/// Apply the volume and remember it for the next start
pub fn set_volume(state: &AppState, volume: f32) -> Result<(), String> {
    state.player.set_volume(volume);
    state.settings.lock().volume = state.player.volume();
    state.save_settings()
}

pub fn seek(state: &AppState, fraction: f64) -> Result<(), String> {
    state
        .player
        .play_from_timestamp(fraction)
        .map_err(|e| e.to_string())
}

pub fn mark_as_played(state: &AppState, url: &str) -> Result<(), String> {
    DbOperations::mark_played(&state.db, url)
        .map_err(|e| format!("Failed to mark {} as played: {}", url, e))?;
    info!("Marked {} as played", url);
    Ok(())
}

pub fn render_waveform(state: &AppState, path: &Path) -> Result<(), String> {
    let (width, height) = {
        let settings = state.settings.lock();
        (
            settings.playback.waveform_width,
            settings.playback.waveform_height,
        )
    };

    let mut canvas = WaveformCanvas::new(width, height);
    state
        .player
        .render_waveform(&mut canvas)
        .map_err(|e| e.to_string())?;
    canvas.save_png(path)?;
    info!("Waveform written to {}", path.display());
    Ok(())
}

pub fn player_status(state: &AppState) -> PlayerStatus {
    let player = &state.player;
    PlayerStatus {
        url: player.current_url(),
        offset: player.offset().unwrap_or(0.0),
        duration: player.duration().unwrap_or(0.0),
        transport: player.transport(),
        volume: player.volume(),
    }
}

/// Called when a session ends: mark it played and start the next queued episode
pub async fn finish_episode(state: &AppState) -> Result<Option<Episode>, String> {
    if let Some(url) = state.player.current_url() {
        if let Err(e) = mark_as_played(state, &url) {
            warn!("{}", e);
        }
    }

    let next = state.queue.lock().advance();
    if let Some(episode) = &next {
        play_episode(state, &episode.audio_url, 0.0).await?;
    }
    Ok(next)
}
