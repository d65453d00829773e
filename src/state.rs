// Application state management
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::audio::{AudioContext, CpalContext, Player, PlayerOptions, SilentContext};
use crate::db::connection::DatabaseConnection;
use crate::fetch::{CorsFetcher, TrackFetcher};
use crate::queue::EpisodeQueue;
use crate::settings::AppSettings;

/// Where decoded audio goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Default output device, falling back to silent output if it cannot be opened
    Device,
    Silent,
}

pub struct AppState {
    pub player: Arc<Player>,
    pub db: DatabaseConnection,
    pub settings: Arc<Mutex<AppSettings>>,
    pub fetcher: Arc<dyn TrackFetcher>,
    pub queue: Arc<Mutex<EpisodeQueue>>,
    pub app_dir: PathBuf,
}

impl AppState {
    pub fn new(
        player: Player,
        db: DatabaseConnection,
        settings: Arc<Mutex<AppSettings>>,
        fetcher: Arc<dyn TrackFetcher>,
        app_dir: PathBuf,
    ) -> Self {
        Self {
            player: Arc::new(player),
            db,
            settings,
            fetcher,
            queue: Arc::new(Mutex::new(EpisodeQueue::new())),
            app_dir,
        }
    }

    /// Load settings and the database from `app_dir` and build the player
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(app_dir: &Path, output: OutputMode) -> Result<Self> {
        let settings = AppSettings::load(app_dir).map_err(anyhow::Error::msg)?;
        let db = DatabaseConnection::new(&app_dir.join("podsloth.db"))?;

        let poll_interval = Duration::from_millis(settings.playback.poll_interval_ms.max(1));
        let volume = settings.volume;
        let network = settings.network.clone();
        let settings = Arc::new(Mutex::new(settings));

        let fetcher = CorsFetcher::new(network.cors_proxies, network.cors_hosts, &network.user_agent)
            .context("Failed to build HTTP client")?
            .on_hosts_changed(persist_cors_hosts(settings.clone(), app_dir.to_path_buf()));
        let fetcher: Arc<dyn TrackFetcher> = Arc::new(fetcher);

        let context = open_context(output)?;
        let player = Player::new(
            context,
            fetcher.clone(),
            PlayerOptions {
                poll_interval,
                volume,
            },
        )?;

        Ok(Self::new(player, db, settings, fetcher, app_dir.to_path_buf()))
    }

    /// Persist the current settings
    pub fn save_settings(&self) -> Result<(), String> {
        self.settings.lock().save(&self.app_dir)
    }
}

fn open_context(output: OutputMode) -> Result<Arc<dyn AudioContext>> {
    if output == OutputMode::Device {
        match CpalContext::new() {
            Ok(context) => {
                info!(
                    "Audio output at {} Hz, {} channels",
                    context.sample_rate(),
                    context.channels()
                );
                return Ok(Arc::new(context));
            }
            Err(e) => warn!("No audio output available ({}), playing silently", e),
        }
    }

    let context = SilentContext::new().map_err(anyhow::Error::msg)?;
    Ok(Arc::new(context))
}

/// Write newly discovered CORS hosts back to the settings file
fn persist_cors_hosts(
    settings: Arc<Mutex<AppSettings>>,
    app_dir: PathBuf,
) -> impl Fn(&[String]) + Send + Sync + 'static {
    move |hosts: &[String]| {
        let mut settings = settings.lock();
        settings.network.cors_hosts = hosts.to_vec();
        if let Err(e) = settings.save(&app_dir) {
            warn!("Failed to persist CORS hosts: {}", e);
        }
    }
}
