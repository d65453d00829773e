// Terminal front end
// clap arguments plus line-oriented commands read from stdin while playing
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::audio::PlayerEvent;
use crate::commands;
use crate::state::{AppState, OutputMode};

/// Terminal podcast player
#[derive(Parser, Debug)]
#[command(name = "podsloth", version)]
pub struct Cli {
    /// Directory holding settings.json and the played-episode database
    #[arg(long, env = "PODSLOTH_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List subscribed feeds
    Feeds,

    /// List the episodes of a feed
    Episodes {
        /// Feed index as shown by `feeds`
        #[arg(long, default_value_t = 0)]
        feed: usize,
    },

    /// Play an episode by URL or by feed and episode index
    Play(PlayArgs),

    /// Subscribe to a feed
    AddFeed { name: String, url: String },

    /// Unsubscribe from a feed
    RemoveFeed { index: usize },
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Audio URL or local file path
    #[arg(conflicts_with_all = ["feed", "episode"], required_unless_present = "feed")]
    pub url: Option<String>,

    #[arg(long, requires = "episode")]
    pub feed: Option<usize>,

    #[arg(long, requires = "feed")]
    pub episode: Option<usize>,

    /// Start position as a fraction of the episode length
    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    /// Write the waveform of the episode to this PNG file
    #[arg(long)]
    pub waveform: Option<PathBuf>,

    /// Run the playback clock without opening an audio device
    #[arg(long, env = "PODSLOTH_NO_AUDIO")]
    pub no_audio: bool,
}

/// Commands typed while an episode plays
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StdinCommand {
    TogglePause,
    Volume(f32),
    Seek(f64),
    Next,
    Quit,
}

impl StdinCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let name = parts.next().ok_or_else(|| "Empty command".to_string())?;
        let arg = parts.next();

        let number = |what: &str| -> Result<f64, String> {
            arg.ok_or_else(|| format!("{} needs a value between 0 and 1", what))?
                .parse::<f64>()
                .map_err(|_| format!("Invalid {} value", what))
        };

        match name {
            "p" => Ok(Self::TogglePause),
            "v" => Ok(Self::Volume(number("volume")? as f32)),
            "s" => Ok(Self::Seek(number("seek")?)),
            "n" => Ok(Self::Next),
            "q" => Ok(Self::Quit),
            other => Err(format!("Unknown command '{}'", other)),
        }
    }
}

/// `mm:ss`, with minutes allowed past 59
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0) as u64 } else { 0 };
    format!("{:02}:{:02}", total / 60, total % 60)
}

pub async fn execute(cli: Cli) -> Result<()> {
    let app_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .map(|dir| dir.join("podsloth"))
            .context("No data directory available, pass --data-dir")?,
    };

    match cli.command {
        Command::Feeds => {
            let state = AppState::open(&app_dir, OutputMode::Silent)?;
            for (index, feed) in commands::list_feeds(&state).map_err(anyhow::Error::msg)?.iter().enumerate() {
                println!("[{}] {} ({})", index, feed.name, feed.url);
            }
        }
        Command::Episodes { feed } => {
            let state = AppState::open(&app_dir, OutputMode::Silent)?;
            let episodes = commands::fetch_episodes(&state, feed)
                .await
                .map_err(anyhow::Error::msg)?;
            for (index, listing) in episodes.iter().enumerate() {
                let marker = if listing.played { "*" } else { " " };
                println!(
                    "[{}]{} {} {}",
                    index, marker, listing.episode.title, listing.formatted_duration
                );
            }
        }
        Command::AddFeed { name, url } => {
            let state = AppState::open(&app_dir, OutputMode::Silent)?;
            commands::add_feed(&state, &name, &url).map_err(anyhow::Error::msg)?;
            println!("Added {}", name);
        }
        Command::RemoveFeed { index } => {
            let state = AppState::open(&app_dir, OutputMode::Silent)?;
            let removed = commands::remove_feed(&state, index).map_err(anyhow::Error::msg)?;
            println!("Removed {}", removed.name);
        }
        Command::Play(args) => play(&app_dir, args).await?,
    }

    Ok(())
}

async fn play(app_dir: &std::path::Path, args: PlayArgs) -> Result<()> {
    let output = if args.no_audio {
        OutputMode::Silent
    } else {
        OutputMode::Device
    };
    let state = AppState::open(app_dir, output)?;

    let url = match (args.url, args.feed, args.episode) {
        (Some(url), _, _) => url,
        (None, Some(feed), Some(episode)) => {
            let listings = commands::fetch_episodes(&state, feed)
                .await
                .map_err(anyhow::Error::msg)?;
            let Some(selected) = listings.get(episode) else {
                bail!("Feed {} has no episode {}", feed, episode);
            };
            // Later episodes play on after this one
            state
                .queue
                .lock()
                .enqueue_all(listings[episode + 1..].iter().map(|l| l.episode.clone()));
            selected.episode.audio_url.clone()
        }
        _ => bail!("Pass a URL or both --feed and --episode"),
    };

    let mut events = state.player.subscribe();
    let duration = commands::play_episode(&state, &url, args.start)
        .await
        .map_err(anyhow::Error::msg)?;
    println!("Playing {} ({})", url, format_clock(duration));
    println!("Commands: p pause/resume, v <0..1> volume, s <0..1> seek, n next, q quit");

    if let Some(path) = &args.waveform {
        commands::render_waveform(&state, path).map_err(anyhow::Error::msg)?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(PlayerEvent::TimestampChange { offset, duration }) => {
                        print!("\r{} / {}", format_clock(offset), format_clock(duration));
                        let _ = std::io::stdout().flush();
                    }
                    Some(PlayerEvent::Ended) => {
                        println!();
                        match commands::finish_episode(&state).await {
                            Ok(Some(next)) => println!("Playing {}", next.title),
                            Ok(None) => {
                                info!("Queue finished");
                                break;
                            }
                            Err(e) => {
                                warn!("Failed to start next episode: {}", e);
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => {
                        if !handle_command(&state, &line).await {
                            break;
                        }
                    }
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Returns false when the user asked to quit
async fn handle_command(state: &AppState, line: &str) -> bool {
    let command = match StdinCommand::parse(line) {
        Ok(command) => command,
        Err(e) => {
            println!("\n{}", e);
            return true;
        }
    };

    let result = match command {
        StdinCommand::TogglePause => commands::toggle_pause(state).map(|_| ()),
        StdinCommand::Volume(volume) => commands::set_volume(state, volume),
        StdinCommand::Seek(fraction) => commands::seek(state, fraction),
        StdinCommand::Next => {
            let next = state.queue.lock().advance();
            match next {
                Some(episode) => {
                    println!("\nPlaying {}", episode.title);
                    commands::play_episode(state, &episode.audio_url, 0.0)
                        .await
                        .map(|_| ())
                }
                None => Err("Queue is empty".to_string()),
            }
        }
        StdinCommand::Quit => return false,
    };

    if let Err(e) = result {
        println!("\n{}", e);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(StdinCommand::parse("p"), Ok(StdinCommand::TogglePause));
        assert_eq!(StdinCommand::parse("v 0.5"), Ok(StdinCommand::Volume(0.5)));
        assert_eq!(StdinCommand::parse("  s 0.25 "), Ok(StdinCommand::Seek(0.25)));
        assert_eq!(StdinCommand::parse("n"), Ok(StdinCommand::Next));
        assert_eq!(StdinCommand::parse("q"), Ok(StdinCommand::Quit));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(StdinCommand::parse("").is_err());
        assert!(StdinCommand::parse("v").is_err());
        assert!(StdinCommand::parse("s half").is_err());
        assert!(StdinCommand::parse("x").is_err());
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "00:00");
        assert_eq!(format_clock(65.9), "01:05");
        assert_eq!(format_clock(3725.0), "62:05");
        assert_eq!(format_clock(-3.0), "00:00");
        assert_eq!(format_clock(f64::NAN), "00:00");
    }

    #[test]
    fn test_cli_parses_play_by_index() {
        let cli = Cli::try_parse_from([
            "podsloth", "play", "--feed", "1", "--episode", "3", "--no-audio",
        ])
        .unwrap();
        match cli.command {
            Command::Play(args) => {
                assert_eq!(args.feed, Some(1));
                assert_eq!(args.episode, Some(3));
                assert!(args.no_audio);
                assert!(args.url.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_url_with_feed() {
        let result = Cli::try_parse_from([
            "podsloth", "play", "https://x/a.mp3", "--feed", "0", "--episode", "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_data_dir_is_global() {
        let cli = Cli::try_parse_from(["podsloth", "feeds", "--data-dir", "/tmp/pods"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/pods")));
    }
}
